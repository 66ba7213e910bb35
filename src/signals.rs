//! Interrupt handling for runs.

use crate::cancel::CancelToken;
use nix::sys::signal::{self, SigHandler, Signal};
use std::sync::OnceLock;

static RUN_TOKEN: OnceLock<CancelToken> = OnceLock::new();

/// Cancel `token` on SIGINT or SIGTERM.
///
/// Only the first installed token is honoured; later calls re-install the
/// handlers but keep cancelling the original token.
pub fn install_cancel_handlers(token: &CancelToken) -> nix::Result<()> {
    if RUN_TOKEN.set(token.clone()).is_err() {
        tracing::debug!("Cancel handlers already bound to a run token");
    }

    // SAFETY: the handler only reads an initialized OnceLock and stores to an
    // atomic flag, both async-signal-safe.
    unsafe {
        signal::signal(Signal::SIGTERM, SigHandler::Handler(handle_interrupt))?;
        signal::signal(Signal::SIGINT, SigHandler::Handler(handle_interrupt))?;
    }

    Ok(())
}

extern "C" fn handle_interrupt(_: i32) {
    if let Some(token) = RUN_TOKEN.get() {
        token.cancel();
    }
}
