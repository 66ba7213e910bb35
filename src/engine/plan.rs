//! Execution plans built from a scan.

use crate::engine::filter::{Classification, FilterEngine};
use crate::engine::report::SkipReason;
use crate::engine::resolver::ExecutionOrder;
use crate::engine::scanner::{EnumerationError, ScanOutput, ScanTarget, ScannedResource};
use serde::Serialize;
use std::collections::HashMap;

/// Resources of one type, split by classification.
#[derive(Debug, Clone)]
pub struct PlanGroup {
    pub type_name: String,
    /// Classified REMOVE.
    pub remove: Vec<ScannedResource>,
    /// Classified SKIP, with the reason.
    pub skipped: Vec<(ScannedResource, SkipReason)>,
}

/// One classification decision, for dry-run output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanDecision {
    pub type_name: String,
    pub region: Option<String>,
    pub identity: String,
    #[serde(flatten)]
    pub classification: Classification,
}

/// Ordered removal groups for one run.
///
/// Groups follow the resolved type order; a type whose scan produced nothing
/// has no group.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    target: ScanTarget,
    groups: Vec<PlanGroup>,
    decisions: Vec<PlanDecision>,
    enumeration_errors: Vec<EnumerationError>,
}

impl ExecutionPlan {
    /// Classify a scan and arrange it by type order.
    pub fn build(
        target: ScanTarget,
        order: &ExecutionOrder,
        scan: ScanOutput,
        filters: &FilterEngine,
    ) -> Self {
        let mut by_type: HashMap<String, Vec<(ScannedResource, Classification)>> = HashMap::new();
        for resource in scan.resources {
            let classification = filters.classify(&resource);
            tracing::trace!(
                type_name = %resource.type_name,
                identity = %resource.identity(),
                %classification,
                "Classified resource"
            );
            by_type
                .entry(resource.type_name.clone())
                .or_default()
                .push((resource, classification));
        }

        let mut classified: Vec<(String, Vec<(ScannedResource, Classification)>)> =
            by_type.into_iter().collect();
        classified.sort_by_key(|(name, _)| order.position(name).unwrap_or(usize::MAX));

        let mut groups = Vec::with_capacity(classified.len());
        let mut decisions = Vec::new();
        for (type_name, resources) in classified {
            let mut group = PlanGroup {
                type_name: type_name.clone(),
                remove: Vec::new(),
                skipped: Vec::new(),
            };
            for (resource, classification) in resources {
                decisions.push(PlanDecision {
                    type_name: type_name.clone(),
                    region: resource.region.clone(),
                    identity: resource.identity(),
                    classification: classification.clone(),
                });
                match classification {
                    Classification::Remove { .. } => group.remove.push(resource),
                    Classification::Skip { reason } => {
                        tracing::debug!(
                            type_name = %type_name,
                            identity = %resource.identity(),
                            %reason,
                            "Skipping resource"
                        );
                        group.skipped.push((resource, reason));
                    }
                }
            }
            groups.push(group);
        }

        Self {
            target,
            groups,
            decisions,
            enumeration_errors: scan.errors,
        }
    }

    pub fn target(&self) -> &ScanTarget {
        &self.target
    }

    pub fn groups(&self) -> &[PlanGroup] {
        &self.groups
    }

    pub fn enumeration_errors(&self) -> &[EnumerationError] {
        &self.enumeration_errors
    }

    /// Resources classified REMOVE.
    pub fn remove_count(&self) -> usize {
        self.groups.iter().map(|g| g.remove.len()).sum()
    }

    /// Resources classified SKIP.
    pub fn skip_count(&self) -> usize {
        self.groups.iter().map(|g| g.skipped.len()).sum()
    }

    /// Every classification decision, in plan order.
    pub fn decisions(&self) -> &[PlanDecision] {
        &self.decisions
    }

    pub(crate) fn into_parts(self) -> (ScanTarget, Vec<PlanGroup>, Vec<EnumerationError>) {
        (self.target, self.groups, self.enumeration_errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FilterRuleConfig, MatchKind, RuleAction};
    use crate::engine::resolver::resolve_order;
    use crate::error::{ListError, RemovalError};
    use crate::resources::{
        ExecContext, KeepReason, ResourceHandle, ResourceTypeDescriptor, ResourceTypeRegistry,
        ScanContext, Scope,
    };
    use std::sync::Arc;

    struct Fake {
        id: &'static str,
        protected: bool,
    }

    impl ResourceHandle for Fake {
        fn identity(&self) -> String {
            self.id.to_string()
        }

        fn filter(&self) -> Result<(), KeepReason> {
            if self.protected {
                Err(KeepReason::new("cannot delete default group"))
            } else {
                Ok(())
            }
        }

        fn remove(&self, _ctx: &ExecContext) -> Result<(), RemovalError> {
            Ok(())
        }
    }

    fn none(_: &ScanContext) -> Result<Vec<Box<dyn ResourceHandle>>, ListError> {
        Ok(Vec::new())
    }

    fn registry() -> ResourceTypeRegistry {
        ResourceTypeRegistry::from_descriptors([
            ResourceTypeDescriptor::new("EC2Subnet", Scope::Region, none),
            ResourceTypeDescriptor::new("EC2SecurityGroup", Scope::Region, none)
                .depends_on(["EC2Subnet"]),
        ])
        .unwrap()
    }

    fn scanned(type_name: &str, id: &'static str, protected: bool) -> ScannedResource {
        ScannedResource {
            type_name: type_name.to_string(),
            region: Some("us-east-1".to_string()),
            handle: Arc::new(Fake { id, protected }),
        }
    }

    #[test]
    fn test_groups_follow_execution_order() {
        let registry = registry();
        let order = resolve_order(&registry).unwrap();
        let scan = ScanOutput {
            resources: vec![
                scanned("EC2Subnet", "subnet-1", false),
                scanned("EC2SecurityGroup", "sg-1", false),
                scanned("EC2SecurityGroup", "sg-default", true),
            ],
            errors: vec![],
        };

        let plan = ExecutionPlan::build(
            ScanTarget::new("123456789012", vec!["us-east-1".into()]),
            &order,
            scan,
            &FilterEngine::permissive(),
        );

        let names: Vec<&str> = plan.groups().iter().map(|g| g.type_name.as_str()).collect();
        assert_eq!(names, vec!["EC2Subnet", "EC2SecurityGroup"]);
        assert_eq!(plan.remove_count(), 2);
        assert_eq!(plan.skip_count(), 1);
        assert!(plan.groups()[0].skipped.is_empty());
        assert_eq!(
            plan.groups()[1].skipped[0].1,
            SkipReason::Filtered("cannot delete default group".into())
        );
    }

    #[test]
    fn test_decisions_carry_rule_reasons() {
        let registry = registry();
        let order = resolve_order(&registry).unwrap();
        let rules = vec![FilterRuleConfig {
            action: RuleAction::Keep,
            types: vec!["EC2Subnet".into()],
            property: None,
            tag: None,
            match_kind: MatchKind::Exact,
            value: "subnet-keep".into(),
            invert: false,
        }];
        let filters = FilterEngine::new(&rules, &registry).unwrap();
        let scan = ScanOutput {
            resources: vec![
                scanned("EC2Subnet", "subnet-keep", false),
                scanned("EC2Subnet", "subnet-gone", false),
            ],
            errors: vec![],
        };

        let plan = ExecutionPlan::build(ScanTarget::new("1", vec![]), &order, scan, &filters);

        let decisions = plan.decisions();
        assert_eq!(decisions.len(), 2);
        assert!(!decisions[0].classification.is_remove());
        assert_eq!(
            decisions[1].classification,
            Classification::Remove {
                reason: "no matching rule".into()
            }
        );
    }
}
