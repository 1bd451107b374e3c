//! Check Registry
//!
//! Process-scoped catalog of check definitions and their callables, keyed by
//! id and grouped by lifecycle stage. Populated at startup with the built-in
//! checks and extended at runtime through [`CheckRegistry::add`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use validator::Validate;

use super::check::Check;
use super::types::{CheckDefinition, LifecycleStage};
use crate::error::{GovResult, GovernanceError};

/// A definition paired with the callable that implements it
#[derive(Clone)]
pub struct RegisteredCheck {
    pub definition: CheckDefinition,
    pub check: Arc<dyn Check>,
}

impl RegisteredCheck {
    pub fn id(&self) -> &str {
        &self.definition.id
    }
}

impl fmt::Debug for RegisteredCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredCheck")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct RegistryInner {
    by_id: HashMap<String, RegisteredCheck>,
    /// Stage -> check ids in registration order
    by_stage: HashMap<LifecycleStage, Vec<String>>,
}

/// Thread-safe check registry (read-mostly, writes serialized by the lock)
pub struct CheckRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryInner::default())),
        }
    }

    /// Register a check. Fails if the id is already taken.
    pub async fn add(&self, definition: CheckDefinition, check: Arc<dyn Check>) -> GovResult<()> {
        definition.validate()?;

        let mut inner = self.inner.write().await;
        if inner.by_id.contains_key(&definition.id) {
            return Err(GovernanceError::DuplicateCheck(definition.id));
        }

        let id = definition.id.clone();
        let stage = definition.stage;
        inner
            .by_stage
            .entry(stage)
            .or_default()
            .push(id.clone());
        inner.by_id.insert(id.clone(), RegisteredCheck { definition, check });

        debug!("Registered check '{}' for stage {}", id, stage);
        Ok(())
    }

    /// All checks of a stage, in registration order
    pub async fn checks_for(&self, stage: LifecycleStage) -> Vec<RegisteredCheck> {
        let inner = self.inner.read().await;
        Self::collect_stage(&inner, stage)
    }

    /// Get a check by id
    pub async fn get(&self, id: &str) -> Option<RegisteredCheck> {
        let inner = self.inner.read().await;
        inner.by_id.get(id).cloned()
    }

    /// All definitions, ordered by stage then registration order
    pub async fn definitions(&self) -> Vec<CheckDefinition> {
        let inner = self.inner.read().await;
        LifecycleStage::ALL
            .iter()
            .flat_map(|stage| Self::collect_stage(&inner, *stage))
            .map(|registered| registered.definition)
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stages that have at least one check, in lifecycle order
    pub async fn stages(&self) -> Vec<LifecycleStage> {
        let inner = self.inner.read().await;
        LifecycleStage::ALL
            .into_iter()
            .filter(|stage| inner.by_stage.get(stage).is_some_and(|ids| !ids.is_empty()))
            .collect()
    }

    /// Check a stage's dependency wiring without running anything
    pub async fn validate_stage(&self, stage: LifecycleStage) -> GovResult<()> {
        self.validated_checks_for(stage).await.map(|_| ())
    }

    /// Fetch a stage's checks after verifying every dependency resolves to a
    /// registered check of the same stage.
    pub async fn validated_checks_for(&self, stage: LifecycleStage) -> GovResult<Vec<RegisteredCheck>> {
        let inner = self.inner.read().await;
        let checks = Self::collect_stage(&inner, stage);

        for registered in &checks {
            for dependency in &registered.definition.dependencies {
                match inner.by_id.get(dependency) {
                    None => {
                        return Err(GovernanceError::UnknownDependency {
                            check: registered.definition.id.clone(),
                            dependency: dependency.clone(),
                        });
                    }
                    Some(dep) if dep.definition.stage != stage => {
                        return Err(GovernanceError::CrossStageDependency {
                            check: registered.definition.id.clone(),
                            stage,
                            dependency: dependency.clone(),
                            dependency_stage: dep.definition.stage,
                        });
                    }
                    Some(_) => {}
                }
            }
        }

        Ok(checks)
    }

    /// Log a per-stage summary of what is registered
    pub async fn log_summary(&self) {
        let inner = self.inner.read().await;
        for stage in LifecycleStage::ALL {
            let count = inner.by_stage.get(&stage).map(Vec::len).unwrap_or(0);
            if count > 0 {
                info!("   {:<13} {} checks", stage.as_str(), count);
            }
        }
    }

    fn collect_stage(inner: &RegistryInner, stage: LifecycleStage) -> Vec<RegisteredCheck> {
        inner
            .by_stage
            .get(&stage)
            .map(|ids| ids.iter().filter_map(|id| inner.by_id.get(id)).cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for CheckRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::check::{check_fn, CheckOutcome};
    use tokio_test::{assert_err, assert_ok};

    fn noop() -> Arc<dyn Check> {
        check_fn(|_, _| async { Ok(CheckOutcome::pass()) })
    }

    #[tokio::test]
    async fn test_add_rejects_duplicate_ids() {
        let registry = CheckRegistry::new();
        let def = CheckDefinition::new("a", LifecycleStage::Training, 100);

        assert_ok!(registry.add(def.clone(), noop()).await);
        let err = registry.add(def, noop()).await.unwrap_err();
        assert!(matches!(err, GovernanceError::DuplicateCheck(id) if id == "a"));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_add_rejects_invalid_definition() {
        let registry = CheckRegistry::new();
        let def = CheckDefinition::new("slow", LifecycleStage::Training, 0);
        assert_err!(registry.add(def, noop()).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_checks_for_returns_only_that_stage_in_registration_order() {
        let registry = CheckRegistry::new();
        for id in ["c", "a", "b"] {
            registry
                .add(CheckDefinition::new(id, LifecycleStage::Validation, 100), noop())
                .await
                .unwrap();
        }
        registry
            .add(CheckDefinition::new("other", LifecycleStage::Deployment, 100), noop())
            .await
            .unwrap();

        let ids: Vec<String> = registry
            .checks_for(LifecycleStage::Validation)
            .await
            .into_iter()
            .map(|c| c.definition.id)
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert!(registry.checks_for(LifecycleStage::Monitoring).await.is_empty());
    }

    #[tokio::test]
    async fn test_validation_flags_unknown_and_cross_stage_dependencies() {
        let registry = CheckRegistry::new();
        registry
            .add(CheckDefinition::new("ingest", LifecycleStage::Ingestion, 100), noop())
            .await
            .unwrap();
        registry
            .add(
                CheckDefinition::new("train", LifecycleStage::Training, 100).depends_on("ingest"),
                noop(),
            )
            .await
            .unwrap();
        registry
            .add(
                CheckDefinition::new("validate", LifecycleStage::Validation, 100).depends_on("ghost"),
                noop(),
            )
            .await
            .unwrap();

        let err = registry.validated_checks_for(LifecycleStage::Training).await.unwrap_err();
        assert!(matches!(err, GovernanceError::CrossStageDependency { .. }));

        let err = registry.validated_checks_for(LifecycleStage::Validation).await.unwrap_err();
        assert!(matches!(err, GovernanceError::UnknownDependency { ref dependency, .. } if dependency == "ghost"));

        assert_ok!(registry.validated_checks_for(LifecycleStage::Ingestion).await);
        assert_ok!(registry.validate_stage(LifecycleStage::Ingestion).await);
        assert_err!(registry.validate_stage(LifecycleStage::Validation).await);
        assert_eq!(
            registry.stages().await,
            vec![LifecycleStage::Ingestion, LifecycleStage::Training, LifecycleStage::Validation]
        );
    }
}
