//! Lifecycle Check Module
//!
//! Staged check orchestration for AI systems:
//!
//! 1. **Registry**: checks and their callables, grouped by lifecycle stage
//! 2. **Resolver**: dependency ordering within a stage
//! 3. **Executor**: timeout-bounded execution of a single check
//! 4. **Aggregator**: runs a whole stage and emits the lifecycle event

pub mod aggregator;
pub mod builtin;
pub mod check;
pub mod executor;
pub mod registry;
pub mod resolver;
pub mod types;

// Re-export main types for convenient access
pub use aggregator::{StageAggregator, StageOutcome};
pub use check::{check_fn, Check, CheckOutcome};
pub use executor::CheckExecutor;
pub use registry::{CheckRegistry, RegisteredCheck};
pub use resolver::{DependencyResolver, Resolution};
pub use types::{
    CheckCategory, CheckDefinition, CheckResult, CheckStatus, Facts, LifecycleContext, LifecycleEvent, LifecycleStage,
};
