//! Teardown core library: composite disposable registry, errors, plans.
//!
//! Public API surface:
//! - [`disposable`]: [`Disposable`] registry, [`DisposeGuard`]
//! - [`teardown`]: [`Teardown`], the inputs a registry accepts
//! - [`error`]: [`TeardownError`], [`AggregateTeardownError`], [`UsageError`], [`PlanError`]
//! - [`plan`]: YAML teardown plans: load / build / execute

pub mod disposable;
pub mod error;
pub mod plan;
pub mod teardown;

pub use disposable::{Disposable, DisposeGuard};
pub use error::{AggregateTeardownError, BoxError, PlanError, TeardownError, UsageError};
pub use plan::{Plan, PlanNode, PlanReport};
pub use teardown::{Teardown, TeardownFn};
