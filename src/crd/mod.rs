//! Custom Resource Definitions for the hello operator
//!
//! `HelloApp` is the only kind the operator watches. The `Deployment` it
//! produces is a built-in type and lives in [`crate::deployment`].

mod hello_app;
mod types;

pub use hello_app::{HelloApp, HelloAppSpec, HelloAppStatus, DEFAULT_REPLICAS};
pub use types::{Condition, ConditionStatus};
