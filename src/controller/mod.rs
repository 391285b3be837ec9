//! Controller implementation for HelloApp
//!
//! Reconciliation follows the Kubernetes controller pattern: observe the
//! HelloApp and its Deployment, diff against the desired Deployment, act.

mod hello_app;

pub use hello_app::{
    error_policy, reconcile, reconcile_key, Context, ContextBuilder, HelloKubeClient,
    KubeClientImpl, ObjectKey, Requeue, CONDITION_AVAILABLE, DEFAULT_ERROR_BACKOFF,
    DEFAULT_PASS_TIMEOUT, REASON_RECONCILING,
};
