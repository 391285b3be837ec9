//! hello-operator - reconciles `HelloApp` resources into Deployments
//!
//! A `HelloApp` (group `hello.example.com`, version `v1alpha1`) declares a
//! greeting and a replica count. The operator keeps exactly one hardened
//! Deployment per HelloApp in sync with it and reports availability back on
//! the HelloApp's status.
//!
//! # Modules
//!
//! - [`crd`] - HelloApp Custom Resource Definition and condition types
//! - [`conditions`] - Status condition set manipulation
//! - [`deployment`] - Desired Deployment construction and owner references
//! - [`diff`] - Drift detection between observed and desired Deployments
//! - [`controller`] - Reconcile pass, store abstraction and error policy
//! - [`controller_runner`] - kube-runtime Controller wiring
//! - [`config`] - Command line and environment configuration
//! - [`events`] - Kubernetes Event publishing
//! - [`metrics`] - Reconcile counters
//! - [`probes`] - Health, readiness and metrics HTTP endpoints
//! - [`retry`] - Startup retries with backoff
//! - [`startup`] - Client creation and CRD installation
//! - [`telemetry`] - Tracing subscriber setup
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod conditions;
pub mod config;
pub mod controller;
pub mod controller_runner;
pub mod crd;
pub mod deployment;
pub mod diff;
pub mod error;
pub mod events;
pub mod metrics;
pub mod probes;
pub mod retry;
pub mod startup;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Name the operator reports as field manager, event reporter and `managed-by` label
pub const CONTROLLER_NAME: &str = "hello-operator";

/// Default bind address for the probe and metrics server
pub const DEFAULT_PROBE_ADDR: &str = "0.0.0.0:8081";
