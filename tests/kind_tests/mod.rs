//! Integration tests for the hello operator
//!
//! # Test Organization
//!
//! - `crd_operations`: creating HelloApps through the API server, including
//!   the schema bounds the server enforces on our behalf
//! - `reconcile_flow`: running reconcile passes against real objects and
//!   checking the Deployment and status they produce
//!
//! # Running These Tests
//!
//! ```bash
//! cargo test --test kind -- --ignored --test-threads=1
//! ```

mod crd_operations;
mod helpers;
mod reconcile_flow;
