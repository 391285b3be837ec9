//! Operator configuration
//!
//! Every flag has an `HELLO_*` environment fallback so the operator can be
//! configured from a Deployment manifest without arguments.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use crate::telemetry::LogFormat;
use crate::{Error, Result};

/// Runtime configuration for the controller
#[derive(Parser, Clone, Debug)]
pub struct OperatorConfig {
    /// Only watch HelloApps in this namespace (all namespaces when unset)
    #[arg(long, env = "HELLO_WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    /// Maximum HelloApps reconciled in parallel (0 means unbounded)
    #[arg(long, env = "HELLO_CONCURRENCY", default_value_t = 4)]
    pub concurrency: u16,

    /// Deadline for a single reconcile pass, in seconds
    #[arg(long, env = "HELLO_RECONCILE_TIMEOUT_SECS", default_value_t = 30)]
    pub reconcile_timeout_secs: u64,

    /// Delay before retrying a failed pass, in seconds
    #[arg(long, env = "HELLO_ERROR_BACKOFF_SECS", default_value_t = 5)]
    pub error_backoff_secs: u64,

    /// Address for the health, readiness and metrics endpoints
    #[arg(long, env = "HELLO_PROBE_ADDR", default_value = crate::DEFAULT_PROBE_ADDR)]
    pub probe_addr: SocketAddr,

    /// Log output format
    #[arg(long, env = "HELLO_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Install or update the HelloApp CRD before starting
    #[arg(long, env = "HELLO_INSTALL_CRD")]
    pub install_crd: bool,
}

impl OperatorConfig {
    /// Deadline for a single reconcile pass
    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }

    /// Delay before retrying a failed pass
    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    /// Reject settings the controller cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.reconcile_timeout_secs == 0 {
            return Err(Error::config("reconcile timeout must be greater than zero"));
        }
        if self.error_backoff_secs == 0 {
            return Err(Error::config("error back-off must be greater than zero"));
        }
        if self
            .watch_namespace
            .as_deref()
            .is_some_and(|ns| ns.trim().is_empty())
        {
            return Err(Error::config("watch namespace must not be blank"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> OperatorConfig {
        let argv = std::iter::once("hello-operator").chain(args.iter().copied());
        OperatorConfig::try_parse_from(argv).unwrap()
    }

    #[test]
    fn flags_override_defaults() {
        let config = parse(&[
            "--watch-namespace",
            "team-a",
            "--concurrency",
            "8",
            "--reconcile-timeout-secs",
            "10",
            "--error-backoff-secs",
            "2",
            "--probe-addr",
            "127.0.0.1:9000",
            "--log-format",
            "json",
            "--install-crd",
        ]);

        assert_eq!(config.watch_namespace.as_deref(), Some("team-a"));
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.reconcile_timeout(), Duration::from_secs(10));
        assert_eq!(config.error_backoff(), Duration::from_secs(2));
        assert_eq!(config.probe_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(config.install_crd);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = parse(&["--reconcile-timeout-secs", "0"]);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn zero_backoff_is_rejected() {
        let config = parse(&["--error-backoff-secs", "0"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn blank_namespace_is_rejected() {
        let config = parse(&["--watch-namespace", " "]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_probe_address_fails_to_parse() {
        let argv = ["hello-operator", "--probe-addr", "not-an-address"];
        assert!(OperatorConfig::try_parse_from(argv).is_err());
    }
}
