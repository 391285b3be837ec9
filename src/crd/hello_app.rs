//! HelloApp Custom Resource Definition
//!
//! A HelloApp asks for a greeting web server: a message that ends up in the
//! pods' environment and the number of replicas to run.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Condition;
use crate::conditions;

/// Replica count used when the spec leaves it out
pub const DEFAULT_REPLICAS: i32 = 1;

fn default_replicas() -> i32 {
    DEFAULT_REPLICAS
}

/// Specification for a HelloApp
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "hello.example.com",
    version = "v1alpha1",
    kind = "HelloApp",
    plural = "helloapps",
    shortname = "hello",
    status = "HelloAppStatus",
    namespaced,
    printcolumn = r#"{"name":"Message","type":"string","jsonPath":".spec.message"}"#,
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Available","type":"integer","jsonPath":".status.availableReplicas"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct HelloAppSpec {
    /// Greeting served by every replica
    #[schemars(length(min = 1, max = 255))]
    pub message: String,

    /// Number of pods to run
    #[serde(default = "default_replicas")]
    #[schemars(range(min = 1, max = 10))]
    pub replicas: i32,
}

/// Status for a HelloApp
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HelloAppStatus {
    /// Conditions representing the app state, at most one per type
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Ready pods reported by the managed Deployment
    #[serde(default)]
    pub available_replicas: i32,
}

impl HelloAppStatus {
    /// Set or update a condition, returning whether anything changed
    pub fn set_condition(&mut self, condition: Condition) -> bool {
        conditions::set_status_condition(&mut self.conditions, condition)
    }

    /// Find the condition of the given type
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        conditions::find_status_condition(&self.conditions, type_)
    }

    /// Update the available replica count, returning whether it changed
    pub fn set_available_replicas(&mut self, replicas: i32) -> bool {
        if self.available_replicas == replicas {
            return false;
        }
        self.available_replicas = replicas;
        true
    }
}

impl HelloApp {
    /// Whether the status carries no conditions yet
    pub fn needs_initial_status(&self) -> bool {
        self.status
            .as_ref()
            .map_or(true, |status| status.conditions.is_empty())
    }

    /// Mutable access to the status, creating an empty one if absent
    pub fn status_mut(&mut self) -> &mut HelloAppStatus {
        self.status.get_or_insert_with(HelloAppStatus::default)
    }

    /// Generation of the spec as recorded by the API server
    pub fn generation(&self) -> i64 {
        self.metadata.generation.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ConditionStatus;
    use kube::CustomResourceExt;

    fn sample_app(message: &str, replicas: i32) -> HelloApp {
        HelloApp::new(
            "demo",
            HelloAppSpec {
                message: message.to_string(),
                replicas,
            },
        )
    }

    /// Story: an omitted replica count means one replica
    #[test]
    fn story_replicas_default_to_one() {
        let spec: HelloAppSpec = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert_eq!(spec.replicas, DEFAULT_REPLICAS);
        assert_eq!(spec.message, "hi");
    }

    /// Story: the API server enforces field bounds through the generated schema
    #[test]
    fn story_crd_schema_declares_bounds() {
        let crd = HelloApp::crd();
        assert_eq!(crd.spec.group, "hello.example.com");
        assert_eq!(crd.spec.names.kind, "HelloApp");
        assert_eq!(crd.spec.scope, "Namespaced");

        let version = &crd.spec.versions[0];
        assert_eq!(version.name, "v1alpha1");
        assert!(version.subresources.as_ref().unwrap().status.is_some());

        let schema = serde_json::to_value(version.schema.as_ref().unwrap()).unwrap();
        let spec = &schema["openAPIV3Schema"]["properties"]["spec"]["properties"];
        assert_eq!(spec["message"]["minLength"], 1);
        assert_eq!(spec["message"]["maxLength"], 255);
        assert_eq!(spec["replicas"]["minimum"].as_f64(), Some(1.0));
        assert_eq!(spec["replicas"]["maximum"].as_f64(), Some(10.0));
        assert_eq!(spec["replicas"]["default"], 1);
    }

    #[test]
    fn print_columns_show_message_and_replicas() {
        let crd = HelloApp::crd();
        let columns: Vec<_> = crd.spec.versions[0]
            .additional_printer_columns
            .as_ref()
            .unwrap()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(columns, vec!["Message", "Replicas", "Available", "Age"]);
    }

    #[test]
    fn new_app_needs_initial_status() {
        let mut app = sample_app("hi", 3);
        assert!(app.needs_initial_status());

        app.status_mut().set_condition(Condition::new(
            "Available",
            ConditionStatus::Unknown,
            "Reconciling",
            "Starting reconciliation",
        ));
        assert!(!app.needs_initial_status());
        assert!(app.status.as_ref().unwrap().condition("Available").is_some());
    }

    #[test]
    fn available_replicas_reports_change() {
        let mut status = HelloAppStatus::default();
        assert!(status.set_available_replicas(3));
        assert!(!status.set_available_replicas(3));
        assert_eq!(status.available_replicas, 3);
    }

    #[test]
    fn generation_defaults_to_zero() {
        let mut app = sample_app("hi", 1);
        assert_eq!(app.generation(), 0);
        app.metadata.generation = Some(7);
        assert_eq!(app.generation(), 7);
    }
}
