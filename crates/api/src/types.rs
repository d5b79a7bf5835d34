//! `WebGame` custom resource definition.
//!
//! A `WebGame` is the user-declared intent for one game deployment. The
//! controller derives a Deployment, a Service and an Ingress from it and
//! reports the observed rollout plus the reachable addresses in its status.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::DeploymentStatus;
use k8s_openapi::api::core::v1::LocalObjectReference;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::labels;
use crate::validation::{self, ValidationError};

/// API group of the `WebGame` resource.
pub const GROUP: &str = "webgame.webgame.tech";

/// API version of the `WebGame` resource.
pub const VERSION: &str = "v1";

/// Domain used when the record leaves `domain` unset.
pub const DEFAULT_DOMAIN: &str = "localhost";

/// Index page used when the record leaves `indexPage` unset.
pub const DEFAULT_INDEX_PAGE: &str = "/";

fn default_domain() -> String {
    DEFAULT_DOMAIN.to_string()
}

fn default_index_page() -> String {
    DEFAULT_INDEX_PAGE.to_string()
}

/// Desired state of a `WebGame`.
#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "webgame.webgame.tech",
    version = "v1",
    kind = "WebGame",
    namespaced,
    status = "WebGameStatus",
    shortname = "wg",
    derive = "PartialEq",
    printcolumn = r#"{"name":"DisplayName","type":"string","jsonPath":".spec.displayName"}"#,
    printcolumn = r#"{"name":"GameType","type":"string","jsonPath":".spec.gameType"}"#,
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Address","type":"string","jsonPath":".status.gameAddress"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WebGameSpec {
    /// Human readable name of the game instance.
    pub display_name: String,
    /// Game variant. Part of the label selector, so it must not change
    /// once children exist.
    pub game_type: String,
    /// Externally visible domain.
    #[serde(default = "default_domain")]
    pub domain: String,
    /// Page appended to the game address.
    #[serde(default = "default_index_page")]
    pub index_page: String,
    /// Ingress class used for the routing rule; empty means cluster default.
    #[serde(default)]
    pub ingress_class: String,
    /// Port the game container serves on.
    pub server_port: IntOrString,
    /// Replica count; `None` leaves the workload default in place.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    /// Container image.
    pub image: String,
    /// Pull credentials, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_pull_secrets: Vec<LocalObjectReference>,
}

impl WebGameSpec {
    /// Validate the spec for the instance called `name`.
    ///
    /// # Errors
    /// Returns the first `ValidationError` found. Retrying with the same
    /// input cannot succeed; the record has to change.
    pub fn validate(&self, name: &str) -> Result<(), ValidationError> {
        validation::validate_label_value("metadata.name", name)?;
        validation::validate_dns1035_label("metadata.name", name)?;
        validation::validate_label_value("gameType", &self.game_type)?;
        validation::validate_dns1123_label("gameType", &self.game_type)?;
        validation::validate_image(&self.image)?;
        validation::validate_domain(&self.domain)?;
        validation::validate_index_page(&self.index_page)?;
        self.serving_port()?;

        match self.replicas {
            Some(replicas) if replicas < 0 => Err(ValidationError::NegativeReplicas(replicas)),
            _ => Ok(()),
        }
    }

    /// The numeric serving port.
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidPort` for out-of-range numbers and
    /// for named ports that are not numeric.
    pub fn serving_port(&self) -> Result<i32, ValidationError> {
        validation::parse_port(&self.server_port)
    }
}

/// Observed state of a `WebGame`. Written only by the controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebGameStatus {
    /// Rollout state copied from the workload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_status: Option<DeploymentStatus>,
    /// Externally reachable address, `domain/gameType/name/indexPage`.
    #[serde(default)]
    pub game_address: String,
    /// Cluster-internal `ip:port` of the Service; empty until an IP is assigned.
    #[serde(default)]
    pub cluster_endpoint: String,
}

impl WebGame {
    /// Labels binding the workload pods to the endpoint.
    pub fn selector_labels(&self) -> BTreeMap<String, String> {
        labels::selector_labels(&self.spec.game_type, &self.name_any())
    }

    /// Whether the record is being deleted.
    pub fn is_terminating(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use super::*;
    use kube::{CustomResourceExt, Resource};
    use serde_json::json;

    fn sample() -> WebGame {
        serde_json::from_value(json!({
            "apiVersion": "webgame.webgame.tech/v1",
            "kind": "WebGame",
            "metadata": { "name": "sample", "namespace": "games" },
            "spec": {
                "displayName": "Sample 2048",
                "gameType": "2048",
                "serverPort": 80,
                "image": "games/2048:latest",
                "replicas": 1
            }
        }))
        .expect("sample record should deserialize")
    }

    #[test]
    fn test_defaults_applied_on_deserialize() {
        let game = sample();
        assert_eq!(game.spec.domain, DEFAULT_DOMAIN);
        assert_eq!(game.spec.index_page, DEFAULT_INDEX_PAGE);
        assert!(game.spec.ingress_class.is_empty());
        assert!(game.spec.image_pull_secrets.is_empty());
        assert!(game.status.is_none());
    }

    #[test]
    fn test_resource_identity() {
        assert_eq!(WebGame::group(&()), GROUP);
        assert_eq!(WebGame::version(&()), VERSION);
        assert_eq!(WebGame::kind(&()), "WebGame");
    }

    #[test]
    fn test_crd_carries_short_name_and_status() {
        let crd = WebGame::crd();
        assert_eq!(crd.spec.group, GROUP);
        let short = crd.spec.names.short_names.unwrap_or_default();
        assert!(short.contains(&"wg".to_string()));
        let version = crd.spec.versions.first().expect("one version");
        assert!(
            version
                .subresources
                .as_ref()
                .and_then(|s| s.status.as_ref())
                .is_some()
        );
    }

    #[test]
    fn test_manifest_from_yaml() {
        let manifest = r"
apiVersion: webgame.webgame.tech/v1
kind: WebGame
metadata:
  name: sample
  namespace: games
spec:
  displayName: Sample 2048
  gameType: '2048'
  serverPort: '8080'
  image: games/2048:latest
  imagePullSecrets:
    - name: regcred
";
        let game: WebGame = serde_yaml::from_str(manifest).expect("manifest should parse");
        assert_eq!(game.spec.game_type, "2048");
        assert_eq!(game.spec.domain, DEFAULT_DOMAIN);
        assert_eq!(game.spec.replicas, None);
        assert_eq!(game.spec.serving_port(), Ok(8080));
        assert_eq!(game.spec.image_pull_secrets.len(), 1);
        assert!(game.spec.validate("sample").is_ok());
    }

    #[test]
    fn test_crd_yaml_lists_printer_columns() {
        let yaml = serde_yaml::to_string(&WebGame::crd()).expect("crd should serialize");
        assert!(yaml.contains("webgames.webgame.webgame.tech"));
        for column in ["DisplayName", "GameType", "Replicas", "Address", "Age"] {
            assert!(yaml.contains(column), "missing printer column {column}");
        }
    }

    #[test]
    fn test_selector_labels() {
        let labels = sample().selector_labels();
        assert_eq!(labels.get("gameType").map(String::as_str), Some("2048"));
        assert_eq!(labels.get("instance").map(String::as_str), Some("sample"));
        assert_eq!(labels.len(), 2);
    }

    #[test]
    fn test_named_numeric_port_is_accepted() {
        let mut game = sample();
        game.spec.server_port = IntOrString::String("8080".to_string());
        assert_eq!(game.spec.serving_port(), Ok(8080));
    }

    #[test]
    fn test_validate_rejects_negative_replicas() {
        let mut game = sample();
        game.spec.replicas = Some(-1);
        assert_eq!(
            game.spec.validate("sample"),
            Err(ValidationError::NegativeReplicas(-1))
        );
    }

    #[test]
    fn test_validate_rejects_game_type_unusable_as_container_name() {
        let mut game = sample();
        game.spec.game_type = "Tetris_v2.beta".to_string();
        assert!(matches!(
            game.spec.validate("sample"),
            Err(ValidationError::InvalidName { field: "gameType", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_name_unusable_as_service_name() {
        assert!(matches!(
            sample().spec.validate("2048"),
            Err(ValidationError::InvalidName { field: "metadata.name", .. })
        ));
    }

    #[test]
    fn test_validate_accepts_sample() {
        assert!(sample().spec.validate("sample").is_ok());
    }

    #[test]
    fn test_status_roundtrip_without_deployment_status() {
        let status = WebGameStatus {
            deployment_status: None,
            game_address: "localhost/2048/sample/".to_string(),
            cluster_endpoint: String::new(),
        };
        let value = serde_json::to_value(&status).expect("serialize");
        assert!(value.get("deploymentStatus").is_none());
        let back: WebGameStatus = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, status);
    }
}
