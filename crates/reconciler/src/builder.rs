//! Desired child manifests.
//!
//! Everything here is a pure function of the `WebGame`: the same record
//! always yields the same manifests, and no function touches the store.
//! Ownership references are added later by the applier.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, PodSpec, PodTemplateSpec, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use webgame_api::{ValidationError, WebGame};

/// Annotation telling the ingress controller to strip the routing prefix.
pub const REWRITE_TARGET_ANNOTATION: &str = "nginx.ingress.kubernetes.io/rewrite-target";

/// Name of the serving port on the container and the Service.
pub const PORT_NAME: &str = "http";

/// Protocol of the serving port.
pub const PORT_PROTOCOL: &str = "TCP";

/// Path type of the single routing path.
pub const PATH_TYPE: &str = "Prefix";

/// Service type of the endpoint.
pub const SERVICE_TYPE: &str = "ClusterIP";

/// External path prefix, `/<gameType>/<name>`.
pub fn routing_path(game: &WebGame) -> String {
    format!("/{}/{}", game.spec.game_type, game.name_any())
}

/// Externally reachable address, `domain/gameType/name/indexPage`.
pub fn game_address(game: &WebGame) -> String {
    let path = routing_path(game);
    format!(
        "{}/{}/{}",
        game.spec.domain,
        path.trim_start_matches('/'),
        game.spec.index_page.trim_start_matches('/')
    )
}

fn child_metadata(game: &WebGame) -> ObjectMeta {
    ObjectMeta {
        name: Some(game.name_any()),
        namespace: game.namespace(),
        labels: Some(game.selector_labels()),
        ..Default::default()
    }
}

/// Build the workload for `game`.
///
/// # Errors
/// Returns `ValidationError::InvalidPort` when the serving port is not a
/// usable number.
pub fn build_workload(game: &WebGame) -> Result<Deployment, ValidationError> {
    let port = game.spec.serving_port()?;
    let labels = game.selector_labels();
    let pull_secrets = &game.spec.image_pull_secrets;

    let container = Container {
        name: game.spec.game_type.clone(),
        image: Some(game.spec.image.clone()),
        ports: Some(vec![ContainerPort {
            name: Some(PORT_NAME.to_string()),
            container_port: port,
            protocol: Some(PORT_PROTOCOL.to_string()),
            ..Default::default()
        }]),
        ..Default::default()
    };

    Ok(Deployment {
        metadata: child_metadata(game),
        spec: Some(DeploymentSpec {
            replicas: game.spec.replicas,
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    image_pull_secrets: (!pull_secrets.is_empty()).then(|| pull_secrets.clone()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Build the endpoint for `game`.
///
/// # Errors
/// Returns `ValidationError::InvalidPort` when the serving port is not a
/// usable number.
pub fn build_endpoint(game: &WebGame) -> Result<Service, ValidationError> {
    let port = game.spec.serving_port()?;

    Ok(Service {
        metadata: child_metadata(game),
        spec: Some(ServiceSpec {
            type_: Some(SERVICE_TYPE.to_string()),
            selector: Some(game.selector_labels()),
            ports: Some(vec![ServicePort {
                name: Some(PORT_NAME.to_string()),
                port,
                target_port: Some(IntOrString::Int(port)),
                protocol: Some(PORT_PROTOCOL.to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Build the routing rule for `game`, forwarding to the endpoint named
/// `endpoint_name`.
///
/// # Errors
/// Returns `ValidationError::InvalidPort` when the serving port is not a
/// usable number.
pub fn build_routing_rule(game: &WebGame, endpoint_name: &str) -> Result<Ingress, ValidationError> {
    let port = game.spec.serving_port()?;
    let class = &game.spec.ingress_class;

    let mut metadata = child_metadata(game);
    metadata.annotations = Some(BTreeMap::from([(
        REWRITE_TARGET_ANNOTATION.to_string(),
        "/".to_string(),
    )]));

    let backend = IngressBackend {
        service: Some(IngressServiceBackend {
            name: endpoint_name.to_string(),
            port: Some(ServiceBackendPort {
                number: Some(port),
                ..Default::default()
            }),
        }),
        ..Default::default()
    };

    Ok(Ingress {
        metadata,
        spec: Some(IngressSpec {
            ingress_class_name: (!class.is_empty()).then(|| class.clone()),
            rules: Some(vec![IngressRule {
                host: Some(game.spec.domain.clone()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some(routing_path(game)),
                        path_type: PATH_TYPE.to_string(),
                        backend,
                    }],
                }),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use serde_json::json;

    fn sample() -> WebGame {
        serde_json::from_value(json!({
            "apiVersion": "webgame.webgame.tech/v1",
            "kind": "WebGame",
            "metadata": {"name": "sample", "namespace": "games", "uid": "uid-1"},
            "spec": {
                "displayName": "2048",
                "gameType": "2048",
                "indexPage": "index.html",
                "serverPort": 80,
                "image": "games/2048:latest",
                "replicas": 1,
                "imagePullSecrets": [{"name": "regcred"}, {"name": "mirror"}]
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_routing_path_and_address() {
        let game = sample();
        assert_eq!(routing_path(&game), "/2048/sample");
        assert_eq!(game_address(&game), "localhost/2048/sample/index.html");
    }

    #[test]
    fn test_address_trims_leading_slash_of_index_page() {
        let mut game = sample();
        game.spec.index_page = "/play/index.html".to_string();
        assert_eq!(game_address(&game), "localhost/2048/sample/play/index.html");
    }

    #[test]
    fn test_build_workload() {
        let game = sample();
        let workload = build_workload(&game).unwrap();
        let spec = workload.spec.as_ref().unwrap();

        assert_eq!(workload.metadata.name.as_deref(), Some("sample"));
        assert_eq!(workload.metadata.namespace.as_deref(), Some("games"));
        assert_eq!(spec.replicas, Some(1));
        assert_eq!(spec.selector.match_labels, Some(game.selector_labels()));

        let template = &spec.template;
        assert_eq!(
            template.metadata.as_ref().and_then(|m| m.labels.clone()),
            Some(game.selector_labels())
        );

        let pod = template.spec.as_ref().unwrap();
        assert_eq!(pod.containers.len(), 1);
        assert_eq!(pod.containers[0].name, "2048");
        assert_eq!(pod.containers[0].image.as_deref(), Some("games/2048:latest"));
        let ports = pod.containers[0].ports.as_ref().unwrap();
        assert_eq!(ports[0].container_port, 80);
        assert_eq!(ports[0].name.as_deref(), Some(PORT_NAME));

        assert_eq!(
            serde_json::to_value(&pod.image_pull_secrets).unwrap(),
            json!([{"name": "regcred"}, {"name": "mirror"}])
        );
    }

    #[test]
    fn test_build_workload_leaves_replicas_unset() {
        let mut game = sample();
        game.spec.replicas = None;
        game.spec.image_pull_secrets.clear();
        let workload = build_workload(&game).unwrap();
        let spec = workload.spec.unwrap();
        assert_eq!(spec.replicas, None);
        assert_eq!(spec.template.spec.unwrap().image_pull_secrets, None);
    }

    #[test]
    fn test_build_endpoint() {
        let game = sample();
        let endpoint = build_endpoint(&game).unwrap();
        let spec = endpoint.spec.unwrap();

        assert_eq!(spec.selector, Some(game.selector_labels()));
        assert_eq!(spec.type_.as_deref(), Some(SERVICE_TYPE));
        assert_eq!(spec.cluster_ip, None);
        let ports = spec.ports.unwrap();
        assert_eq!(ports[0].port, 80);
        assert_eq!(ports[0].target_port, Some(IntOrString::Int(80)));
    }

    #[test]
    fn test_build_routing_rule() {
        let game = sample();
        let rule = build_routing_rule(&game, "sample").unwrap();

        assert_eq!(
            rule.metadata
                .annotations
                .as_ref()
                .and_then(|a| a.get(REWRITE_TARGET_ANNOTATION))
                .map(String::as_str),
            Some("/")
        );

        let spec = rule.spec.unwrap();
        assert_eq!(spec.ingress_class_name, None);
        let rules = spec.rules.unwrap();
        assert_eq!(rules[0].host.as_deref(), Some("localhost"));
        let path = &rules[0].http.as_ref().unwrap().paths[0];
        assert_eq!(path.path.as_deref(), Some("/2048/sample"));
        assert_eq!(path.path_type, PATH_TYPE);
        let service = path.backend.service.as_ref().unwrap();
        assert_eq!(service.name, "sample");
        assert_eq!(service.port.as_ref().and_then(|p| p.number), Some(80));
    }

    #[test]
    fn test_build_routing_rule_with_class() {
        let mut game = sample();
        game.spec.ingress_class = "nginx".to_string();
        let rule = build_routing_rule(&game, "sample").unwrap();
        assert_eq!(
            rule.spec.unwrap().ingress_class_name.as_deref(),
            Some("nginx")
        );
    }

    #[test]
    fn test_builders_are_deterministic() {
        let game = sample();
        assert_eq!(build_workload(&game), build_workload(&game));
        assert_eq!(build_endpoint(&game), build_endpoint(&game));
        assert_eq!(
            build_routing_rule(&game, "sample"),
            build_routing_rule(&game, "sample")
        );
    }

    #[test]
    fn test_named_port_is_rejected() {
        let mut game = sample();
        game.spec.server_port = IntOrString::String("web".to_string());
        assert!(build_workload(&game).is_err());
        assert!(build_endpoint(&game).is_err());
        assert!(build_routing_rule(&game, "sample").is_err());
    }
}
