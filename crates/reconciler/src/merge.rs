//! Converging stored children toward their desired manifests.
//!
//! Each function mutates only the fields the controller owns. Labels and
//! annotations are merged (desired wins on conflicting keys), so anything
//! added by other actors survives. Server-assigned fields such as the
//! Service cluster IP are never touched, which keeps a converged child
//! byte-for-byte stable across passes.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, ContainerPort, PodSpec, Service, ServicePort};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use thiserror::Error;
use webgame_api::labels::{merge_labels, to_selector_string};

use crate::builder::PORT_PROTOCOL;

/// The stored workload selects different pods than the record asks for.
///
/// Deployment selectors are immutable, so this only happens when the
/// record's `gameType` changed after the workload was created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("workload selector '{existing}' cannot change to '{desired}'")]
pub struct SelectorMismatch {
    pub existing: String,
    pub desired: String,
}

/// Merge desired labels and annotations into stored metadata.
pub fn merge_metadata(existing: &mut ObjectMeta, desired: &ObjectMeta) {
    merge_map(&mut existing.labels, desired.labels.as_ref());
    merge_map(&mut existing.annotations, desired.annotations.as_ref());
}

fn merge_map(existing: &mut Option<BTreeMap<String, String>>, desired: Option<&BTreeMap<String, String>>) {
    let Some(desired) = desired.filter(|d| !d.is_empty()) else {
        return;
    };
    let merged = merge_labels(existing.as_ref().unwrap_or(&BTreeMap::new()), desired);
    *existing = Some(merged);
}

/// Converge a stored workload.
///
/// The selector is written only while empty. Replicas are written only
/// when the record sets them, leaving the count to other actors (such as
/// an autoscaler) otherwise.
///
/// # Errors
/// Returns `SelectorMismatch` when the stored selector differs from the
/// desired one.
pub fn converge_workload(existing: &mut Deployment, desired: &Deployment) -> Result<(), SelectorMismatch> {
    merge_metadata(&mut existing.metadata, &desired.metadata);

    let Some(want) = desired.spec.as_ref() else {
        return Ok(());
    };
    let spec = existing.spec.get_or_insert_with(Default::default);

    let wanted_selector = want.selector.match_labels.clone().unwrap_or_default();
    match spec.selector.match_labels.as_ref().filter(|m| !m.is_empty()) {
        Some(current) if *current != wanted_selector => {
            return Err(SelectorMismatch {
                existing: to_selector_string(current),
                desired: to_selector_string(&wanted_selector),
            });
        }
        Some(_) => {}
        None => spec.selector = want.selector.clone(),
    }

    if want.replicas.is_some() {
        spec.replicas = want.replicas;
    }

    if let Some(want_meta) = want.template.metadata.as_ref() {
        let meta = spec.template.metadata.get_or_insert_with(Default::default);
        merge_metadata(meta, want_meta);
    }

    if let Some(want_pod) = want.template.spec.as_ref() {
        let pod = spec.template.spec.get_or_insert_with(Default::default);
        converge_pod(pod, want_pod);
    }

    Ok(())
}

fn converge_pod(pod: &mut PodSpec, desired: &PodSpec) {
    if pod.image_pull_secrets != desired.image_pull_secrets {
        pod.image_pull_secrets.clone_from(&desired.image_pull_secrets);
    }

    for want in &desired.containers {
        match pod.containers.iter_mut().find(|c| c.name == want.name) {
            Some(container) => converge_container(container, want),
            None => pod.containers.push(want.clone()),
        }
    }
}

fn converge_container(container: &mut Container, desired: &Container) {
    if container.image != desired.image {
        container.image.clone_from(&desired.image);
    }

    let same_ports = match (container.ports.as_deref(), desired.ports.as_deref()) {
        (Some(current), Some(want)) => {
            current.len() == want.len() && current.iter().zip(want).all(|(a, b)| same_container_port(a, b))
        }
        (None, None) => true,
        (Some(current), None) => current.is_empty(),
        (None, Some(want)) => want.is_empty(),
    };
    if !same_ports {
        container.ports.clone_from(&desired.ports);
    }
}

fn same_container_port(current: &ContainerPort, desired: &ContainerPort) -> bool {
    current.container_port == desired.container_port
        && current.name == desired.name
        && protocol(current.protocol.as_deref()) == protocol(desired.protocol.as_deref())
}

/// Converge a stored endpoint. The assigned cluster IP is left alone.
pub fn converge_endpoint(existing: &mut Service, desired: &Service) {
    merge_metadata(&mut existing.metadata, &desired.metadata);

    let Some(want) = desired.spec.as_ref() else {
        return;
    };
    let spec = existing.spec.get_or_insert_with(Default::default);

    if want.type_.is_some() && spec.type_ != want.type_ {
        spec.type_.clone_from(&want.type_);
    }
    if spec.selector != want.selector {
        spec.selector.clone_from(&want.selector);
    }

    let same_ports = match (spec.ports.as_deref(), want.ports.as_deref()) {
        (Some(current), Some(wanted)) => {
            current.len() == wanted.len()
                && current.iter().zip(wanted).all(|(a, b)| same_service_port(a, b))
        }
        (None, None) => true,
        _ => false,
    };
    if !same_ports {
        spec.ports.clone_from(&want.ports);
    }
}

fn same_service_port(current: &ServicePort, desired: &ServicePort) -> bool {
    current.port == desired.port
        && current.name == desired.name
        && current.target_port == desired.target_port
        && protocol(current.protocol.as_deref()) == protocol(desired.protocol.as_deref())
}

/// Converge a stored routing rule.
///
/// The ingress class is written only when the record names one, so a
/// class defaulted by the cluster is not fought over.
pub fn converge_routing_rule(existing: &mut Ingress, desired: &Ingress) {
    merge_metadata(&mut existing.metadata, &desired.metadata);

    let Some(want) = desired.spec.as_ref() else {
        return;
    };
    let spec = existing.spec.get_or_insert_with(Default::default);

    if want.ingress_class_name.is_some() && spec.ingress_class_name != want.ingress_class_name {
        spec.ingress_class_name.clone_from(&want.ingress_class_name);
    }
    if spec.rules != want.rules {
        spec.rules.clone_from(&want.rules);
    }
}

// Ports without a protocol default to TCP on the server.
fn protocol(value: Option<&str>) -> &str {
    value.unwrap_or(PORT_PROTOCOL)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::builder::{build_endpoint, build_routing_rule, build_workload};
    use serde_json::json;
    use webgame_api::WebGame;

    fn game(game_type: &str) -> WebGame {
        serde_json::from_value(json!({
            "apiVersion": "webgame.webgame.tech/v1",
            "kind": "WebGame",
            "metadata": {"name": "sample", "namespace": "games", "uid": "uid-1"},
            "spec": {
                "gameType": game_type,
                "serverPort": 80,
                "image": "games/2048:latest",
                "replicas": 2
            }
        }))
        .unwrap()
    }

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_converge_empty_workload_matches_desired() {
        let desired = build_workload(&game("2048")).unwrap();
        let mut existing = Deployment::default();
        converge_workload(&mut existing, &desired).unwrap();
        assert_eq!(existing.spec, desired.spec);
        assert_eq!(existing.metadata.labels, desired.metadata.labels);
    }

    #[test]
    fn test_converge_workload_is_idempotent() {
        let desired = build_workload(&game("2048")).unwrap();
        let mut existing = Deployment::default();
        converge_workload(&mut existing, &desired).unwrap();
        let once = existing.clone();
        converge_workload(&mut existing, &desired).unwrap();
        assert_eq!(existing, once);
    }

    #[test]
    fn test_converge_workload_keeps_foreign_labels() {
        let desired = build_workload(&game("2048")).unwrap();
        let mut existing = desired.clone();
        existing.metadata.labels = Some(labels(&[
            ("team", "arcade"),
            ("instance", "stale"),
        ]));

        converge_workload(&mut existing, &desired).unwrap();

        let merged = existing.metadata.labels.unwrap();
        assert_eq!(merged.get("team").map(String::as_str), Some("arcade"));
        assert_eq!(merged.get("instance").map(String::as_str), Some("sample"));
        assert_eq!(merged.get("gameType").map(String::as_str), Some("2048"));
    }

    #[test]
    fn test_converge_workload_repairs_owned_fields() {
        let desired = build_workload(&game("2048")).unwrap();
        let mut existing = desired.clone();
        {
            let spec = existing.spec.as_mut().unwrap();
            spec.replicas = Some(5);
            let pod = spec.template.spec.as_mut().unwrap();
            pod.containers[0].image = Some("games/2048:old".to_string());
            pod.containers[0].ports = None;
        }

        converge_workload(&mut existing, &desired).unwrap();
        assert_eq!(existing.spec, desired.spec);
    }

    #[test]
    fn test_converge_workload_keeps_server_defaults() {
        let desired = build_workload(&game("2048")).unwrap();
        let mut existing = desired.clone();
        {
            let spec = existing.spec.as_mut().unwrap();
            spec.revision_history_limit = Some(10);
            let container = &mut spec.template.spec.as_mut().unwrap().containers[0];
            container.image_pull_policy = Some("Always".to_string());
            container.ports.as_mut().unwrap()[0].protocol = None;
        }
        let before = existing.clone();

        converge_workload(&mut existing, &desired).unwrap();
        assert_eq!(existing, before);
    }

    #[test]
    fn test_converge_workload_leaves_unset_replicas_alone() {
        let mut record = game("2048");
        record.spec.replicas = None;
        let desired = build_workload(&record).unwrap();
        let mut existing = desired.clone();
        existing.spec.as_mut().unwrap().replicas = Some(3);

        converge_workload(&mut existing, &desired).unwrap();
        assert_eq!(existing.spec.unwrap().replicas, Some(3));
    }

    #[test]
    fn test_converge_workload_rejects_selector_change() {
        let mut existing = build_workload(&game("2048")).unwrap();
        let desired = build_workload(&game("tetris")).unwrap();
        let before = existing.clone();

        let err = converge_workload(&mut existing, &desired).unwrap_err();
        assert_eq!(err.existing, "gameType=2048,instance=sample");
        assert_eq!(err.desired, "gameType=tetris,instance=sample");
        assert_eq!(existing.spec, before.spec);
    }

    #[test]
    fn test_converge_endpoint_keeps_cluster_ip() {
        let desired = build_endpoint(&game("2048")).unwrap();
        let mut existing = desired.clone();
        {
            let spec = existing.spec.as_mut().unwrap();
            spec.cluster_ip = Some("10.96.0.7".to_string());
            spec.session_affinity = Some("None".to_string());
        }
        let before = existing.clone();

        converge_endpoint(&mut existing, &desired);
        assert_eq!(existing, before);
    }

    #[test]
    fn test_converge_endpoint_repairs_selector_and_ports() {
        let desired = build_endpoint(&game("2048")).unwrap();
        let mut existing = desired.clone();
        {
            let spec = existing.spec.as_mut().unwrap();
            spec.selector = Some(labels(&[("app", "other")]));
            spec.ports.as_mut().unwrap()[0].port = 8080;
        }

        converge_endpoint(&mut existing, &desired);
        assert_eq!(existing.spec, desired.spec);
    }

    #[test]
    fn test_converge_routing_rule() {
        let desired = build_routing_rule(&game("2048"), "sample").unwrap();
        let mut existing = Ingress::default();
        existing.metadata.annotations = Some(labels(&[("owner", "ops")]));

        converge_routing_rule(&mut existing, &desired);

        assert_eq!(existing.spec, desired.spec);
        let annotations = existing.metadata.annotations.unwrap();
        assert_eq!(annotations.get("owner").map(String::as_str), Some("ops"));
        assert_eq!(
            annotations
                .get(crate::builder::REWRITE_TARGET_ANNOTATION)
                .map(String::as_str),
            Some("/")
        );
    }

    #[test]
    fn test_converge_routing_rule_keeps_defaulted_class() {
        let desired = build_routing_rule(&game("2048"), "sample").unwrap();
        let mut existing = desired.clone();
        existing.spec.as_mut().unwrap().ingress_class_name = Some("nginx".to_string());
        let before = existing.clone();

        converge_routing_rule(&mut existing, &desired);
        assert_eq!(existing, before);
    }
}
