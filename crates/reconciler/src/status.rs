//! Observed status projection.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use webgame_api::{WebGame, WebGameStatus};

use crate::builder::game_address;

/// Derive the status of `game` from its converged children.
///
/// Only call this once every child has converged; the published address
/// must never point at a backend that does not exist yet.
pub fn project(game: &WebGame, workload: &Deployment, endpoint: &Service) -> WebGameStatus {
    WebGameStatus {
        deployment_status: workload.status.clone(),
        game_address: game_address(game),
        cluster_endpoint: cluster_endpoint(endpoint),
    }
}

/// `ip:port` of the endpoint, or empty while no cluster IP is assigned.
pub fn cluster_endpoint(endpoint: &Service) -> String {
    let Some(spec) = endpoint.spec.as_ref() else {
        return String::new();
    };
    let ip = spec
        .cluster_ip
        .as_deref()
        .filter(|ip| !ip.is_empty() && *ip != "None");
    let port = spec.ports.as_ref().and_then(|ports| ports.first()).map(|p| p.port);

    match (ip, port) {
        (Some(ip), Some(port)) => format!("{ip}:{port}"),
        (Some(ip), None) => ip.to_string(),
        (None, _) => String::new(),
    }
}
