//! # webgame-controller
//!
//! Entry point of the WebGame controller.
//!
//! - `run`: connect to the cluster from the ambient kubeconfig or the
//!   in-cluster service account and reconcile until SIGTERM/SIGINT
//! - `crd`: print the CustomResourceDefinition to install beforehand

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

use anyhow::{Context, Result};
use clap::Parser;
use kube::Client;
use tracing::info;

use webgame::cli::{Cli, Commands};
use webgame::{controller, crd_yaml, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.log_format);

    match cli.command {
        Commands::Crd => {
            let yaml = crd_yaml().context("Failed to render the WebGame CRD")?;
            print!("{yaml}");
            Ok(())
        }
        Commands::Run(args) => {
            let client = Client::try_default()
                .await
                .context("Failed to create a Kubernetes client; check KUBECONFIG or the in-cluster service account")?;
            info!(version = env!("CARGO_PKG_VERSION"), "Connected to cluster");

            controller::run(client, args)
                .await
                .context("WebGame controller failed")
        }
    }
}
