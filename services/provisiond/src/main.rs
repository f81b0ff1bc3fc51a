//! provisiond
//!
//! HTTP service for the node-lifecycle core. Exposes provisioning requests,
//! installer phase-report ingestion, deployment status queries, cleanup
//! triggers, and cluster formation. The engines run synchronously inside the
//! request handlers; the only background work is the optional reaper task
//! (timeout detection + orphan sweep), which this binary owns.

mod api;
mod error;
mod shell;

use anyhow::Context;
use api::AppState;
use cloud_client::{CloudClient, CloudClientTrait};
use ledger::{Ledger, MemoryLedger};
use lifecycle::{
    ClusterFormationCoordinator, CompensationEngine, LifecycleConfig, ProvisioningOrchestrator,
    RemoteShell, StatusMachine,
};
use shell::SshShell;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    info!("Starting provisiond");

    // Load configuration from environment variables
    let cloud_url = env::var("CLOUD_API_URL")
        .unwrap_or_else(|_| "http://cloud-api.internal:8080".to_string());
    let cloud_token =
        env::var("CLOUD_API_TOKEN").context("CLOUD_API_TOKEN environment variable is required")?;
    let listen_addr =
        env::var("PROVISIOND_LISTEN").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let reaper_interval_secs: u64 = env::var("PROVISIOND_REAPER_INTERVAL_SECS")
        .unwrap_or_else(|_| "0".to_string())
        .parse()
        .context("PROVISIOND_REAPER_INTERVAL_SECS must be a number of seconds")?;
    let orphan_max_age_hours: u64 = env::var("PROVISIOND_ORPHAN_MAX_AGE_HOURS")
        .unwrap_or_else(|_| "24".to_string())
        .parse()
        .context("PROVISIOND_ORPHAN_MAX_AGE_HOURS must be a number of hours")?;

    let config = Arc::new(LifecycleConfig::from_env()?);

    info!("Configuration:");
    info!("  Cloud API URL: {}", cloud_url);
    info!("  Listen address: {}", listen_addr);
    info!("  DNS zone: {}", config.dns_zone);
    info!("  Cluster name: {}", config.cluster_name);
    if reaper_interval_secs == 0 {
        info!("  Reaper: disabled (sweep via POST /v1/cleanup/orphaned)");
    } else {
        info!(
            "  Reaper: every {}s, orphan threshold {}h",
            reaper_interval_secs, orphan_max_age_hours
        );
    }

    // Create the cloud client and validate token/connectivity up front
    let cloud_client = CloudClient::new(cloud_url.clone(), cloud_token)?;
    info!("Validating cloud API token and connectivity...");
    cloud_client.validate_token().await.with_context(|| {
        format!(
            "failed to validate cloud API token; check CLOUD_API_TOKEN and reachability of {}",
            cloud_url
        )
    })?;
    info!("Cloud API token validated and connectivity established");

    let cloud: Arc<dyn CloudClientTrait> = Arc::new(cloud_client);
    let ledger: Arc<dyn Ledger> = Arc::new(MemoryLedger::new());
    let remote_shell: Arc<dyn RemoteShell> = Arc::new(SshShell::from_env());

    let orchestrator = Arc::new(ProvisioningOrchestrator::new(
        Arc::clone(&cloud),
        Arc::clone(&ledger),
        Arc::clone(&config),
    ));
    let compensation = Arc::new(CompensationEngine::new(
        Arc::clone(&cloud),
        Arc::clone(&ledger),
        Arc::clone(&config),
    ));
    let status = Arc::new(StatusMachine::new(
        Arc::clone(&ledger),
        Arc::clone(&compensation),
        Arc::clone(&config),
    ));
    let formation = Arc::new(ClusterFormationCoordinator::new(
        Arc::clone(&ledger),
        remote_shell,
        Arc::clone(&config),
    ));

    if reaper_interval_secs > 0 {
        spawn_reaper(
            Arc::clone(&status),
            Arc::clone(&compensation),
            Duration::from_secs(reaper_interval_secs),
            orphan_max_age_hours,
        );
    }

    let state = AppState {
        orchestrator,
        compensation,
        status,
        formation,
    };

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", listen_addr))?;
    info!("provisiond listening on {}", listen_addr);
    axum::serve(listener, api::router(state))
        .await
        .context("server error")?;
    Ok(())
}

/// Periodic timeout detection and orphan sweep
fn spawn_reaper(
    status: Arc<StatusMachine>,
    compensation: Arc<CompensationEngine>,
    interval: Duration,
    max_age_hours: u64,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match status.detect_timeouts().await {
                Ok(timed_out) if !timed_out.is_empty() => {
                    warn!("Reaper timed out nodes: {:?}", timed_out);
                }
                Ok(_) => {}
                Err(e) => warn!("Reaper timeout detection failed: {}", e),
            }
            let sweep = compensation.cleanup_orphaned(max_age_hours).await;
            if !sweep.cleaned.is_empty() {
                info!(
                    "Reaper cleaned {} of {} orphaned nodes",
                    sweep.cleaned.len(),
                    sweep.scanned
                );
            }
        }
    });
}
