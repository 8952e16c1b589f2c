//! Muxgate provisioning daemon
//!
//! Wires one multiplexed ingress port to four proxy protocols behind
//! a fallback dispatch chain, exposes it through an outbound tunnel,
//! discovers the tunnel's public hostname, and publishes subscription
//! links for clients. The proxy engine, tunnel client, and telemetry
//! agent are opaque external binaries; this daemon only provisions
//! and launches them.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mg_core::config::{self, Settings, WorkPaths};
use mg_core::{export, launch, supervise};
use mg_core::{DomainDiscovery, IngressPlan, SubscriptionExporter, SubscriptionStore};

#[derive(Parser)]
#[command(name = "mg-node")]
#[command(about = "Muxgate provisioning daemon - multiplexed ingress behind an outbound tunnel")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Node identity (UUID) used as the protocol credential
    #[arg(long, env = "MG_NODE_ID")]
    node_id: Option<String>,

    /// Port for the public multiplexed inbound
    #[arg(long, env = "MG_INGRESS_PORT")]
    ingress_port: Option<u16>,

    /// Fixed tunnel hostname (omit to discover a quick-tunnel hostname)
    #[arg(long, env = "MG_TUNNEL_DOMAIN")]
    tunnel_domain: Option<String>,

    /// Tunnel credential: token or JSON blob (omit for a quick tunnel)
    #[arg(long, env = "MG_TUNNEL_CREDENTIAL")]
    tunnel_credential: Option<String>,

    /// Edge address exported descriptors point at
    #[arg(long, env = "MG_EDGE_HOST")]
    edge_host: Option<String>,

    /// Edge port exported descriptors point at
    #[arg(long, env = "MG_EDGE_PORT")]
    edge_port: Option<u16>,

    /// Name prefix for exported descriptors
    #[arg(long, env = "MG_NODE_LABEL")]
    node_label: Option<String>,

    /// Telemetry server host (omit to skip the telemetry agent)
    #[arg(long, env = "MG_TELEMETRY_HOST")]
    telemetry_host: Option<String>,

    /// Telemetry auth token
    #[arg(long, env = "MG_TELEMETRY_TOKEN")]
    telemetry_token: Option<String>,

    /// Registry base URL for subscription sync
    #[arg(long, env = "MG_REGISTRY_URL")]
    registry_url: Option<String>,

    /// Public URL of this service
    #[arg(long, env = "MG_PUBLIC_URL")]
    public_url: Option<String>,

    /// Path segment the front-end serves the subscription under
    #[arg(long, env = "MG_SUB_PATH")]
    sub_path: Option<String>,

    /// Register the public URL with the keep-alive service
    #[arg(long, env = "MG_AUTO_ACCESS")]
    auto_access: bool,

    /// Working directory for generated files
    #[arg(long, env = "MG_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Proxy engine binary
    #[arg(long, env = "MG_ENGINE_BIN")]
    engine_bin: Option<PathBuf>,

    /// Tunnel client binary
    #[arg(long, env = "MG_TUNNEL_BIN")]
    tunnel_bin: Option<PathBuf>,

    /// Telemetry agent binary
    #[arg(long, env = "MG_AGENT_BIN")]
    agent_bin: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Suppress everything except errors
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; quiet mode silences best-effort failures
    let log_level = if args.quiet { "error" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Muxgate node starting...");

    // Load configuration
    let mut settings = if let Some(config_path) = &args.config {
        config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        let default_path = config::default_config_path();
        if default_path.exists() {
            config::load_config(&default_path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
                Settings::default()
            })
        } else {
            tracing::info!("Using default configuration");
            Settings::default()
        }
    };
    apply_overrides(&mut settings, args);

    let store = SubscriptionStore::new();
    run(&settings, store).await?;

    // Stay resident: the latest-export store keeps serving readers and
    // the detached children keep running until shutdown
    tokio::signal::ctrl_c().await?;
    tracing::info!("Muxgate node shutting down");
    Ok(())
}

/// Run the provisioning pipeline once.
///
/// Only the routing-config write is fatal; every other step is
/// best-effort or an expected absence.
async fn run(settings: &Settings, store: SubscriptionStore) -> Result<()> {
    let paths = WorkPaths::new(&settings.work_dir);

    std::fs::create_dir_all(&settings.work_dir)
        .with_context(|| format!("Failed to create work dir {:?}", settings.work_dir))?;

    // A stale snapshot from a previous deployment would shadow this one
    if !settings.registry_url.is_empty() {
        match std::fs::remove_file(&paths.subscription) {
            Ok(()) => tracing::debug!("Cleared stale subscription snapshot"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::debug!("Failed to clear stale subscription snapshot: {}", e),
        }
    }

    // The routing config is the engine's sole input; without it nothing
    // else can proceed
    let plan = IngressPlan::synthesize(&settings.node_id, settings.ingress_port);
    plan.write_to(&paths.routing_config)
        .context("Failed to materialize routing configuration")?;
    tracing::info!(
        "Routing configuration written to {:?} (ingress port {})",
        paths.routing_config,
        settings.ingress_port
    );

    // Launch the externals; each is independent and best-effort
    supervise::spawn_detached(&launch::engine_spec(
        &settings.engine_bin,
        &paths.routing_config,
    ));

    if settings.telemetry_enabled() {
        supervise::spawn_detached(&launch::agent_spec(
            &settings.agent_bin,
            &settings.telemetry_host,
            &settings.telemetry_token,
        ));
    }

    match launch::tunnel_spec(
        &settings.tunnel_bin,
        &settings.tunnel_credential,
        &settings.tunnel_domain,
        settings.ingress_port,
        &paths,
    ) {
        Ok(spec) => {
            supervise::spawn_detached(&spec);
        }
        Err(e) => tracing::warn!("Failed to plan tunnel launch: {}", e),
    }

    // Blocks for up to the full retry budget; export has a hard
    // dependency on a resolved hostname
    let discovery = DomainDiscovery::new(paths.tunnel_log.clone());
    match discovery
        .resolve(&settings.tunnel_domain, &settings.tunnel_credential)
        .await
    {
        Some(domain) => {
            let exporter = SubscriptionExporter::new(settings, &paths, store);
            exporter.export(&domain).await;
        }
        None => {
            tracing::info!("No public hostname resolved; subscription export skipped");
        }
    }

    if settings.auto_access && !settings.public_url.is_empty() {
        export::spawn_keep_alive(settings.public_url.clone());
    }

    Ok(())
}

/// Apply command-line overrides on top of the loaded configuration
fn apply_overrides(settings: &mut Settings, args: Args) {
    if let Some(node_id) = args.node_id {
        settings.node_id = node_id;
    }
    if let Some(ingress_port) = args.ingress_port {
        settings.ingress_port = ingress_port;
    }
    if let Some(tunnel_domain) = args.tunnel_domain {
        settings.tunnel_domain = tunnel_domain;
    }
    if let Some(tunnel_credential) = args.tunnel_credential {
        settings.tunnel_credential = tunnel_credential;
    }
    if let Some(edge_host) = args.edge_host {
        settings.edge_host = edge_host;
    }
    if let Some(edge_port) = args.edge_port {
        settings.edge_port = edge_port;
    }
    if let Some(node_label) = args.node_label {
        settings.node_label = node_label;
    }
    if let Some(telemetry_host) = args.telemetry_host {
        settings.telemetry_host = telemetry_host;
    }
    if let Some(telemetry_token) = args.telemetry_token {
        settings.telemetry_token = telemetry_token;
    }
    if let Some(registry_url) = args.registry_url {
        settings.registry_url = registry_url;
    }
    if let Some(public_url) = args.public_url {
        settings.public_url = public_url;
    }
    if let Some(sub_path) = args.sub_path {
        settings.sub_path = sub_path;
    }
    if args.auto_access {
        settings.auto_access = true;
    }
    if let Some(work_dir) = args.work_dir {
        settings.work_dir = work_dir;
    }
    if let Some(engine_bin) = args.engine_bin {
        settings.engine_bin = engine_bin;
    }
    if let Some(tunnel_bin) = args.tunnel_bin {
        settings.tunnel_bin = tunnel_bin;
    }
    if let Some(agent_bin) = args.agent_bin {
        settings.agent_bin = agent_bin;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_loaded_settings() {
        let args = Args::parse_from([
            "mg-node",
            "--node-id",
            "de305d54-75b4-431b-adb2-eb6b9e546014",
            "--ingress-port",
            "9100",
            "--tunnel-domain",
            "tunnel.example.com",
        ]);

        let mut settings = Settings::default();
        let original_edge = settings.edge_host.clone();
        apply_overrides(&mut settings, args);

        assert_eq!(settings.node_id, "de305d54-75b4-431b-adb2-eb6b9e546014");
        assert_eq!(settings.ingress_port, 9100);
        assert_eq!(settings.tunnel_domain, "tunnel.example.com");
        // Untouched fields keep their loaded values
        assert_eq!(settings.edge_host, original_edge);
        assert!(!settings.auto_access);
    }
}
