use std::fs::OpenOptions;
use std::io::BufWriter;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gossamer::audit::{AuditSink, JsonLinesAuditLog, TracingAuditLog};
use gossamer::cli;
use gossamer::node::{MembershipNode, NodeRunner};
use gossamer::settings::{RunMode, Settings};
use gossamer::simulation::Simulation;
use gossamer::transport::{Transport, UdpTransport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse args and env vars
    let settings = cli::Cli::parse().into_settings();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "gossamer=info".into());
    if settings.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    settings.validate()?;
    let audit = audit_sink(&settings)?;

    match settings.run_mode {
        RunMode::Node => run_node(settings, audit).await,
        RunMode::Simulate => {
            let simulation =
                Simulation::new(settings.simulation.clone(), settings.protocol.clone(), audit)?;
            let report = simulation.run();
            println!("{}", report.to_json()?);
            Ok(())
        }
    }
}

fn audit_sink(settings: &Settings) -> anyhow::Result<Arc<dyn AuditSink>> {
    match &settings.audit_log {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            info!("Writing membership audit log to {}", path.display());
            Ok(Arc::new(JsonLinesAuditLog::new(BufWriter::new(file))))
        }
        None => Ok(Arc::new(TracingAuditLog)),
    }
}

async fn run_node(settings: Settings, audit: Arc<dyn AuditSink>) -> anyhow::Result<()> {
    let udp = UdpTransport::bind(settings.listen_socket_addr()).await?;
    let node_id = udp.local_id();
    let transport: Arc<dyn Transport> = Arc::new(udp);

    let mut node = MembershipNode::new(node_id, settings.protocol.clone(), transport, audit)?;
    info!(
        "Starting gossamer {} on {} (introducer {})",
        gossamer::settings::APP_VERSION,
        node_id,
        settings.introducer_id()
    );
    node.start(settings.introducer_id())?;

    let runner = NodeRunner::new(node, settings.tick_interval());
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    };

    match runner.run(shutdown).await {
        Ok(node) => {
            info!(
                "[{}] Stopped after {} ticks: {:?}",
                node.id(),
                node.now(),
                node.stats()
            );
            Ok(())
        }
        Err(e) => {
            error!("[{}] {}", node_id, e);
            Err(e.into())
        }
    }
}
