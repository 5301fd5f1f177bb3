//! FreeNAS NFS Provisioner
//!
//! Kubernetes external provisioner exposing FreeNAS/TrueNAS datasets as
//! NFS-backed persistent volumes. Watches claims assigned to this
//! provisioner, drives the appliance's REST API to create datasets and
//! shares, and reverses the work when volumes are released.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use freenas_nfs_provisioner::{
    ControllerConfig, ControllerMetrics, Error, FreenasProvisioner, ProvisionController, Result,
    NAME, VERSION,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// FreeNAS NFS Provisioner - dynamic NFS volumes backed by appliance datasets
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Provisioner name (the 'provisioner' attribute of matching storage classes)
    #[arg(long, env = "PROVISIONER_NAME", default_value = "freenas.org/nfs")]
    provisioner_name: String,

    /// Provisioner identifier (e.g. if unsure set it to the current node name)
    #[arg(short, long, env = "IDENTIFIER", default_value = "freenas-nfs-provisioner")]
    identifier: String,

    /// Admin server bind address (healthz, readyz, metrics)
    #[arg(long, env = "ADMIN_ADDR", default_value = "0.0.0.0:8080")]
    admin_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting {} {}", NAME, VERSION);
    info!("  Provisioner name: {}", args.provisioner_name);
    info!("  Identifier: {}", args.identifier);
    info!("  Admin server: {}", args.admin_addr);

    let client = kube::Client::try_default().await?;
    let metrics = ControllerMetrics::register()?;

    let provisioner =
        Arc::new(FreenasProvisioner::new(&args.identifier).with_kube(client.clone()));

    let admin_addr = args.admin_addr.clone();
    tokio::spawn(async move {
        if let Err(err) = run_admin_server(&admin_addr).await {
            error!("Admin server error: {}", err);
        }
    });

    let controller = ProvisionController::new(
        client,
        provisioner,
        ControllerConfig {
            provisioner_name: args.provisioner_name,
        },
        metrics,
    );
    controller.run().await?;

    info!("Provisioner shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse().unwrap())
        .add_directive("kube=info".parse().unwrap())
        .add_directive("tower=warn".parse().unwrap());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Admin Server
// =============================================================================

/// Serve liveness, readiness, and metrics on one listener.
async fn run_admin_server(addr: &str) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};
    use prometheus::{Encoder, TextEncoder};

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, std::convert::Infallible>(service_fn(|req: Request<Body>| async move {
            let response = match req.uri().path() {
                "/healthz" | "/livez" | "/readyz" => Response::builder()
                    .status(StatusCode::OK)
                    .body(Body::from("ok"))
                    .unwrap(),
                "/metrics" => {
                    let encoder = TextEncoder::new();
                    let metric_families = prometheus::gather();
                    let mut buffer = Vec::new();
                    encoder.encode(&metric_families, &mut buffer).unwrap();

                    Response::builder()
                        .status(StatusCode::OK)
                        .header("Content-Type", encoder.format_type())
                        .body(Body::from(buffer))
                        .unwrap()
                }
                _ => Response::builder()
                    .status(StatusCode::NOT_FOUND)
                    .body(Body::from("not found"))
                    .unwrap(),
            };
            Ok::<_, std::convert::Infallible>(response)
        }))
    });

    let addr: SocketAddr = addr
        .parse()
        .map_err(|err| Error::Internal(format!("Invalid admin server address: {}", err)))?;

    info!("Admin server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|err| Error::Internal(format!("Admin server error: {}", err)))?;

    Ok(())
}
