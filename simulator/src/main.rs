mod fleet;

use axum::{extract::{Path, State}, routing::get, Json, Router};
use clap::Parser;
use fleet::{topology, Drone, Reporting};
use rand::Rng;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Stand-in for the fleet topology API, for running the gateway locally
#[derive(Debug, Parser)]
#[command(name = "simulator")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "SIM_ADDR", default_value = "127.0.0.1:8090")]
    addr: String,

    /// Number of simulated devices
    #[arg(long, env = "DEVICES", default_value_t = 20)]
    devices: usize,

    /// Share of devices reporting only an offline position
    #[arg(long, env = "OFFLINE_RATIO", default_value_t = 0.2)]
    offline_ratio: f64,

    /// Share of live devices reporting through a nested module
    #[arg(long, env = "NESTED_RATIO", default_value_t = 0.3)]
    nested_ratio: f64,

    /// Share of nodes emitted without a serial number
    #[arg(long, env = "DROP_SN_RATIO", default_value_t = 0.05)]
    drop_sn_ratio: f64,
}

type Fleet = Arc<Mutex<Vec<Drone>>>;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    info!("Starting fleet API simulator");
    info!(
        "Devices: {}, offline: {:.0}%, nested: {:.0}%, missing serial: {:.0}%",
        args.devices,
        args.offline_ratio * 100.0,
        args.nested_ratio * 100.0,
        args.drop_sn_ratio * 100.0
    );

    let fleet: Fleet = Arc::new(Mutex::new(build_fleet(&args)));

    let app = Router::new()
        .route(
            "/manage/api/v1.0/projects/:project/topologies",
            get(get_topologies),
        )
        .with_state(fleet);

    let listener = match tokio::net::TcpListener::bind(&args.addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", args.addr, e);
            std::process::exit(1);
        }
    };

    info!("Simulator listening on {}", args.addr);
    info!("Point the gateway at it with DJI_BASE_URL=http://{}", args.addr);

    if let Err(e) = axum::serve(listener, app).await {
        error!("Simulator server error: {}", e);
    }
}

fn build_fleet(args: &Args) -> Vec<Drone> {
    let mut rng = rand::thread_rng();
    (0..args.devices)
        .map(|i| {
            let reporting = if rng.gen_bool(args.offline_ratio.clamp(0.0, 1.0)) {
                Reporting::Offline
            } else if rng.gen_bool(args.nested_ratio.clamp(0.0, 1.0)) {
                Reporting::Nested
            } else {
                Reporting::Direct
            };
            let with_sn = !rng.gen_bool(args.drop_sn_ratio.clamp(0.0, 1.0));
            Drone::random(i, reporting, with_sn)
        })
        .collect()
}

async fn get_topologies(State(fleet): State<Fleet>, Path(project): Path<String>) -> Json<Value> {
    let mut fleet = fleet.lock().await;
    for drone in fleet.iter_mut() {
        drone.drift();
    }
    debug!("Serving {} nodes for project {}", fleet.len(), project);
    Json(topology(&fleet))
}
