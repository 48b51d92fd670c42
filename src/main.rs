use door_alarm::config::{self, Config};
use door_alarm::error::Result;
use door_alarm::instance_lock::InstanceLock;
use door_alarm::monitor::{Monitor, spawn_engines};
use door_alarm::notify;
use door_alarm::sensor::SensorReader;
use door_alarm::socket;
use log::{error, info};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

#[tokio::main]
async fn main() {
    // Load .env file before anything else
    config::load_dotenv();
    init_logger();
    info!("Starting door alarm");

    if let Err(e) = run().await {
        error!("Door alarm failed: {}", e);
        std::process::exit(1);
    }

    info!("Door alarm stopped");
}

async fn run() -> Result<()> {
    let config = Config::from_env();
    info!("Configuration loaded:");
    info!("  Profile: {}", config.profile);
    info!("  GPIO pin: {}", config.sensor.pin);
    info!("  Status interval: {}s", config.monitor.status_interval_secs);
    info!("  Max open time: {}s", config.monitor.max_open_secs);
    info!("  State file: {:?}", config.monitor.state_file);

    let _lock = InstanceLock::acquire_for(&config.monitor.state_file)?;

    let sensor = SensorReader::open(&config.sensor);
    let notifier = notify::from_config(&config.twilio);
    let monitor = Arc::new(Monitor::new(&config.monitor, sensor, notifier));

    let listener = TcpListener::bind(&config.socket.listen_addr).await?;

    let shutdown = CancellationToken::new();
    let mut tasks = spawn_engines(
        monitor.clone(),
        config.monitor.status_interval(),
        shutdown.clone(),
    );
    tasks.push(tokio::spawn(socket::serve(
        listener,
        monitor.clone(),
        shutdown.clone(),
    )));

    info!("Door alarm is running");
    info!("  - Press Ctrl+C to exit");

    wait_for_shutdown_signal().await;
    info!("Received shutdown signal");

    shutdown.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            error!("Task failed during shutdown: {}", e);
        }
    }

    monitor.shutdown();
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
