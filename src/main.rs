//! Kiosk Camera CLI
//!
//! Runs the capture engine headless, printing status events and frame
//! throughput. Useful for soak-testing a camera on the target device.

use chrono::Local;
use clap::Parser;
use kiosk_camera::{
    capture::{CaptureBackend, FileConfig, MockBackend},
    engine::{remediation, CaptureEngine, EngineEvent, RunState, Severity},
    metrics::MetricsSnapshot,
    network::{NetworkMonitor, NetworkStatus},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

#[derive(Debug, Parser)]
#[command(name = "kiosk-camera", version, about = "Self-healing kiosk camera feed")]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the synthetic mock camera instead of real hardware.
    #[arg(long)]
    mock: bool,

    /// Override the camera device index.
    #[arg(short, long)]
    device: Option<u32>,

    /// Stop after this many seconds (runs until Ctrl-C otherwise).
    #[arg(long)]
    duration: Option<u64>,

    /// Disable network reachability probing.
    #[arg(long)]
    no_network: bool,

    /// Override the metrics server port (0 disables it).
    #[arg(long)]
    metrics_port: Option<u16>,
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!("Kiosk Camera v{}", kiosk_camera::VERSION);

    let mut config = match &args.config {
        Some(path) => match FileConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => FileConfig::default(),
    };
    if let Some(device) = args.device {
        config.capture.device_index = device;
    }
    if let Some(port) = args.metrics_port {
        config.metrics.port = port;
    }
    if args.no_network {
        config.network.enabled = false;
    }

    let backend = select_backend(args.mock);
    let (event_tx, mut events) = mpsc::unbounded_channel::<EngineEvent>();
    let (frame_tx, mut frames) = mpsc::channel(2);

    let engine = Arc::new(
        CaptureEngine::builder(backend)
            .capture_config(config.capture.clone())
            .recovery_config(config.recovery.clone())
            .frame_sink(frame_tx)
            .event_sink(event_tx)
            .boxed_remediation(remediation::from_config(&config.remediation))
            .build(),
    );

    // Stand-in for the display: count frames and report throughput.
    let display = tokio::spawn(async move {
        let mut count: u64 = 0;
        while let Some(frame) = frames.recv().await {
            count += 1;
            if count % 300 == 0 {
                info!(
                    frames = count,
                    width = frame.width(),
                    height = frame.height(),
                    "Display received frames"
                );
            }
        }
        count
    });

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(true);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    let (net_tx, mut net_rx) = mpsc::unbounded_channel::<NetworkStatus>();
    let mut network = config
        .network
        .enabled
        .then(|| NetworkMonitor::from_config(&config.network, net_tx));

    #[cfg(feature = "metrics")]
    let metrics_state = spawn_metrics_server(config.metrics.port, shutdown_rx.clone());

    engine.start().await;

    let deadline = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut state_rx = engine.subscribe_state();
    let mut metrics_tick = tokio::time::interval(Duration::from_secs(5));
    let mut network_up = true;
    let mut exit_code = 0;

    loop {
        tokio::select! {
            Ok(()) = shutdown_rx.changed() => {
                info!("Shutdown requested");
                break;
            }
            _ = &mut deadline => {
                info!("Run duration elapsed");
                break;
            }
            Some(event) = events.recv() => print_event(&event),
            Some(status) = net_rx.recv() => {
                network_up = status.available;
                println!("[{}] network: {}", Local::now().format("%H:%M:%S"), status.message);
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *state_rx.borrow_and_update();
                if state == RunState::Halted {
                    // Flush the terminal event before leaving.
                    while let Ok(event) = events.try_recv() {
                        print_event(&event);
                    }
                    eprintln!("Camera halted; restart required.");
                    exit_code = 2;
                    break;
                }
            }
            _ = metrics_tick.tick() => {
                let snapshot = MetricsSnapshot::from_engine(
                    engine.run_state(),
                    engine.counters().await,
                    engine.stats(),
                )
                .with_network(network_up);
                debug!(?snapshot, "Engine status");
                #[cfg(feature = "metrics")]
                if let Some(state) = &metrics_state {
                    state.write().await.update(&snapshot);
                }
            }
        }
    }

    engine.stop().await;
    if let Some(monitor) = network.as_mut() {
        monitor.stop().await;
    }

    let stats = engine.stats();
    drop(engine);
    let displayed = display.await.unwrap_or_default();
    info!(
        frames = stats.frames_emitted,
        displayed,
        soft_faults = stats.soft_faults,
        recoveries = stats.recoveries,
        "Done"
    );
    std::process::exit(exit_code);
}

fn select_backend(mock: bool) -> Arc<dyn CaptureBackend> {
    #[cfg(feature = "camera")]
    if !mock {
        return Arc::new(kiosk_camera::capture::WebcamBackend::new());
    }
    if !mock {
        warn!("Built without the `camera` feature, using the mock camera");
    }
    Arc::new(MockBackend::new())
}

fn print_event(event: &EngineEvent) {
    let stamp = Local::now().format("%H:%M:%S");
    match event.severity() {
        Severity::Status => println!("[{}] camera: {}", stamp, event),
        Severity::Alert => println!("[{}] camera ALERT: {}", stamp, event),
        Severity::Terminal => eprintln!("[{}] camera FAILED: {}", stamp, event),
    }
}

#[cfg(feature = "metrics")]
fn spawn_metrics_server(
    port: u16,
    mut shutdown: watch::Receiver<bool>,
) -> Option<kiosk_camera::metrics::SharedExporter> {
    use kiosk_camera::metrics::{MetricsRegistry, MetricsServer};

    if port == 0 {
        return None;
    }
    let registry = match MetricsRegistry::new() {
        Ok(registry) => registry,
        Err(e) => {
            warn!(error = %e, "Metrics server disabled");
            return None;
        }
    };
    let server = MetricsServer::on_port(port, registry);
    let state = server.state();
    tokio::spawn(async move {
        let shutdown = async move {
            if shutdown.changed().await.is_err() {
                // No Ctrl-C handler: serve until the process exits.
                std::future::pending::<()>().await;
            }
        };
        if let Err(e) = server.run(shutdown).await {
            warn!(error = %e, "Metrics server stopped");
        }
    });
    Some(state)
}
