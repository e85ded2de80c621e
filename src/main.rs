//! Signed Vitals CLI
//!
//! Runs the producing endpoint or the verification gateway, and offers a few
//! offline tools for signing, verifying and key provisioning.

use clap::{Parser, Subcommand};
use signed_vitals::{
    config::Config,
    core::{generate_key_hex, write_key_file, AuthenticatedMessage, Reading, SharedKey},
    gateway::{Gateway, Verdict},
    VERSION,
};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "signed-vitals")]
#[command(version = VERSION)]
#[command(about = "Source-authenticated vital-sign telemetry", long_about = None)]
struct Cli {
    /// Shared key file (overrides the configured key_path)
    #[arg(long, global = true)]
    key: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the producing endpoint against the simulated sensor
    Produce {
        /// Gateway endpoint (overrides config)
        #[arg(long)]
        endpoint: Option<String>,

        /// Publish interval in seconds (overrides config)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Run the verification gateway
    Gateway {
        /// Port to listen on (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Sign one reading and print the wire message
    Sign {
        /// Temperature in degrees Celsius
        #[arg(long, allow_hyphen_values = true)]
        temp: f64,

        /// Instantaneous beat rate
        #[arg(long)]
        bpm: f64,

        /// Windowed average beat rate
        #[arg(long)]
        avg: u32,
    },

    /// Verify one wire message from a file or stdin
    Verify {
        /// File holding the message (stdin when omitted)
        file: Option<PathBuf>,
    },

    /// Show pipeline status and cumulative statistics
    Status,

    /// Show configuration
    Config {
        /// Write the default configuration if no file exists
        #[arg(long)]
        init: bool,
    },

    /// Generate a new shared key
    Keygen {
        /// Write the key here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Overwrite an existing key file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let key_path = cli.key;

    match cli.command {
        Commands::Produce { endpoint, interval } => {
            cmd_produce(key_path, endpoint, interval);
        }
        Commands::Gateway { port } => {
            cmd_gateway(key_path, port);
        }
        Commands::Sign { temp, bpm, avg } => {
            cmd_sign(key_path, temp, bpm, avg);
        }
        Commands::Verify { file } => {
            cmd_verify(key_path, file);
        }
        Commands::Status => {
            cmd_status(key_path);
        }
        Commands::Config { init } => {
            cmd_config(init);
        }
        Commands::Keygen { output, force } => {
            cmd_keygen(output, force);
        }
    }
}

fn load_config() -> Config {
    match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config from {:?}: {e}", Config::config_path());
            std::process::exit(1);
        }
    }
}

/// Resolve the shared key: environment, then `--key`, then the config file.
fn load_key(cli_path: Option<&Path>, config: &Config) -> SharedKey {
    let path = cli_path.or(config.key_path.as_deref());
    match SharedKey::resolve(path) {
        Ok(key) => key,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!();
            eprintln!("Provide a key with one of:");
            eprintln!("  --key <FILE>");
            eprintln!("  SIGNED_VITALS_KEY=<hex>");
            eprintln!("  \"key_path\" in {:?}", Config::config_path());
            eprintln!();
            eprintln!("Generate one with `signed-vitals keygen --output <FILE>`.");
            std::process::exit(1);
        }
    }
}

#[cfg(feature = "publisher")]
fn cmd_produce(key_path: Option<PathBuf>, endpoint: Option<String>, interval: Option<u64>) {
    use signed_vitals::{
        producer::{Producer, PublishOutcome},
        sensor::{SensorConfig, SimulatedSensor},
        stats::create_shared_stats_with_persistence,
        transport::{http::DEFAULT_TIMEOUT, HttpTransport, TransportManager},
    };

    let mut config = load_config();
    if let Some(endpoint) = endpoint {
        config.endpoint = endpoint;
    }
    if let Some(secs) = interval {
        config.publish_interval = Duration::from_secs(secs.max(1));
    }
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let key = load_key(key_path.as_deref(), &config);

    let transport = match HttpTransport::new(config.endpoint.clone(), DEFAULT_TIMEOUT) {
        Ok(transport) => transport,
        Err(e) => {
            eprintln!("Error creating transport: {e}");
            std::process::exit(1);
        }
    };

    println!("Signed Vitals v{VERSION}");
    println!();
    println!("Producing readings...");
    println!("  Endpoint: {}", config.endpoint);
    println!("  Topic: {}", config.topic);
    println!("  Publish interval: {}s", config.publish_interval.as_secs());
    println!("  Window size: {}", config.window_size);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let stats = create_shared_stats_with_persistence(config.stats_path());
    let manager = TransportManager::new(transport, config.backoff());
    let mut producer =
        Producer::new(key, config.producer(), config.window(), manager).with_stats(stats.clone());

    let mut sensor = SimulatedSensor::new(SensorConfig::default());
    if let Err(e) = sensor.start() {
        eprintln!("Error starting sensor: {e}");
        std::process::exit(1);
    }

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    let receiver = sensor.receiver().clone();
    let mut last_save = Instant::now();

    while running.load(Ordering::SeqCst) {
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(sample) => {
                producer.ingest(&sample);
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                eprintln!("Sensor disconnected unexpectedly");
                break;
            }
        }

        match producer.poll() {
            Some(PublishOutcome::Published(reading)) => {
                println!(
                    "[{}] Published tempC={} bpm={} avg_bpm={}",
                    chrono::Local::now().format("%H:%M:%S"),
                    reading.temp_c(),
                    reading.bpm(),
                    reading.avg_bpm()
                );
            }
            Some(PublishOutcome::Dropped { error, .. }) => {
                println!(
                    "[{}] Dropped reading ({}, link {})",
                    chrono::Local::now().format("%H:%M:%S"),
                    error,
                    producer.manager().state()
                );
            }
            Some(PublishOutcome::NotReady) | None => {}
        }

        if last_save.elapsed() >= Duration::from_secs(10) {
            if let Err(e) = stats.save() {
                tracing::warn!("Could not save statistics: {e}");
            }
            last_save = Instant::now();
        }
    }

    println!();
    println!("Stopping producer...");
    sensor.stop();

    if let Err(e) = stats.save() {
        eprintln!("Warning: Could not save statistics: {e}");
    }

    println!();
    println!("{}", stats.summary());
}

#[cfg(not(feature = "publisher"))]
fn cmd_produce(_key_path: Option<PathBuf>, _endpoint: Option<String>, _interval: Option<u64>) {
    eprintln!("Error: producing requires the publisher feature");
    std::process::exit(1);
}

#[cfg(feature = "server")]
fn cmd_gateway(key_path: Option<PathBuf>, port: Option<u16>) {
    use signed_vitals::{
        gateway::{JsonlStore, RejectLog, Router},
        server::{run, ServerConfig},
        stats::create_shared_stats_with_persistence,
    };

    let mut config = load_config();
    if let Some(port) = port {
        config.listen_port = port;
    }
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let key = load_key(key_path.as_deref(), &config);
    let stats = create_shared_stats_with_persistence(config.stats_path());

    let router = Router::new(
        Gateway::new(Arc::new(key)),
        Arc::new(JsonlStore::new(config.accepted_path())),
        Arc::new(RejectLog::new(config.rejected_path())),
    )
    .with_stats(stats.clone());

    let server_config = ServerConfig::new(config.listen_port, config.topic.clone(), router)
        .with_stats(stats.clone());

    println!("Signed Vitals v{VERSION}");
    println!();
    println!("Verification gateway");
    println!("  Topic: {}", config.topic);
    println!("  Accepted readings: {:?}", config.accepted_path());
    println!("  Reject log: {:?}", config.rejected_path());
    println!();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error creating runtime: {e}");
            std::process::exit(1);
        }
    };

    let result: anyhow::Result<()> = runtime.block_on(async move {
        let (addr, shutdown_tx) = run(server_config).await?;
        println!("Listening on http://{addr}");
        println!("Press Ctrl+C to stop");

        tokio::signal::ctrl_c().await?;
        let _ = shutdown_tx.send(());
        Ok(())
    });

    if let Err(e) = result {
        eprintln!("Gateway error: {e}");
    }

    if let Err(e) = stats.save() {
        eprintln!("Warning: Could not save statistics: {e}");
    }

    println!();
    println!("{}", stats.summary());
}

#[cfg(not(feature = "server"))]
fn cmd_gateway(_key_path: Option<PathBuf>, _port: Option<u16>) {
    eprintln!("Error: the gateway requires the server feature");
    std::process::exit(1);
}

fn cmd_sign(key_path: Option<PathBuf>, temp: f64, bpm: f64, avg: u32) {
    let config = load_config();
    let key = load_key(key_path.as_deref(), &config);

    let reading = match Reading::new(temp, bpm, avg) {
        Ok(reading) => reading,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let message = AuthenticatedMessage::sign(&key, reading);
    println!("{}", String::from_utf8_lossy(&message.to_wire()));
}

fn cmd_verify(key_path: Option<PathBuf>, file: Option<PathBuf>) {
    let config = load_config();
    let key = load_key(key_path.as_deref(), &config);

    let inbound = match file {
        Some(path) => std::fs::read(&path).map_err(|e| format!("{path:?}: {e}")),
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .map(|_| buf)
                .map_err(|e| format!("stdin: {e}"))
        }
    };
    let inbound = match inbound {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading message: {e}");
            std::process::exit(1);
        }
    };

    match Gateway::new(Arc::new(key)).handle(&inbound) {
        Verdict::Accepted(reading) => {
            println!(
                "accepted: tempC={} bpm={} avg_bpm={}",
                reading.temp_c(),
                reading.bpm(),
                reading.avg_bpm()
            );
        }
        Verdict::Rejected(rejection) => {
            println!("rejected ({}): {}", rejection.reason, rejection.detail);
            std::process::exit(1);
        }
    }
}

fn cmd_status(key_path: Option<PathBuf>) {
    let config = load_config();

    println!("Signed Vitals Status");
    println!("====================");
    println!();

    let key_source = key_path.as_deref().or(config.key_path.as_deref());
    println!(
        "Shared key: {}",
        match SharedKey::resolve(key_source) {
            Ok(_) => "configured ✓".to_string(),
            Err(e) => format!("not usable ✗ ({e})"),
        }
    );
    println!();

    println!("Configuration:");
    println!("  Endpoint: {}", config.endpoint);
    println!("  Listen port: {}", config.listen_port);
    println!("  Topic: {}", config.topic);
    println!("  Publish interval: {}s", config.publish_interval.as_secs());
    println!(
        "  Reconnect backoff: {}ms..{}ms",
        config.reconnect_initial_ms, config.reconnect_max_ms
    );
    println!();

    let stats_path = config.stats_path();
    if stats_path.exists() {
        if let Ok(content) = std::fs::read_to_string(&stats_path) {
            if let Ok(stats) = serde_json::from_str::<serde_json::Value>(&content) {
                println!("Cumulative Statistics:");
                for (field, label) in [
                    ("samples_accepted", "Samples accepted"),
                    ("samples_discarded", "Samples discarded"),
                    ("readings_published", "Readings published"),
                    ("publish_failures", "Publish failures"),
                    ("reconnect_attempts", "Reconnect attempts"),
                    ("accepted", "Gateway accepted"),
                    ("malformed", "Gateway rejected (malformed)"),
                    ("mismatched", "Gateway rejected (tag mismatch)"),
                ] {
                    if let Some(value) = stats.get(field) {
                        println!("  {label}: {value}");
                    }
                }
                if let Some(updated) = stats.get("last_updated").and_then(|v| v.as_str()) {
                    println!("  Last updated: {updated}");
                }
            }
        }
    } else {
        println!("No previous session data found.");
    }
}

fn cmd_config(init: bool) {
    let path = Config::config_path();

    if init {
        if path.exists() {
            println!("Config already exists at {path:?}");
        } else if let Err(e) = Config::default().save() {
            eprintln!("Error saving config: {e}");
            std::process::exit(1);
        } else {
            println!("Wrote default config to {path:?}");
        }
        println!();
    }

    let config = load_config();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {path:?}");
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

fn cmd_keygen(output: Option<PathBuf>, force: bool) {
    let key_hex = generate_key_hex();

    match output {
        Some(path) => {
            if path.exists() && !force {
                eprintln!("Error: {path:?} already exists (use --force to overwrite)");
                std::process::exit(1);
            }
            if let Err(e) = write_key_file(&path, &key_hex) {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
            println!("Wrote shared key to {path:?}");
            println!("Copy it to both the producer and the gateway.");
        }
        None => println!("{key_hex}"),
    }
}

/// Set up Ctrl+C handler.
#[cfg(feature = "publisher")]
fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: Could not set Ctrl+C handler: {e}");
    }
}
