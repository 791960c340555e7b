use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use clap::{Args, Parser, Subcommand, ValueEnum};
use rustls::crypto::{ring, CryptoProvider};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gesture_exam::auth::{hash_password, ExamRoster};
use gesture_exam::config::{AccountConfig, AppConfig, ConfigStore};
use gesture_exam::connection::SessionRegistry;
use gesture_exam::events::{EventBus, SystemEvent};
use gesture_exam::exam::FileQuizLoader;
use gesture_exam::state::AppState;
use gesture_exam::vision::{HandDetector, HttpHandDetector, NoHandsDetector};
use gesture_exam::web;

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// gesture-exam command line arguments
#[derive(Parser, Debug)]
#[command(name = "gesture-exam")]
#[command(version, about = "Gesture-driven remote exam server over WebRTC", long_about = None)]
struct CliArgs {
    /// Listen address (overrides stored config)
    #[arg(short = 'a', long, value_name = "ADDRESS")]
    address: Option<String>,

    /// HTTP port (overrides stored config)
    #[arg(short = 'p', long, value_name = "PORT")]
    http_port: Option<u16>,

    /// HTTPS port (overrides stored config)
    #[arg(long, value_name = "PORT")]
    https_port: Option<u16>,

    /// Enable HTTPS (overrides stored config)
    #[arg(long)]
    enable_https: bool,

    /// Path to SSL certificate file (generates self-signed if not provided)
    #[arg(long, value_name = "FILE", requires = "ssl_key")]
    ssl_cert: Option<PathBuf>,

    /// Path to SSL private key file
    #[arg(long, value_name = "FILE", requires = "ssl_cert")]
    ssl_key: Option<PathBuf>,

    /// Data directory path (default: /etc/gesture-exam)
    #[arg(short = 'd', long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add or replace an exam-taker account
    AddAccount(AddAccountArgs),
}

#[derive(Args, Debug)]
struct AddAccountArgs {
    #[arg(long)]
    username: String,

    #[arg(long)]
    password: String,

    /// Quiz assigned to the account
    #[arg(long)]
    quiz: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    init_logging(args.log_level, args.verbose);

    // Install default crypto provider (required by rustls 0.23+)
    if CryptoProvider::install_default(ring::default_provider()).is_err() {
        tracing::warn!("rustls crypto provider already installed");
    }

    // CLI arg takes precedence
    let data_dir = args.data_dir.clone().unwrap_or_else(get_data_dir);
    tokio::fs::create_dir_all(&data_dir).await?;

    let config_store = ConfigStore::new(&data_dir.join("config.json")).await?;

    if let Some(Command::AddAccount(account)) = args.command {
        return add_account(&config_store, account).await;
    }

    tracing::info!("Starting gesture-exam v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Data directory: {}", data_dir.display());

    let mut config = (*config_store.get()).clone();

    // Apply CLI argument overrides (only if explicitly specified)
    if let Some(addr) = args.address {
        config.web.bind_address = addr;
    }
    if let Some(port) = args.http_port {
        config.web.http_port = port;
    }
    if let Some(port) = args.https_port {
        config.web.https_port = port;
    }
    if args.enable_https {
        config.web.https_enabled = true;
    }
    if let Some(cert_path) = args.ssl_cert {
        config.web.ssl_cert_path = Some(cert_path.to_string_lossy().to_string());
    }
    if let Some(key_path) = args.ssl_key {
        config.web.ssl_key_path = Some(key_path.to_string_lossy().to_string());
    }

    let bind_ip: IpAddr = config
        .web
        .bind_address
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid bind address: {}", config.web.bind_address))?;
    let (scheme, bind_port) = if config.web.https_enabled {
        ("https", config.web.https_port)
    } else {
        ("http", config.web.http_port)
    };
    let addr = SocketAddr::new(bind_ip, bind_port);
    tracing::info!("Server will listen on: {}://{}", scheme, addr);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let events = Arc::new(EventBus::new());
    tracing::info!("Event bus initialized");

    let registry = Arc::new(SessionRegistry::new(config.web.max_sessions));

    let roster = Arc::new(ExamRoster::new(&config.accounts));
    tracing::info!("Exam roster loaded: {} accounts", roster.len());

    let quiz_dir = resolve_quiz_dir(&data_dir, &config.exam.quiz_dir);
    if let Err(e) = tokio::fs::create_dir_all(&quiz_dir).await {
        tracing::warn!("Failed to create quiz directory: {}", e);
    }
    tracing::info!("Quiz directory: {}", quiz_dir.display());
    let quiz_loader = Arc::new(FileQuizLoader::new(quiz_dir, config.exam.include_images));

    let detector = create_detector(&config)?;
    tracing::info!("Hand detector: {}", detector.name());

    let state = AppState::new(
        config_store.clone(),
        events.clone(),
        registry,
        roster,
        quiz_loader,
        detector,
        shutdown_tx.clone(),
    );

    spawn_exam_audit(events);

    let app = web::create_router(state.clone());

    // Setup graceful shutdown
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for CTRL+C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    };

    if config.web.https_enabled {
        let tls_config = load_tls_config(&config, &data_dir).await?;
        tracing::info!("Starting HTTPS server on {}", addr);
        let server = axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service());

        tokio::select! {
            _ = shutdown_signal => {}
            result = server => {
                if let Err(e) = result {
                    tracing::error!("HTTPS server error: {}", e);
                }
            }
        }
    } else {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Starting HTTP server on {}", listener.local_addr()?);
        let server = axum::serve(listener, app);

        tokio::select! {
            _ = shutdown_signal => {}
            result = async move { server.await } => {
                if let Err(e) = result {
                    tracing::error!("HTTP server error: {}", e);
                }
            }
        }
    }

    cleanup(&state).await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initialize logging with tracing
fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "gesture_exam=error,tower_http=error",
        LogLevel::Warn => "gesture_exam=warn,tower_http=warn",
        LogLevel::Info => "gesture_exam=info,tower_http=info",
        LogLevel::Verbose => "gesture_exam=debug,tower_http=info",
        LogLevel::Debug => "gesture_exam=debug,tower_http=debug",
        LogLevel::Trace => "gesture_exam=trace,tower_http=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}

/// Get the application data directory
fn get_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var("GESTURE_EXAM_DATA_DIR") {
        return PathBuf::from(path);
    }

    PathBuf::from("/etc/gesture-exam")
}

/// Relative quiz directories live under the data directory
fn resolve_quiz_dir(data_dir: &Path, quiz_dir: &str) -> PathBuf {
    let path = PathBuf::from(quiz_dir.trim());
    if quiz_dir.trim().is_empty() {
        data_dir.join("quiz")
    } else if path.is_absolute() {
        path
    } else {
        data_dir.join(path)
    }
}

fn create_detector(config: &AppConfig) -> anyhow::Result<Arc<dyn HandDetector>> {
    match config.detector.url.as_deref().filter(|u| !u.trim().is_empty()) {
        Some(url) => {
            let timeout = Duration::from_millis(config.detector.timeout_ms);
            Ok(Arc::new(HttpHandDetector::new(url, timeout)?))
        }
        None => {
            tracing::warn!("No hand detector configured, exams will see no hands");
            Ok(Arc::new(NoHandsDetector))
        }
    }
}

async fn add_account(store: &ConfigStore, args: AddAccountArgs) -> anyhow::Result<()> {
    let password_hash = hash_password(&args.password)?;
    let account = AccountConfig {
        username: args.username.clone(),
        password_hash,
        quiz: args.quiz,
    };

    store
        .update(move |cfg| {
            cfg.accounts.retain(|a| a.username != account.username);
            cfg.accounts.push(account);
        })
        .await?;

    println!("Account '{}' saved to {}", args.username, store.path().display());
    Ok(())
}

async fn load_tls_config(config: &AppConfig, data_dir: &Path) -> anyhow::Result<RustlsConfig> {
    if let (Some(cert_path), Some(key_path)) =
        (&config.web.ssl_cert_path, &config.web.ssl_key_path)
    {
        return Ok(RustlsConfig::from_pem_file(cert_path, key_path).await?);
    }

    let cert_dir = data_dir.join("certs");
    let cert_path = cert_dir.join("server.crt");
    let key_path = cert_dir.join("server.key");

    // Only generate if missing
    if !cert_path.exists() || !key_path.exists() {
        tracing::info!("Generating new self-signed TLS certificate");
        let cert = generate_self_signed_cert()?;
        tokio::fs::create_dir_all(&cert_dir).await?;
        tokio::fs::write(&cert_path, cert.cert.pem()).await?;
        tokio::fs::write(&key_path, cert.key_pair.serialize_pem()).await?;
    } else {
        tracing::info!("Using existing TLS certificate from {}", cert_dir.display());
    }

    Ok(RustlsConfig::from_pem_file(&cert_path, &key_path).await?)
}

fn generate_self_signed_cert() -> anyhow::Result<rcgen::CertifiedKey> {
    let subject_alt_names = vec![
        "localhost".to_string(),
        "127.0.0.1".to_string(),
        "::1".to_string(),
    ];

    Ok(rcgen::generate_simple_self_signed(subject_alt_names)?)
}

/// Log every finished exam with its score
fn spawn_exam_audit(events: Arc<EventBus>) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(SystemEvent::ExamFinished {
                    session_id,
                    quiz,
                    score,
                    hands_unseen_secs,
                }) => {
                    tracing::info!(
                        session_id = %session_id,
                        quiz = %quiz,
                        score,
                        hands_unseen_secs,
                        "Exam finished"
                    );
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Exam audit lagged by {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Close what is still open on shutdown
async fn cleanup(state: &Arc<AppState>) {
    let open = state.registry.len();
    if open > 0 {
        tracing::info!("Waiting for {} exam sessions to close", open);
        // Connection loops close their peers on the shutdown broadcast
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while !state.registry.is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
    if !state.registry.is_empty() {
        tracing::warn!("{} exam sessions still open at exit", state.registry.len());
    }
}
