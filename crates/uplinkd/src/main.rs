// # uplinkd - Uplink Arbitration Daemon
//
// This is a THIN integration layer only. All arbitration logic lives in
// uplink-core; this binary wires real drivers to the arbiter and polls it.
//
// The uplinkd daemon is responsible for:
// 1. Reading configuration from environment variables (and an optional JSON file)
// 2. Initializing logging and the runtime
// 3. Building the sysfs interface drivers and the TCP cloud session
// 4. Polling the arbiter until SIGTERM/SIGINT
//
// ## Configuration
//
// ### Interfaces
// - `UPLINK_PRIMARY_IFACE`: Preferred wired interface (default: eth0)
// - `UPLINK_BACKUP_IFACE`: Backup interface (default: wlan0)
// - `UPLINK_LINK_CONTROL`: Run `ip link set` on connect/disconnect (default: true)
//
// ### Cloud
// - `UPLINK_CLOUD_ENDPOINT`: `host:port` of the cloud service (required)
// - `UPLINK_CLOUD_ACK_TIMEOUT_MS`: Drop the session when sent data stays
//   unacknowledged this long (default: 30000)
// - `UPLINK_CLOUD_REPLY_TIMEOUT_MS`: Require a reply to every keep-alive
//   within this time (optional, only for endpoints that answer)
//
// ### Arbiter
// - `UPLINK_CONFIG_FILE`: JSON arbiter configuration (optional)
// - `UPLINK_PRIMARY_KEEP_ALIVE_SECS`, `UPLINK_BACKUP_KEEP_ALIVE_SECS`
// - `UPLINK_RETRY_PRIMARY_PERIOD_MS`
// - `UPLINK_PRIMARY_CONNECT_TIMEOUT_MS`, `UPLINK_PRIMARY_CLOUD_CONNECT_TIMEOUT_MS`
// - `UPLINK_BACKUP_CONNECT_TIMEOUT_MS`, `UPLINK_BACKUP_CLOUD_CONNECT_TIMEOUT_MS`
// - `UPLINK_BACKUP_COLOR`: Color name, `#RRGGBB`, or `default`
// - `UPLINK_POLL_INTERVAL_MS`: Poll cadence (default: 50)
// - `UPLINK_LOG_LEVEL`: trace, debug, info, warn, error (default: info)
//
// Environment overrides take precedence over the config file.
//
// ## Example
//
// ```bash
// export UPLINK_PRIMARY_IFACE=eth0
// export UPLINK_BACKUP_IFACE=wwan0
// export UPLINK_CLOUD_ENDPOINT=device.example.com:5683
// export UPLINK_BACKUP_COLOR=yellow
//
// uplinkd
// ```

use anyhow::{Context, Result};
use std::env;
use std::process::ExitCode;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::MissedTickBehavior;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use uplink_cloud_tcp::TcpCloudSession;
use uplink_core::{
    ArbiterConfig, ArbiterEvent, LogIndicator, MonotonicClock, StatusColor, UplinkArbiter,
};
use uplink_iface_sysfs::SysfsInterface;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Longest interface name the kernel accepts (IFNAMSIZ - 1)
const MAX_IFACE_NAME_LEN: usize = 15;

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum UplinkExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<UplinkExitCode> for ExitCode {
    fn from(code: UplinkExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    primary_iface: String,
    backup_iface: String,
    link_control: bool,
    cloud_endpoint: String,
    cloud_ack_timeout_ms: u64,
    cloud_reply_timeout_ms: Option<u64>,
    poll_interval_ms: u64,
    arbiter: ArbiterConfig,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        let mut arbiter = match env::var("UPLINK_CONFIG_FILE") {
            Ok(path) => {
                let contents = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read UPLINK_CONFIG_FILE {}", path))?;
                ArbiterConfig::from_json(&contents)
                    .with_context(|| format!("Invalid arbiter configuration in {}", path))?
            }
            Err(_) => ArbiterConfig::default(),
        };

        if let Some(secs) = env_u64("UPLINK_PRIMARY_KEEP_ALIVE_SECS")? {
            arbiter = arbiter.with_primary_keep_alive(Duration::from_secs(secs));
        }
        if let Some(secs) = env_u64("UPLINK_BACKUP_KEEP_ALIVE_SECS")? {
            arbiter = arbiter.with_backup_keep_alive(Duration::from_secs(secs));
        }
        if let Some(ms) = env_u64("UPLINK_RETRY_PRIMARY_PERIOD_MS")? {
            arbiter = arbiter.with_retry_primary_period(Duration::from_millis(ms));
        }
        if let Some(ms) = env_u64("UPLINK_BACKUP_CONNECT_TIMEOUT_MS")? {
            arbiter = arbiter.with_backup_connect_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = env_u64("UPLINK_BACKUP_CLOUD_CONNECT_TIMEOUT_MS")? {
            arbiter = arbiter.with_backup_cloud_connect_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = env_u64("UPLINK_PRIMARY_CONNECT_TIMEOUT_MS")? {
            arbiter = arbiter.with_primary_connect_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = env_u64("UPLINK_PRIMARY_CLOUD_CONNECT_TIMEOUT_MS")? {
            arbiter = arbiter.with_primary_cloud_connect_timeout(Duration::from_millis(ms));
        }
        if let Ok(color) = env::var("UPLINK_BACKUP_COLOR") {
            let color: StatusColor = color.parse()?;
            arbiter = arbiter.with_backup_color(color);
        }

        Ok(Self {
            primary_iface: env::var("UPLINK_PRIMARY_IFACE").unwrap_or_else(|_| "eth0".to_string()),
            backup_iface: env::var("UPLINK_BACKUP_IFACE").unwrap_or_else(|_| "wlan0".to_string()),
            link_control: env_bool("UPLINK_LINK_CONTROL")?.unwrap_or(true),
            cloud_endpoint: env::var("UPLINK_CLOUD_ENDPOINT").unwrap_or_default(),
            cloud_ack_timeout_ms: env_u64("UPLINK_CLOUD_ACK_TIMEOUT_MS")?.unwrap_or(30_000),
            cloud_reply_timeout_ms: env_u64("UPLINK_CLOUD_REPLY_TIMEOUT_MS")?,
            poll_interval_ms: env_u64("UPLINK_POLL_INTERVAL_MS")?.unwrap_or(50),
            arbiter,
            log_level: env::var("UPLINK_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        validate_iface_name("UPLINK_PRIMARY_IFACE", &self.primary_iface)?;
        validate_iface_name("UPLINK_BACKUP_IFACE", &self.backup_iface)?;

        if self.primary_iface == self.backup_iface {
            anyhow::bail!(
                "UPLINK_PRIMARY_IFACE and UPLINK_BACKUP_IFACE must differ. Both are '{}'",
                self.primary_iface
            );
        }

        validate_endpoint(&self.cloud_endpoint)?;

        if self.cloud_ack_timeout_ms == 0 {
            anyhow::bail!("UPLINK_CLOUD_ACK_TIMEOUT_MS must be greater than 0");
        }
        if self.cloud_reply_timeout_ms == Some(0) {
            anyhow::bail!("UPLINK_CLOUD_REPLY_TIMEOUT_MS must be greater than 0");
        }

        if !(1..=1000).contains(&self.poll_interval_ms) {
            anyhow::bail!(
                "UPLINK_POLL_INTERVAL_MS must be between 1 and 1000. Got: {}",
                self.poll_interval_ms
            );
        }

        self.arbiter.validate()?;

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "UPLINK_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }
}

/// Parse an optional numeric environment variable
fn env_u64(name: &str) -> Result<Option<u64>> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{} must be a non-negative integer. Got: '{}'", name, value)),
        Err(_) => Ok(None),
    }
}

/// Parse an optional boolean environment variable
fn env_bool(name: &str) -> Result<Option<bool>> {
    match env::var(name) {
        Ok(value) => match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => anyhow::bail!("{} must be true or false. Got: '{}'", name, value),
        },
        Err(_) => Ok(None),
    }
}

/// Validate a kernel network interface name
fn validate_iface_name(var: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        anyhow::bail!("{} cannot be empty", var);
    }
    if name.len() > MAX_IFACE_NAME_LEN {
        anyhow::bail!(
            "{} is too long: {} chars (max {}). Got: '{}'",
            var,
            name.len(),
            MAX_IFACE_NAME_LEN,
            name
        );
    }
    if name.contains('/') || name.chars().any(char::is_whitespace) || name == "." || name == ".." {
        anyhow::bail!("{} contains invalid characters. Got: '{}'", var, name);
    }
    Ok(())
}

/// Validate a `host:port` endpoint
fn validate_endpoint(endpoint: &str) -> Result<()> {
    if endpoint.is_empty() {
        anyhow::bail!(
            "UPLINK_CLOUD_ENDPOINT is required. \
            Set it via: export UPLINK_CLOUD_ENDPOINT=device.example.com:5683"
        );
    }

    let (host, port) = endpoint.rsplit_once(':').with_context(|| {
        format!("UPLINK_CLOUD_ENDPOINT must be host:port. Got: '{}'", endpoint)
    })?;

    if host.is_empty() {
        anyhow::bail!("UPLINK_CLOUD_ENDPOINT has an empty host. Got: '{}'", endpoint);
    }

    match port.parse::<u16>() {
        Ok(0) | Err(_) => anyhow::bail!(
            "UPLINK_CLOUD_ENDPOINT port must be 1-65535. Got: '{}'",
            port
        ),
        Ok(_) => Ok(()),
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return UplinkExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return UplinkExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return UplinkExitCode::ConfigError.into();
    }

    info!("Starting uplinkd daemon");
    info!(
        "Primary {} / backup {} -> {}",
        config.primary_iface, config.backup_iface, config.cloud_endpoint
    );

    // A single worker: the arbiter is polled from one task and the cloud
    // session task is the only other work.
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return UplinkExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {:#}", e);
            UplinkExitCode::RuntimeError
        } else {
            UplinkExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let primary = SysfsInterface::new(&config.primary_iface).with_link_control(config.link_control);
    let backup = SysfsInterface::new(&config.backup_iface).with_link_control(config.link_control);
    if let Some(warning) = link_control_warning(&config) {
        warn!("{}", warning);
    }

    let mut cloud = TcpCloudSession::new(&config.cloud_endpoint, Handle::current())
        .with_ack_timeout(Duration::from_millis(config.cloud_ack_timeout_ms));
    if let Some(ms) = config.cloud_reply_timeout_ms {
        cloud = cloud.with_reply_timeout(Duration::from_millis(ms));
    }

    let mut arbiter = UplinkArbiter::new(
        Box::new(primary),
        Box::new(backup),
        Box::new(cloud),
        Box::new(LogIndicator::new()),
        Box::new(MonotonicClock::new()),
        config.arbiter,
    )?
    .with_interface_change_callback(|old, new| {
        info!("Uplink changed: {} -> {}", old, new);
    });

    let mut events = ReceiverStream::new(arbiter.subscribe());
    arbiter.setup();

    let mut ticker = tokio::time::interval(Duration::from_millis(config.poll_interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    info!("Daemon initialized, polling every {} ms", config.poll_interval_ms);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                arbiter.poll();
            }

            Some(event) = events.next() => {
                log_event(&event);
            }

            signal = &mut shutdown => {
                let signal = signal?;
                info!("Received shutdown signal: {}", signal);
                break;
            }
        }
    }

    let status = serde_json::to_string(&arbiter.status())?;
    info!("Final status: {}", status);
    info!("Shutting down daemon");

    Ok(())
}

/// Startup warning for a configuration where both links can stay up
///
/// Without link control the arbiter cannot take the inactive interface down,
/// so the cloud session follows the kernel's routing table rather than the
/// arbiter's choice.
fn link_control_warning(config: &Config) -> Option<String> {
    if config.link_control {
        return None;
    }
    Some(format!(
        "Link control disabled: {} and {} are not taken down when inactive. \
        The cloud session uses whichever route the kernel prefers, which may \
        not match the reported active interface",
        config.primary_iface, config.backup_iface
    ))
}

fn log_event(event: &ArbiterEvent) {
    match event {
        ArbiterEvent::Started { primary_present } => {
            info!("Arbiter started (primary present: {})", primary_present);
        }
        ArbiterEvent::StateChanged { from, to } => {
            debug!("Arbiter state {} -> {}", from, to);
        }
        ArbiterEvent::InterfaceChanged { old, new } => {
            debug!("Arbiter interface {} -> {}", old, new);
        }
        ArbiterEvent::Timeout { state, elapsed_ms } => {
            info!("Arbiter gave up in {} after {} ms", state, elapsed_ms);
        }
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(signal)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
