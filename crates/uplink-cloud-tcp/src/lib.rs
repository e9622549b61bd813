// # TCP Cloud Session
//
// This crate provides a cloud session that holds a plain TCP connection to a
// `host:port` endpoint.
//
// ## Purpose
//
// The arbiter needs proof that the remote service is reachable over the
// interface that is currently up, not just that a link exists. Holding a
// connection open and pinging it at the keep-alive interval gives exactly
// that signal, and keeps NAT mappings alive on the way.
//
// ## Architecture
//
// `connect()` spawns one task on the given tokio runtime. The task dials,
// holds the connection while writing a keep-alive byte every interval and
// watching for peer close, and dials again when the connection is lost.
// `disconnect()` aborts the task. The synchronous trait methods only read
// atomics, so `poll()` never waits on the network.
//
// ## Liveness
//
// A keep-alive write succeeds as soon as it reaches the local send buffer,
// so a dead upstream path would otherwise look connected until TCP
// retransmission gives up. Two checks bound that:
//
// - On Linux, `TCP_USER_TIMEOUT` drops the connection when written data
//   stays unacknowledged for the ack timeout (default 30 s).
// - With a reply timeout set, the peer must send something back within
//   that time after every keep-alive. Only enable this for endpoints that
//   answer keep-alives.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until, timeout};
use tracing::{debug, info, warn};

use uplink_core::traits::CloudSession;
use uplink_core::{Error, Result};

/// Default dial timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default pause between failed dials
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Keep-alive until the arbiter sets one
const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(25);

/// Longest time written data may stay unacknowledged
const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Byte written on every keep-alive
const KEEP_ALIVE_BYTE: u8 = b'\n';

/// Session phase as seen by the arbiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionPhase {
    /// No task running
    Idle = 0,
    /// Task running, not connected
    Dialing = 1,
    /// Task holds an open connection
    Connected = 2,
}

impl SessionPhase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            2 => SessionPhase::Connected,
            1 => SessionPhase::Dialing,
            _ => SessionPhase::Idle,
        }
    }
}

/// State shared with one session task
///
/// Every spawned task gets its own instance, so an aborted task that is
/// still winding down cannot overwrite the phase of its successor.
#[derive(Debug)]
struct Shared {
    phase: AtomicU8,
    keep_alive_ms: AtomicU64,
    keep_alive_changed: Notify,
}

impl Shared {
    fn new(keep_alive: Duration) -> Self {
        Self {
            phase: AtomicU8::new(SessionPhase::Dialing as u8),
            keep_alive_ms: AtomicU64::new(duration_ms(keep_alive)),
            keep_alive_changed: Notify::new(),
        }
    }

    fn phase(&self) -> SessionPhase {
        SessionPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    fn set_phase(&self, phase: SessionPhase) {
        self.phase.store(phase as u8, Ordering::SeqCst);
    }

    fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms.load(Ordering::SeqCst))
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Dead-path detection settings for one session task
#[derive(Debug, Clone, Copy)]
struct Liveness {
    ack_timeout: Duration,
    reply_timeout: Option<Duration>,
}

/// Cloud session over a TCP connection
pub struct TcpCloudSession {
    endpoint: String,
    connect_timeout: Duration,
    retry_delay: Duration,
    keep_alive: Duration,
    liveness: Liveness,
    runtime: Handle,
    shared: Option<Arc<Shared>>,
    task: Option<JoinHandle<()>>,
    /// Aborted task that may not have unwound yet
    closing: Option<JoinHandle<()>>,
}

impl TcpCloudSession {
    /// Create a session for `endpoint` (`host:port`) running on `runtime`
    pub fn new(endpoint: impl Into<String>, runtime: Handle) -> Self {
        Self {
            endpoint: endpoint.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
            keep_alive: DEFAULT_KEEP_ALIVE,
            liveness: Liveness {
                ack_timeout: DEFAULT_ACK_TIMEOUT,
                reply_timeout: None,
            },
            runtime,
            shared: None,
            task: None,
            closing: None,
        }
    }

    pub fn with_connect_timeout(mut self, value: Duration) -> Self {
        self.connect_timeout = value;
        self
    }

    pub fn with_retry_delay(mut self, value: Duration) -> Self {
        self.retry_delay = value;
        self
    }

    /// Drop the connection when sent data stays unacknowledged this long
    ///
    /// Applied as `TCP_USER_TIMEOUT` on Linux; ignored elsewhere.
    pub fn with_ack_timeout(mut self, value: Duration) -> Self {
        self.liveness.ack_timeout = value;
        self
    }

    /// Require the peer to answer every keep-alive within `value`
    pub fn with_reply_timeout(mut self, value: Duration) -> Self {
        self.liveness.reply_timeout = Some(value);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Current phase
    pub fn phase(&self) -> SessionPhase {
        match (&self.task, &self.shared) {
            (Some(_), Some(shared)) => shared.phase(),
            _ => SessionPhase::Idle,
        }
    }

    /// Current keep-alive interval
    pub fn keep_alive(&self) -> Duration {
        self.keep_alive
    }
}

impl CloudSession for TcpCloudSession {
    fn connect(&mut self) {
        if self.task.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let shared = Arc::new(Shared::new(self.keep_alive));
        let endpoint = self.endpoint.clone();
        let connect_timeout = self.connect_timeout;
        let retry_delay = self.retry_delay;
        let liveness = self.liveness;
        let task_shared = Arc::clone(&shared);

        debug!("Starting cloud session to {}", endpoint);
        self.task = Some(self.runtime.spawn(async move {
            run_session(endpoint, connect_timeout, retry_delay, liveness, task_shared).await;
        }));
        self.shared = Some(shared);
    }

    fn disconnect(&mut self) {
        if let Some(task) = self.task.take() {
            info!("Closing cloud session to {}", self.endpoint);
            task.abort();
            self.closing = Some(task);
        }
        self.shared = None;
    }

    fn is_connected(&self) -> bool {
        self.phase() == SessionPhase::Connected
    }

    fn is_disconnected(&self) -> bool {
        self.task.is_none() && self.closing.as_ref().is_none_or(|task| task.is_finished())
    }

    fn set_keep_alive(&mut self, interval: Duration) {
        self.keep_alive = interval;
        if let Some(shared) = &self.shared {
            shared.keep_alive_ms.store(duration_ms(interval), Ordering::SeqCst);
            shared.keep_alive_changed.notify_one();
        }
    }
}

impl Drop for TcpCloudSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Dial, hold, repeat until aborted
async fn run_session(
    endpoint: String,
    connect_timeout: Duration,
    retry_delay: Duration,
    liveness: Liveness,
    shared: Arc<Shared>,
) {
    loop {
        match timeout(connect_timeout, TcpStream::connect(&endpoint)).await {
            Ok(Ok(stream)) => {
                info!("Cloud session connected to {}", endpoint);
                if let Err(e) = set_ack_timeout(&stream, liveness.ack_timeout) {
                    warn!("Failed to set ack timeout on {}: {}", endpoint, e);
                }
                shared.set_phase(SessionPhase::Connected);
                if let Err(e) = hold(stream, &shared, liveness.reply_timeout).await {
                    warn!("Cloud session to {} lost: {}", endpoint, e);
                }
                shared.set_phase(SessionPhase::Dialing);
            }
            Ok(Err(e)) => {
                debug!("Dialing {} failed: {}", endpoint, e);
            }
            Err(_) => {
                debug!("Dialing {} timed out after {:?}", endpoint, connect_timeout);
            }
        }

        sleep(retry_delay).await;
    }
}

/// Bound how long sent data may stay unacknowledged
#[cfg(target_os = "linux")]
fn set_ack_timeout(stream: &TcpStream, ack_timeout: Duration) -> Result<()> {
    use nix::sys::socket::{setsockopt, sockopt};

    let ms = u32::try_from(ack_timeout.as_millis()).unwrap_or(u32::MAX);
    setsockopt(stream, sockopt::TcpUserTimeout, &ms).map_err(std::io::Error::from)?;
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn set_ack_timeout(_stream: &TcpStream, _ack_timeout: Duration) -> Result<()> {
    Ok(())
}

/// Keep an established connection alive until it fails
async fn hold(mut stream: TcpStream, shared: &Shared, reply_timeout: Option<Duration>) -> Result<()> {
    let mut buf = [0u8; 512];
    let mut last_ping = Instant::now();
    let mut reply_deadline: Option<Instant> = None;

    loop {
        let next_ping = last_ping + shared.keep_alive();
        tokio::select! {
            _ = sleep_until(next_ping) => {
                stream.write_all(&[KEEP_ALIVE_BYTE]).await?;
                last_ping = Instant::now();
                if let (Some(reply_timeout), None) = (reply_timeout, reply_deadline) {
                    reply_deadline = Some(last_ping + reply_timeout);
                }
            }
            _ = shared.keep_alive_changed.notified() => {}
            _ = sleep_until(reply_deadline.unwrap_or(next_ping)), if reply_deadline.is_some() => {
                return Err(Error::cloud("no reply to keep-alive"));
            }
            read = stream.read(&mut buf) => {
                if read? == 0 {
                    return Err(Error::cloud("connection closed by peer"));
                }
                reply_deadline = None;
            }
        }
    }
}
