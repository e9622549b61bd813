//! Uplink arbitration state machine
//!
//! The UplinkArbiter is responsible for:
//! - Preferring the primary interface whenever it can reach the cloud
//! - Falling back to the backup interface when it cannot
//! - Periodically re-probing the primary while running on backup
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌─────────────────┐   ┌──────────────┐
//! │ PrimaryInterface │   │ BackupInterface │   │ CloudSession │
//! └──────────────────┘   └─────────────────┘   └──────────────┘
//!          ▲                      ▲                    ▲
//!          └──────────────────────┼────────────────────┘
//!                                 │
//!                        ┌──────────────────┐
//!     host run loop ───▶ │  UplinkArbiter   │ ───▶ callback / events
//!        poll()          └──────────────────┘
//!                                 │
//!                                 ▼
//!                        ┌──────────────────┐
//!                        │ StatusIndicator  │
//!                        └──────────────────┘
//! ```
//!
//! ## Polling
//!
//! [`UplinkArbiter::poll()`] never blocks and performs at most one state
//! transition. A state reached during one poll is evaluated on the next one,
//! even if its condition already holds.
//!
//! Link readiness only gates the attempt to reach the cloud. The decision to
//! stay on an interface is made on cloud reachability alone, because a LAN can
//! be up with no upstream and a radio can be attached with no usable tower.
//!
//! ## Failures
//!
//! Every failure is a timeout. A present-but-unreachable primary makes the
//! arbiter cycle `TryPrimary → TryCellular → … → TryPrimary`; an absent
//! primary pins it to the backup branch with no timeout on backup readiness.

mod state;

pub use state::{ActiveInterface, ArbiterEvent, ArbiterState, ArbiterStatus};

use crate::clock::{elapsed_ms, Clock};
use crate::config::{ArbiterConfig, Timeouts};
use crate::error::Result;
use crate::traits::{BackupInterface, CloudSession, PrimaryInterface, StatusIndicator};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

/// Handler invoked with `(old, new)` whenever the active interface changes
///
/// Runs synchronously inside [`UplinkArbiter::poll()`]; it must not block.
pub type InterfaceChangeCallback = Box<dyn FnMut(ActiveInterface, ActiveInterface) + Send>;

/// Wired/backup uplink arbiter
///
/// ## Lifecycle
///
/// 1. Create with [`UplinkArbiter::new()`] at the composition root
/// 2. Optionally register a callback or take an event receiver
/// 3. Call [`UplinkArbiter::setup()`] once
/// 4. Call [`UplinkArbiter::poll()`] on every iteration of the run loop
///
/// The arbiter owns its collaborators exclusively; nothing else should drive
/// the interfaces or the cloud session while it runs. All state is in memory
/// and rebuilt from [`ArbiterState::Start`] on every construction.
pub struct UplinkArbiter {
    primary: Box<dyn PrimaryInterface>,
    backup: Box<dyn BackupInterface>,
    cloud: Box<dyn CloudSession>,
    indicator: Box<dyn StatusIndicator>,
    clock: Box<dyn Clock>,

    config: ArbiterConfig,
    timeouts: Timeouts,

    state: ArbiterState,
    active_interface: ActiveInterface,

    /// Latched in the start state
    primary_present: bool,

    /// Clock value when the current timer was (re)started
    state_time: u32,

    setup_done: bool,
    interface_change_callback: Option<InterfaceChangeCallback>,
    event_tx: Option<mpsc::Sender<ArbiterEvent>>,
}

impl UplinkArbiter {
    /// Create a new arbiter
    ///
    /// # Returns
    ///
    /// - `Ok(UplinkArbiter)`: Arbiter in [`ArbiterState::Start`]
    /// - `Err(Error::Config)`: If `config` fails validation
    pub fn new(
        primary: Box<dyn PrimaryInterface>,
        backup: Box<dyn BackupInterface>,
        cloud: Box<dyn CloudSession>,
        indicator: Box<dyn StatusIndicator>,
        clock: Box<dyn Clock>,
        config: ArbiterConfig,
    ) -> Result<Self> {
        config.validate()?;
        let timeouts = config.timeouts();
        let state_time = clock.millis();

        Ok(Self {
            primary,
            backup,
            cloud,
            indicator,
            clock,
            config,
            timeouts,
            state: ArbiterState::Start,
            active_interface: ActiveInterface::None,
            primary_present: false,
            state_time,
            setup_done: false,
            interface_change_callback: None,
            event_tx: None,
        })
    }

    /// Register the interface change handler, replacing any previous one
    pub fn with_interface_change_callback<F>(mut self, callback: F) -> Self
    where
        F: FnMut(ActiveInterface, ActiveInterface) + Send + 'static,
    {
        self.interface_change_callback = Some(Box::new(callback));
        self
    }

    /// Create the event channel and return its receiver
    ///
    /// Replaces any previously created channel. Capacity comes from
    /// [`ArbiterConfig::event_channel_capacity`].
    pub fn subscribe(&mut self) -> mpsc::Receiver<ArbiterEvent> {
        let (tx, rx) = mpsc::channel(self.config.event_channel_capacity);
        self.event_tx = Some(tx);
        rx
    }

    /// One-time initialization; later calls are no-ops
    pub fn setup(&mut self) {
        if self.setup_done {
            return;
        }
        self.setup_done = true;

        info!(
            "Uplink arbiter ready: primary connect {:?}, primary cloud {:?}, backup connect {:?}, backup cloud {:?}, retry primary every {:?}",
            self.config.primary_connect_timeout(),
            self.config.primary_cloud_connect_timeout(),
            self.config.backup_connect_timeout(),
            self.config.backup_cloud_connect_timeout(),
            self.config.retry_primary_period(),
        );
    }

    /// Advance the state machine by at most one transition
    pub fn poll(&mut self) {
        let now = self.clock.millis();

        let next = match self.state {
            ArbiterState::Start => self.state_start(),
            ArbiterState::TryPrimary => self.state_try_primary(now),
            ArbiterState::WaitPrimaryReady => self.state_wait_primary_ready(now),
            ArbiterState::WaitPrimaryCloud => self.state_wait_primary_cloud(now),
            ArbiterState::PrimaryCloudConnected => self.state_primary_cloud_connected(now),
            ArbiterState::TryCellular => self.state_try_cellular(now),
            ArbiterState::WaitCellularReady => self.state_wait_cellular_ready(now),
            ArbiterState::WaitCellularCloud => self.state_wait_cellular_cloud(now),
            ArbiterState::CellularCloudConnected => self.state_cellular_cloud_connected(now),
            ArbiterState::CellularWaitThenTryPrimary => self.state_cellular_wait_then_try_primary(),
        };

        if let Some(next) = next {
            self.transition(next);
        }
    }

    /// Current state
    pub fn state(&self) -> ArbiterState {
        self.state
    }

    /// Interface currently carrying the cloud session
    pub fn active_interface(&self) -> ActiveInterface {
        self.active_interface
    }

    /// Whether the primary adapter was found at start (false before that)
    pub fn primary_present(&self) -> bool {
        self.primary_present
    }

    /// Snapshot of the arbiter
    pub fn status(&self) -> ArbiterStatus {
        ArbiterStatus {
            state: self.state,
            active_interface: self.active_interface,
            primary_present: self.primary_present,
            time_in_state_ms: elapsed_ms(self.clock.millis(), self.state_time),
        }
    }

    /// Current configuration
    pub fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    /// Replace the configuration between polls
    ///
    /// Running timers keep their start time and are compared against the new
    /// values from the next poll on.
    pub fn set_config(&mut self, config: ArbiterConfig) -> Result<()> {
        config.validate()?;
        self.timeouts = config.timeouts();
        self.config = config;
        Ok(())
    }

    /// Single mutation point for the active interface
    fn set_active_interface(&mut self, new: ActiveInterface) {
        let old = self.active_interface;
        self.active_interface = new;

        if old != new {
            info!("Active interface {} -> {}", old, new);
            if let Some(callback) = self.interface_change_callback.as_mut() {
                callback(old, new);
            }
            self.emit_event(ArbiterEvent::InterfaceChanged { old, new });
        }
    }

    fn transition(&mut self, next: ArbiterState) {
        info!("State {} -> {}", self.state, next);
        let from = self.state;
        self.state = next;
        self.emit_event(ArbiterEvent::StateChanged { from, to: next });
    }

    fn timed_out(&self, now: u32, timeout: u32) -> Option<u32> {
        let elapsed = elapsed_ms(now, self.state_time);
        (elapsed >= timeout).then_some(elapsed)
    }

    fn state_start(&mut self) -> Option<ArbiterState> {
        self.primary_present = self.primary.is_present();
        if self.primary_present {
            info!("Primary adapter present");
        } else {
            info!("No primary adapter, using backup only");
        }
        self.emit_event(ArbiterEvent::Started {
            primary_present: self.primary_present,
        });

        if self.primary_present {
            Some(ArbiterState::TryPrimary)
        } else {
            Some(ArbiterState::TryCellular)
        }
    }

    fn state_try_primary(&mut self, now: u32) -> Option<ArbiterState> {
        info!("Trying to connect by primary interface");
        self.indicator.restore_default();
        self.set_active_interface(ActiveInterface::None);

        self.state_time = now;
        self.backup.disconnect();
        self.primary.connect();
        Some(ArbiterState::WaitPrimaryReady)
    }

    fn state_wait_primary_ready(&mut self, now: u32) -> Option<ArbiterState> {
        if self.primary.is_ready() {
            debug!("Primary interface ready, connecting to the cloud");
            self.cloud.connect();
            self.state_time = now;
            return Some(ArbiterState::WaitPrimaryCloud);
        }

        if let Some(elapsed) = self.timed_out(now, self.timeouts.primary_connect) {
            info!("Timed out bringing up primary interface after {} ms, reverting to backup", elapsed);
            self.emit_timeout(elapsed);
            return Some(ArbiterState::TryCellular);
        }

        None
    }

    fn state_wait_primary_cloud(&mut self, now: u32) -> Option<ArbiterState> {
        if self.cloud.is_connected() {
            info!(
                "Cloud connected over primary, keep-alive {}s",
                self.config.primary_keep_alive_secs
            );
            self.cloud.set_keep_alive(self.config.primary_keep_alive());
            self.set_active_interface(ActiveInterface::Primary);
            self.state_time = now;
            return Some(ArbiterState::PrimaryCloudConnected);
        }

        if let Some(elapsed) = self.timed_out(now, self.timeouts.primary_cloud_connect) {
            info!("Took too long to reach the cloud over primary ({} ms), switching to backup", elapsed);
            self.emit_timeout(elapsed);
            self.cloud.disconnect();
            self.primary.disconnect();
            return Some(ArbiterState::TryCellular);
        }

        None
    }

    fn state_primary_cloud_connected(&mut self, now: u32) -> Option<ArbiterState> {
        if !self.cloud.is_connected() {
            info!("Lost the cloud while on primary, waiting for reconnect");
            self.set_active_interface(ActiveInterface::None);
            self.state_time = now;
            return Some(ArbiterState::WaitPrimaryCloud);
        }

        None
    }

    fn state_try_cellular(&mut self, now: u32) -> Option<ArbiterState> {
        info!("Trying to connect by backup interface");
        self.set_active_interface(ActiveInterface::None);

        let color = self.config.backup_color;
        if color.is_default() {
            self.indicator.restore_default();
        } else {
            self.indicator.apply_backup_color(color);
        }

        self.state_time = now;
        self.primary.disconnect();
        self.backup.connect();
        Some(ArbiterState::WaitCellularReady)
    }

    fn state_wait_cellular_ready(&mut self, now: u32) -> Option<ArbiterState> {
        if self.backup.is_ready() {
            debug!("Backup interface ready, connecting to the cloud");
            self.cloud.connect();
            self.state_time = now;
            return Some(ArbiterState::WaitCellularCloud);
        }

        // Without a primary there is nowhere to go back to: wait indefinitely.
        if self.primary_present {
            if let Some(elapsed) = self.timed_out(now, self.timeouts.backup_connect) {
                info!("Timed out bringing up backup interface after {} ms, trying primary again", elapsed);
                self.emit_timeout(elapsed);
                return Some(ArbiterState::TryPrimary);
            }
        }

        None
    }

    fn state_wait_cellular_cloud(&mut self, now: u32) -> Option<ArbiterState> {
        if self.cloud.is_connected() {
            info!(
                "Cloud connected over backup, keep-alive {}s",
                self.config.backup_keep_alive_secs
            );
            self.cloud.set_keep_alive(self.config.backup_keep_alive());
            self.set_active_interface(ActiveInterface::Backup);
            self.state_time = now;
            return Some(ArbiterState::CellularCloudConnected);
        }

        if self.primary_present {
            if let Some(elapsed) = self.timed_out(now, self.timeouts.backup_cloud_connect) {
                info!("Took too long to reach the cloud over backup ({} ms), trying primary again", elapsed);
                self.emit_timeout(elapsed);
                // No established session to tear down, so no wait for it.
                self.cloud.disconnect();
                return Some(ArbiterState::TryPrimary);
            }
        }

        None
    }

    fn state_cellular_cloud_connected(&mut self, now: u32) -> Option<ArbiterState> {
        if !self.cloud.is_connected() {
            info!("Lost the cloud while on backup");
            self.set_active_interface(ActiveInterface::None);
            self.state_time = now;
            return Some(ArbiterState::WaitCellularCloud);
        }

        if self.primary_present && self.timed_out(now, self.timeouts.retry_primary_period).is_some() {
            info!("Retry period elapsed, trying primary again");
            self.cloud.disconnect();
            self.set_active_interface(ActiveInterface::None);
            return Some(ArbiterState::CellularWaitThenTryPrimary);
        }

        None
    }

    fn state_cellular_wait_then_try_primary(&mut self) -> Option<ArbiterState> {
        if self.cloud.is_disconnected() {
            debug!("Backup cloud session torn down");
            return Some(ArbiterState::TryPrimary);
        }

        None
    }

    fn emit_timeout(&mut self, elapsed_ms: u32) {
        self.emit_event(ArbiterEvent::Timeout {
            state: self.state,
            elapsed_ms,
        });
    }

    /// Emit an arbiter event
    ///
    /// Never blocks: a full channel drops the event, a closed one is released.
    fn emit_event(&mut self, event: ArbiterEvent) {
        let Some(tx) = self.event_tx.as_ref() else {
            return;
        };

        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Event receiver dropped, no longer emitting events");
                self.event_tx = None;
            }
        }
    }
}
