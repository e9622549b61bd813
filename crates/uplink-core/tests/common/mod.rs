//! Test doubles and common utilities for arbiter contract tests
//!
//! Every double hands the test a handle sharing its state through `Arc`, so
//! the test can flip signals and read call counters after the double has been
//! moved into the arbiter.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use uplink_core::{
    ActiveInterface, ArbiterConfig, ArbiterEvent, ArbiterState, BackupInterface, Clock,
    CloudSession, PrimaryInterface, StatusColor, StatusIndicator, UplinkArbiter,
};

/// A clock the test moves by hand
#[derive(Clone)]
pub struct ScriptedClock {
    now: Arc<AtomicU32>,
}

impl ScriptedClock {
    pub fn starting_at(ms: u32) -> Self {
        Self {
            now: Arc::new(AtomicU32::new(ms)),
        }
    }

    /// Move forward, wrapping like the real counter
    pub fn advance(&self, ms: u32) {
        let now = self.now.load(Ordering::SeqCst);
        self.now.store(now.wrapping_add(ms), Ordering::SeqCst);
    }

    pub fn now(&self) -> u32 {
        self.now.load(Ordering::SeqCst)
    }
}

impl Clock for ScriptedClock {
    fn millis(&self) -> u32 {
        self.now()
    }
}

/// Observable state of a scripted interface
#[derive(Debug, Default)]
pub struct InterfaceState {
    pub ready: bool,
    pub up: bool,
    pub connect_calls: usize,
    pub disconnect_calls: usize,
}

/// Test-side handle to a scripted interface
#[derive(Clone, Default)]
pub struct InterfaceHandle {
    inner: Arc<Mutex<InterfaceState>>,
}

impl InterfaceHandle {
    pub fn set_ready(&self, ready: bool) {
        self.inner.lock().unwrap().ready = ready;
    }

    pub fn is_up(&self) -> bool {
        self.inner.lock().unwrap().up
    }

    pub fn connect_calls(&self) -> usize {
        self.inner.lock().unwrap().connect_calls
    }

    pub fn disconnect_calls(&self) -> usize {
        self.inner.lock().unwrap().disconnect_calls
    }

    fn connect(&self) {
        let mut state = self.inner.lock().unwrap();
        state.up = true;
        state.connect_calls += 1;
    }

    fn disconnect(&self) {
        let mut state = self.inner.lock().unwrap();
        state.up = false;
        state.disconnect_calls += 1;
    }

    fn is_ready(&self) -> bool {
        self.inner.lock().unwrap().ready
    }
}

/// Primary interface whose readiness is set by the test
pub struct ScriptedPrimary {
    present: bool,
    handle: InterfaceHandle,
}

impl ScriptedPrimary {
    pub fn new(present: bool) -> (Self, InterfaceHandle) {
        let handle = InterfaceHandle::default();
        (
            Self {
                present,
                handle: handle.clone(),
            },
            handle,
        )
    }
}

impl PrimaryInterface for ScriptedPrimary {
    fn is_present(&self) -> bool {
        self.present
    }

    fn connect(&mut self) {
        self.handle.connect();
    }

    fn disconnect(&mut self) {
        self.handle.disconnect();
    }

    fn is_ready(&self) -> bool {
        self.handle.is_ready()
    }
}

/// Backup interface whose readiness is set by the test
pub struct ScriptedBackup {
    handle: InterfaceHandle,
}

impl ScriptedBackup {
    pub fn new() -> (Self, InterfaceHandle) {
        let handle = InterfaceHandle::default();
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }
}

impl BackupInterface for ScriptedBackup {
    fn connect(&mut self) {
        self.handle.connect();
    }

    fn disconnect(&mut self) {
        self.handle.disconnect();
    }

    fn is_ready(&self) -> bool {
        self.handle.is_ready()
    }
}

/// Observable state of the scripted cloud session
#[derive(Debug)]
pub struct CloudState {
    pub connected: bool,
    pub disconnected: bool,
    /// Whether `disconnect()` completes immediately
    pub instant_teardown: bool,
    pub keep_alive: Option<Duration>,
    pub connect_calls: usize,
    pub disconnect_calls: usize,
}

impl Default for CloudState {
    fn default() -> Self {
        Self {
            connected: false,
            disconnected: true,
            instant_teardown: true,
            keep_alive: None,
            connect_calls: 0,
            disconnect_calls: 0,
        }
    }
}

/// Test-side handle to the scripted cloud session
#[derive(Clone, Default)]
pub struct CloudHandle {
    inner: Arc<Mutex<CloudState>>,
}

impl CloudHandle {
    pub fn set_connected(&self, connected: bool) {
        let mut state = self.inner.lock().unwrap();
        state.connected = connected;
        if connected {
            state.disconnected = false;
        }
    }

    /// Report teardown finished (or not)
    pub fn set_disconnected(&self, disconnected: bool) {
        self.inner.lock().unwrap().disconnected = disconnected;
    }

    pub fn set_instant_teardown(&self, instant: bool) {
        self.inner.lock().unwrap().instant_teardown = instant;
    }

    pub fn keep_alive(&self) -> Option<Duration> {
        self.inner.lock().unwrap().keep_alive
    }

    pub fn connect_calls(&self) -> usize {
        self.inner.lock().unwrap().connect_calls
    }

    pub fn disconnect_calls(&self) -> usize {
        self.inner.lock().unwrap().disconnect_calls
    }
}

/// Cloud session whose connectivity is set by the test
pub struct ScriptedCloud {
    handle: CloudHandle,
}

impl ScriptedCloud {
    pub fn new() -> (Self, CloudHandle) {
        let handle = CloudHandle::default();
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }
}

impl CloudSession for ScriptedCloud {
    fn connect(&mut self) {
        let mut state = self.handle.inner.lock().unwrap();
        state.connect_calls += 1;
        state.disconnected = false;
    }

    fn disconnect(&mut self) {
        let mut state = self.handle.inner.lock().unwrap();
        state.disconnect_calls += 1;
        state.connected = false;
        state.disconnected = state.instant_teardown;
    }

    fn is_connected(&self) -> bool {
        self.handle.inner.lock().unwrap().connected
    }

    fn is_disconnected(&self) -> bool {
        self.handle.inner.lock().unwrap().disconnected
    }

    fn set_keep_alive(&mut self, interval: Duration) {
        self.handle.inner.lock().unwrap().keep_alive = Some(interval);
    }
}

/// What the arbiter asked the indicator to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorCall {
    Apply(StatusColor),
    RestoreDefault,
}

/// Indicator that records every call
#[derive(Clone, Default)]
pub struct RecordingIndicator {
    calls: Arc<Mutex<Vec<IndicatorCall>>>,
}

impl RecordingIndicator {
    pub fn calls(&self) -> Vec<IndicatorCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<IndicatorCall> {
        self.calls.lock().unwrap().last().copied()
    }
}

impl StatusIndicator for RecordingIndicator {
    fn apply_backup_color(&mut self, color: StatusColor) {
        self.calls.lock().unwrap().push(IndicatorCall::Apply(color));
    }

    fn restore_default(&mut self) {
        self.calls.lock().unwrap().push(IndicatorCall::RestoreDefault);
    }
}

/// An arbiter wired to scripted collaborators
pub struct Rig {
    pub arbiter: UplinkArbiter,
    pub clock: ScriptedClock,
    pub primary: InterfaceHandle,
    pub backup: InterfaceHandle,
    pub cloud: CloudHandle,
    pub indicator: RecordingIndicator,
    pub changes: Arc<Mutex<Vec<(ActiveInterface, ActiveInterface)>>>,
    pub events: mpsc::Receiver<ArbiterEvent>,
}

impl Rig {
    pub fn new(primary_present: bool) -> Self {
        Self::with_config(primary_present, ArbiterConfig::default(), 0)
    }

    pub fn with_config(primary_present: bool, config: ArbiterConfig, start_ms: u32) -> Self {
        let clock = ScriptedClock::starting_at(start_ms);
        let (primary, primary_handle) = ScriptedPrimary::new(primary_present);
        let (backup, backup_handle) = ScriptedBackup::new();
        let (cloud, cloud_handle) = ScriptedCloud::new();
        let indicator = RecordingIndicator::default();
        let changes = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&changes);
        let mut arbiter = UplinkArbiter::new(
            Box::new(primary),
            Box::new(backup),
            Box::new(cloud),
            Box::new(indicator.clone()),
            Box::new(clock.clone()),
            config.with_event_channel_capacity(4096),
        )
        .expect("valid config")
        .with_interface_change_callback(move |old, new| {
            recorded.lock().unwrap().push((old, new));
        });
        let events = arbiter.subscribe();
        arbiter.setup();

        Self {
            arbiter,
            clock,
            primary: primary_handle,
            backup: backup_handle,
            cloud: cloud_handle,
            indicator,
            changes,
            events,
        }
    }

    /// Poll once and return the resulting state
    pub fn poll(&mut self) -> ArbiterState {
        self.arbiter.poll();
        self.arbiter.state()
    }

    /// Advance the clock, then poll once
    pub fn advance_and_poll(&mut self, ms: u32) -> ArbiterState {
        self.clock.advance(ms);
        self.poll()
    }

    /// Poll until `target` is reached, at most `max_polls` times
    pub fn poll_until(&mut self, target: ArbiterState, max_polls: usize) -> bool {
        for _ in 0..max_polls {
            if self.poll() == target {
                return true;
            }
        }
        false
    }

    pub fn state(&self) -> ArbiterState {
        self.arbiter.state()
    }

    pub fn changes(&self) -> Vec<(ActiveInterface, ActiveInterface)> {
        self.changes.lock().unwrap().clone()
    }

    /// Drain pending events
    pub fn drain_events(&mut self) -> Vec<ArbiterEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// State sequence recorded by the event channel so far
    pub fn drain_state_trace(&mut self) -> Vec<ArbiterState> {
        let mut trace = Vec::new();
        for event in self.drain_events() {
            if let ArbiterEvent::StateChanged { from, to } = event {
                if trace.is_empty() {
                    trace.push(from);
                }
                trace.push(to);
            }
        }
        trace
    }

    /// Drive a present primary all the way to `PrimaryCloudConnected`
    pub fn connect_over_primary(&mut self) {
        self.primary.set_ready(true);
        assert!(self.poll_until(ArbiterState::WaitPrimaryCloud, 5));
        self.cloud.set_connected(true);
        assert_eq!(self.poll(), ArbiterState::PrimaryCloudConnected);
    }

    /// Drive into `CellularCloudConnected` from wherever the backup branch starts
    pub fn connect_over_backup(&mut self) {
        self.backup.set_ready(true);
        assert!(self.poll_until(ArbiterState::WaitCellularCloud, 5));
        self.cloud.set_connected(true);
        assert_eq!(self.poll(), ArbiterState::CellularCloudConnected);
    }
}

/// Small deterministic generator for signal-injection tests
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next_u32(&mut self) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) as u32
    }

    pub fn chance(&mut self, percent: u32) -> bool {
        self.next_u32() % 100 < percent
    }
}
