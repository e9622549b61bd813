// # Sysfs Interface Driver
//
// This crate drives a Linux network interface for the uplink arbiter.
//
// ## Signals
//
// - Presence: `/sys/class/net/<if>/address` exists and is not all zeros
// - Readiness: `operstate` is `up`, or `unknown` with `carrier` = 1 (what
//   PPP and most cellular modems report)
// - Bring-up / tear-down: `ip link set dev <if> up|down`
//
// ## Failure Reporting
//
// Nothing here returns an error to the arbiter. Unreadable attributes count
// as "not ready", failed `ip` invocations are logged, and the arbiter's
// timeouts handle the rest.
//
// ## Non-blocking Link Control
//
// `ip` is spawned and never waited on. Its exit status is collected with
// `try_wait()` on later calls, so a slow or stuck `ip` cannot stall the
// arbiter's poll.
//
// ## Platform Support
//
// Reads only sysfs, so any Linux kernel works. The root directory can be
// redirected for tests.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use tracing::{debug, warn};
use uplink_core::traits::{BackupInterface, PrimaryInterface};
use uplink_core::{Error, Result};

/// Where the kernel exposes network interfaces
pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class/net";

/// Program used for link control
pub const DEFAULT_IP_COMMAND: &str = "ip";

/// Kernel operational state (RFC 2863 names as exposed in `operstate`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperState {
    Up,
    Down,
    Dormant,
    LowerLayerDown,
    NotPresent,
    Testing,
    Unknown,
}

impl OperState {
    fn parse(raw: &str) -> Self {
        match raw.trim() {
            "up" => OperState::Up,
            "down" => OperState::Down,
            "dormant" => OperState::Dormant,
            "lowerlayerdown" => OperState::LowerLayerDown,
            "notpresent" => OperState::NotPresent,
            "testing" => OperState::Testing,
            _ => OperState::Unknown,
        }
    }
}

/// Link status read from sysfs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkState {
    pub oper_state: OperState,
    pub carrier: bool,
}

impl LinkState {
    /// Whether the link can carry traffic
    pub fn is_ready(&self) -> bool {
        match self.oper_state {
            OperState::Up => true,
            OperState::Unknown => self.carrier,
            _ => false,
        }
    }
}

/// An `ip link set` invocation that has not been reaped yet
#[derive(Debug)]
struct LinkCommand {
    direction: &'static str,
    child: Child,
}

/// A network interface backed by sysfs and `ip link`
#[derive(Debug)]
pub struct SysfsInterface {
    name: String,
    root: PathBuf,
    link_control: bool,
    ip_command: PathBuf,
    in_flight: Vec<LinkCommand>,
}

impl SysfsInterface {
    /// Create a driver for interface `name` (e.g. "eth0", "wwan0")
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: PathBuf::from(DEFAULT_SYSFS_ROOT),
            link_control: true,
            ip_command: PathBuf::from(DEFAULT_IP_COMMAND),
            in_flight: Vec::new(),
        }
    }

    /// Read attributes below `root` instead of `/sys/class/net`
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Whether connect/disconnect run `ip link set`
    ///
    /// Disable when another service (NetworkManager, ModemManager) owns the
    /// link; the arbiter then only observes it.
    pub fn with_link_control(mut self, enabled: bool) -> Self {
        self.link_control = enabled;
        self
    }

    /// Run `program` instead of `ip` for link control
    pub fn with_ip_command(mut self, program: impl Into<PathBuf>) -> Self {
        self.ip_command = program.into();
        self
    }

    /// Whether connect/disconnect change the link
    pub fn link_control(&self) -> bool {
        self.link_control
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn attr_path(&self, attr: &str) -> PathBuf {
        self.root.join(&self.name).join(attr)
    }

    fn read_attr(&self, attr: &str) -> io::Result<String> {
        fs::read_to_string(self.attr_path(attr)).map(|s| s.trim().to_string())
    }

    /// Hardware address, `None` when missing or all zeros
    pub fn mac_address(&self) -> Option<String> {
        let mac = self.read_attr("address").ok()?;
        let is_zero = mac
            .split(':')
            .all(|octet| octet.chars().all(|c| c == '0'));
        if mac.is_empty() || is_zero {
            None
        } else {
            Some(mac)
        }
    }

    /// Current link state
    pub fn link_state(&self) -> Result<LinkState> {
        let oper_state = OperState::parse(
            &self
                .read_attr("operstate")
                .map_err(|e| Error::interface(&self.name, format!("operstate: {}", e)))?,
        );
        // Reading carrier on an administratively down link fails with EINVAL
        let carrier = self.read_attr("carrier").is_ok_and(|c| c == "1");

        Ok(LinkState {
            oper_state,
            carrier,
        })
    }

    /// Whether the interface exists in sysfs at all
    pub fn exists(&self) -> bool {
        Path::new(&self.root).join(&self.name).is_dir()
    }

    fn ready(&self) -> bool {
        match self.link_state() {
            Ok(state) => state.is_ready(),
            Err(e) => {
                debug!("{}", e);
                false
            }
        }
    }

    /// Start `ip link set dev <if> up|down` without waiting for it
    fn set_link(&mut self, up: bool) -> Result<()> {
        self.reap();

        let direction = if up { "up" } else { "down" };
        if !self.link_control {
            debug!("Link control disabled, not setting {} {}", self.name, direction);
            return Ok(());
        }

        let child = Command::new(&self.ip_command)
            .args(["link", "set", "dev", &self.name, direction])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()?;

        debug!("Setting {} {} (pid {})", self.name, direction, child.id());
        self.in_flight.push(LinkCommand { direction, child });
        Ok(())
    }

    /// Collect finished link commands and log failures
    fn reap(&mut self) {
        let name = &self.name;
        self.in_flight.retain_mut(|cmd| match cmd.child.try_wait() {
            Ok(Some(status)) if status.success() => {
                debug!("Set {} {}", name, cmd.direction);
                false
            }
            Ok(Some(status)) => {
                warn!(
                    "{}",
                    Error::interface(
                        name,
                        format!("ip link set {} exited with {}", cmd.direction, status)
                    )
                );
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!("Failed to check ip link set {} on {}: {}", cmd.direction, name, e);
                false
            }
        });
    }

    /// Link commands started but not finished yet
    pub fn link_commands_in_flight(&mut self) -> usize {
        self.reap();
        self.in_flight.len()
    }

    fn bring_up(&mut self) {
        if let Err(e) = self.set_link(true) {
            warn!("Failed to bring up {}: {}", self.name, e);
        }
    }

    fn bring_down(&mut self) {
        if let Err(e) = self.set_link(false) {
            warn!("Failed to take down {}: {}", self.name, e);
        }
    }
}

impl PrimaryInterface for SysfsInterface {
    fn is_present(&self) -> bool {
        self.mac_address().is_some()
    }

    fn connect(&mut self) {
        self.bring_up();
    }

    fn disconnect(&mut self) {
        self.bring_down();
    }

    fn is_ready(&self) -> bool {
        self.ready()
    }
}

impl BackupInterface for SysfsInterface {
    fn connect(&mut self) {
        self.bring_up();
    }

    fn disconnect(&mut self) {
        self.bring_down();
    }

    fn is_ready(&self) -> bool {
        self.ready()
    }
}
