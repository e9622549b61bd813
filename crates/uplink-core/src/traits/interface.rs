// # Network Interface Traits
//
// Defines the driver surface for the two mutually exclusive interfaces.
//
// ## Implementations
//
// - Linux sysfs + `ip link`: `uplink-iface-sysfs` crate
// - Scripted doubles: `crates/uplink-core/tests/common`
//
// ## Contract
//
// Every method returns promptly. `connect()` and `disconnect()` only start
// the bring-up / tear-down; the arbiter polls `is_ready()` afterwards.
// Driver faults are not reported as errors: an interface that cannot come
// up simply never reports ready, and the arbiter's timeouts take over.

/// The preferred (typically wired) interface
pub trait PrimaryInterface: Send {
    /// Whether the adapter hardware exists at all
    ///
    /// Probed exactly once, in the arbiter's start state. There is no
    /// hot-plug detection.
    fn is_present(&self) -> bool;

    /// Begin bringing the interface up
    fn connect(&mut self);

    /// Begin taking the interface down
    fn disconnect(&mut self);

    /// Whether a usable local path exists (link + address)
    ///
    /// This says nothing about cloud reachability.
    fn is_ready(&self) -> bool;
}

/// The fallback (cellular or wireless) interface
pub trait BackupInterface: Send {
    /// Begin bringing the interface up
    fn connect(&mut self);

    /// Begin taking the interface down
    fn disconnect(&mut self);

    /// Whether a usable local path exists (attached + address)
    fn is_ready(&self) -> bool;
}
