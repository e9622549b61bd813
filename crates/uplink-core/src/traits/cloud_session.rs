// # Cloud Session Trait
//
// The logical connection to the remote service, carried over whichever
// interface is currently up.
//
// ## Implementations
//
// - TCP endpoint session: `uplink-cloud-tcp` crate
//
// ## Connected vs. disconnected
//
// `is_connected()` and `is_disconnected()` are not negations of each other.
// A session that is dialing or tearing down is neither. The arbiter waits
// for `is_disconnected()` before leaving an established backup session so
// the old connection is gone before the primary is brought up.

use std::time::Duration;

/// Session to the remote cloud service
pub trait CloudSession: Send {
    /// Start connecting; keeps trying until connected or disconnected
    fn connect(&mut self);

    /// Start tearing the session down
    fn disconnect(&mut self);

    /// Whether the session is established
    fn is_connected(&self) -> bool;

    /// Whether the session is fully torn down
    fn is_disconnected(&self) -> bool;

    /// Interval at which the session refreshes its reachability
    fn set_keep_alive(&mut self, interval: Duration);
}
