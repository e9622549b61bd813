// # uplink-core
//
// Core library for arbitrating between a preferred wired interface and a
// backup wireless/cellular interface on a device that can only keep one of
// them up at a time.
//
// ## Architecture Overview
//
// - **PrimaryInterface / BackupInterface**: Traits for the two interface drivers
// - **CloudSession**: Trait for the connection to the remote service
// - **StatusIndicator**: Trait for the visual connection status
// - **Clock**: 32-bit wrapping millisecond counter
// - **UplinkArbiter**: The polled state machine that decides which
//   interface carries the cloud session
//
// ## Design Principles
//
// 1. **Cloud reachability decides**: link readiness alone never keeps an interface
// 2. **Non-blocking**: one poll, at most one transition, no waiting
// 3. **Timeouts, not errors**: every failure path has an explicit next state
// 4. **Library-first**: drivers and sessions are pluggable collaborators

pub mod traits;
pub mod arbiter;
pub mod clock;
pub mod color;
pub mod config;
pub mod error;
pub mod status;

// Re-export core types for convenience
pub use traits::{PrimaryInterface, BackupInterface, CloudSession, StatusIndicator};
pub use arbiter::{
    ActiveInterface, ArbiterEvent, ArbiterState, ArbiterStatus, InterfaceChangeCallback,
    UplinkArbiter,
};
pub use clock::{Clock, MonotonicClock, elapsed_ms};
pub use color::StatusColor;
pub use config::ArbiterConfig;
pub use error::{Error, Result};
pub use status::{LogIndicator, NullIndicator};
