//! Collaborator traits for the uplink arbiter
//!
//! The arbiter never touches hardware or sockets itself. It drives these
//! narrow, synchronous interfaces:
//!
//! - [`PrimaryInterface`]: the preferred (wired) interface
//! - [`BackupInterface`]: the fallback (cellular/wireless) interface
//! - [`CloudSession`]: the logical connection to the remote service
//! - [`StatusIndicator`]: the visual status override
//!
//! The clock lives in [`crate::clock`].

pub mod interface;
pub mod cloud_session;
pub mod indicator;

pub use interface::{PrimaryInterface, BackupInterface};
pub use cloud_session::CloudSession;
pub use indicator::StatusIndicator;
