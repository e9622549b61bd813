//! Arbiter states, active interface, events and status snapshot

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which interface currently carries the cloud session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveInterface {
    /// No cloud session is established
    #[default]
    None,
    /// Connected over the preferred (wired) interface
    Primary,
    /// Connected over the backup (cellular/wireless) interface
    Backup,
}

impl fmt::Display for ActiveInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActiveInterface::None => "none",
            ActiveInterface::Primary => "primary",
            ActiveInterface::Backup => "backup",
        };
        f.write_str(name)
    }
}

/// The arbiter's program counter
///
/// `Try*` states perform their entry actions on the poll that reaches them
/// and always move on to the matching `Wait*Ready` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ArbiterState {
    /// Probe for the primary adapter
    #[default]
    Start,
    TryPrimary,
    WaitPrimaryReady,
    WaitPrimaryCloud,
    PrimaryCloudConnected,
    TryCellular,
    WaitCellularReady,
    WaitCellularCloud,
    CellularCloudConnected,
    /// Backup session torn down, waiting for it to finish before retrying primary
    CellularWaitThenTryPrimary,
}

impl ArbiterState {
    /// Whether a cloud session is established in this state
    pub fn is_cloud_connected(self) -> bool {
        matches!(
            self,
            ArbiterState::PrimaryCloudConnected | ArbiterState::CellularCloudConnected
        )
    }

    /// Whether this state belongs to the backup branch
    pub fn is_backup_branch(self) -> bool {
        matches!(
            self,
            ArbiterState::TryCellular
                | ArbiterState::WaitCellularReady
                | ArbiterState::WaitCellularCloud
                | ArbiterState::CellularCloudConnected
                | ArbiterState::CellularWaitThenTryPrimary
        )
    }
}

impl fmt::Display for ArbiterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Events emitted by the arbiter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArbiterEvent {
    /// Start state finished probing the primary adapter
    Started { primary_present: bool },

    /// One state transition happened
    StateChanged {
        from: ArbiterState,
        to: ArbiterState,
    },

    /// The active interface changed
    InterfaceChanged {
        old: ActiveInterface,
        new: ActiveInterface,
    },

    /// A wait state gave up and moved on
    Timeout {
        state: ArbiterState,
        elapsed_ms: u32,
    },
}

/// Point-in-time view of the arbiter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbiterStatus {
    pub state: ArbiterState,
    pub active_interface: ActiveInterface,
    pub primary_present: bool,
    /// Milliseconds since the current timer was last reset
    pub time_in_state_ms: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cloud_connected_states() {
        assert!(ArbiterState::PrimaryCloudConnected.is_cloud_connected());
        assert!(ArbiterState::CellularCloudConnected.is_cloud_connected());
        assert!(!ArbiterState::WaitPrimaryCloud.is_cloud_connected());
        assert!(!ArbiterState::CellularWaitThenTryPrimary.is_cloud_connected());
    }

    #[test]
    fn test_backup_branch() {
        assert!(ArbiterState::TryCellular.is_backup_branch());
        assert!(ArbiterState::CellularWaitThenTryPrimary.is_backup_branch());
        assert!(!ArbiterState::Start.is_backup_branch());
        assert!(!ArbiterState::TryPrimary.is_backup_branch());
    }

    #[test]
    fn test_status_serialization() {
        let status = ArbiterStatus {
            state: ArbiterState::CellularCloudConnected,
            active_interface: ActiveInterface::Backup,
            primary_present: true,
            time_in_state_ms: 1200,
        };
        let json = serde_json::to_value(status).unwrap();
        assert_eq!(json["state"], "CellularCloudConnected");
        assert_eq!(json["active_interface"], "backup");
        assert_eq!(ArbiterState::WaitPrimaryReady.to_string(), "WaitPrimaryReady");
    }
}
