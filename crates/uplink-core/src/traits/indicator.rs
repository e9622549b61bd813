//! Status indicator trait

use crate::color::StatusColor;

/// Visual status output (typically an RGB LED)
///
/// Only the "cloud connecting / connected" signals are overridden; every
/// other indication stays under platform control.
pub trait StatusIndicator: Send {
    /// Show `color` for the cloud connecting and connected signals
    fn apply_backup_color(&mut self, color: StatusColor);

    /// Return to the platform's default colors
    fn restore_default(&mut self);
}
