// # Log Status Indicator
//
// Status indicators for hosts without an RGB LED.
//
// ## Purpose
//
// `LogIndicator` records the color the device would be showing and reports
// every change through `tracing`, which is what a headless gateway or a
// container wants. `NullIndicator` drops everything.

use tracing::info;

use crate::color::StatusColor;
use crate::traits::StatusIndicator;

/// Indicator that logs color changes
#[derive(Debug, Clone, Default)]
pub struct LogIndicator {
    current: Option<StatusColor>,
}

impl LogIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The override in effect, `None` when showing default colors
    pub fn current_override(&self) -> Option<StatusColor> {
        self.current
    }
}

impl StatusIndicator for LogIndicator {
    fn apply_backup_color(&mut self, color: StatusColor) {
        if self.current != Some(color) {
            info!("Status indicator: cloud signals now {}", color);
        }
        self.current = Some(color);
    }

    fn restore_default(&mut self) {
        if self.current.take().is_some() {
            info!("Status indicator: default colors restored");
        }
    }
}

/// Indicator that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NullIndicator;

impl StatusIndicator for NullIndicator {
    fn apply_backup_color(&mut self, _color: StatusColor) {}

    fn restore_default(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_indicator_tracks_override() {
        let mut indicator = LogIndicator::new();
        assert_eq!(indicator.current_override(), None);

        indicator.apply_backup_color(StatusColor::YELLOW);
        assert_eq!(indicator.current_override(), Some(StatusColor::YELLOW));

        indicator.restore_default();
        assert_eq!(indicator.current_override(), None);

        // idempotent
        indicator.restore_default();
        assert_eq!(indicator.current_override(), None);
    }
}
