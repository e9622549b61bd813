//! Built-in status indicator implementations

pub mod log;

pub use log::{LogIndicator, NullIndicator};
