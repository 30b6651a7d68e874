//! Mock device implementations for testing and development.
//!
//! This module provides a simulated payment terminal driver that can be
//! scripted programmatically without a physical terminal.

pub mod terminal;

// Re-export commonly used types
pub use terminal::{InitResponse, MockTerminal, MockTerminalFactory, MockTerminalHandle};
