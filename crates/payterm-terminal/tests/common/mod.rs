//! Shared helpers for terminal integration tests.

#![allow(dead_code)]

use std::time::Duration;

use payterm_core::TerminalSettings;
use payterm_device::mock::{MockTerminalFactory, MockTerminalHandle};
use payterm_terminal::{TerminalManager, TerminalState};

pub const TEST_ADDRESS: &str = "192.168.1.50";

/// Settings with short wait bounds so timeouts resolve quickly.
pub fn fast_settings(primary_ms: u64, fallback_ms: u64) -> TerminalSettings {
    TerminalSettings::default()
        .with_device_address(TEST_ADDRESS)
        .with_timeouts(
            Duration::from_millis(primary_ms),
            Duration::from_millis(fallback_ms),
            Duration::from_millis(primary_ms),
        )
}

pub fn manager_with(
    settings: TerminalSettings,
) -> (TerminalManager<MockTerminalFactory>, MockTerminalHandle) {
    let (factory, handle) = MockTerminalFactory::new();
    (TerminalManager::new(factory, settings), handle)
}

/// Manager whose initialization succeeded on the first strategy.
pub async fn ready_manager() -> (TerminalManager<MockTerminalFactory>, MockTerminalHandle) {
    let (manager, handle) = manager_with(fast_settings(500, 500));
    let state = manager.initialize_terminal().wait().await;
    assert_eq!(state, TerminalState::Ready);
    (manager, handle)
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
