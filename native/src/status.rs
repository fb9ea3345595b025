// Human-readable status strings shown by the host.

use crate::device::ConnectionState;

pub fn device_details(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Connecting => "Connecting...",
        ConnectionState::Connected => "Connected",
        ConnectionState::Uninitialized => "Not initialized",
    }
}

/// Last update latency, or an empty string while not connected.
pub fn update_performance(state: ConnectionState, latency_ms: u64) -> String {
    if state == ConnectionState::Connected {
        format!("{} ms", latency_ms)
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_details_per_state() {
        assert_eq!(device_details(ConnectionState::Uninitialized), "Not initialized");
        assert_eq!(device_details(ConnectionState::Connecting), "Connecting...");
        assert_eq!(device_details(ConnectionState::Connected), "Connected");
    }

    #[test]
    fn test_performance_only_when_connected() {
        assert_eq!(update_performance(ConnectionState::Connected, 3), "3 ms");
        assert_eq!(update_performance(ConnectionState::Connecting, 3), "");
        assert_eq!(update_performance(ConnectionState::Uninitialized, 0), "");
    }
}
