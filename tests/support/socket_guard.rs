//! Skips mock-server tests on hosts that forbid loopback sockets.

use std::net::TcpListener;
use std::panic::Location;

use wiremock::MockServer;

/// Set to `1`, `true` or `yes` to turn a skipped mock-server test into a failure.
const STRICT_ENV_VAR: &str = "WEB_SCRAPER_REQUIRE_SOCKET_TESTS";

fn strict_mode() -> bool {
    std::env::var(STRICT_ENV_VAR).is_ok_and(|value| {
        ["1", "true", "yes"]
            .iter()
            .any(|accepted| value.eq_ignore_ascii_case(accepted))
    })
}

fn loopback_available() -> bool {
    TcpListener::bind(("127.0.0.1", 0)).is_ok()
}

/// Starts a mock server, or returns `None` when loopback is unavailable.
///
/// Panics instead of skipping when the strict variable is set.
#[track_caller]
pub fn start_mock_server_or_skip() -> impl std::future::Future<Output = Option<MockServer>> {
    let caller = Location::caller();
    let available = loopback_available();
    if !available {
        let reason = format!(
            "loopback bind refused; mock server unavailable for test at {}:{}",
            caller.file(),
            caller.line()
        );
        assert!(
            !strict_mode(),
            "{reason} ({STRICT_ENV_VAR} is set, so this counts as a failure)"
        );
        eprintln!("skipped: {reason} (set {STRICT_ENV_VAR}=1 to fail instead)");
    }
    async move {
        if available {
            Some(MockServer::start().await)
        } else {
            None
        }
    }
}
