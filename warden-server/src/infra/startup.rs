//! Background maintenance spawned once at startup, alongside the request
//! server itself.

use std::time::Duration;

use super::app_state::AppState;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Prunes the dev-OTP parking store of anything past its expiry so it
/// can't grow unbounded on a long-lived process.
pub fn spawn_dev_otp_cleanup(state: AppState) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            ticker.tick().await;
            state.mfa.cleanup_expired();
        }
    });
}
