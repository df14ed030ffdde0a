// SwapGate: Background watchdog
//
// Periodic housekeeping:
// - purges OAuth `state` values that were never redeemed
// - drops rate-limit counters whose window closed long ago
// - logs in-flight call count for external monitoring

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::ids::now_millis;
use crate::state::AppState;

const CHECK_INTERVAL: Duration = Duration::from_secs(60);

pub fn spawn(state: AppState, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("watchdog: started (interval={}s)", CHECK_INTERVAL.as_secs());

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("watchdog: stopped");
                    break;
                }
                _ = tokio::time::sleep(CHECK_INTERVAL) => {}
            }
            run_once(&state);
        }
    })
}

/// One housekeeping pass. Returns `(expired states, idle counters)` removed.
pub fn run_once(state: &AppState) -> (usize, usize) {
    let states = state.oauth_states.purge_expired();
    let counters = state.services.prune_idle_counters(now_millis());
    let in_flight = state.services.in_flight_count();

    if states > 0 || counters > 0 {
        tracing::info!(
            "watchdog: purged {} expired oauth state(s), {} idle rate-limit counter(s)",
            states,
            counters
        );
    } else {
        tracing::debug!("watchdog: nothing to purge (in_flight={})", in_flight);
    }
    (states, counters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn run_once_purges_expired_states() {
        let mut config = AppConfig::default();
        config.oauth.state_ttl = Duration::ZERO;
        let state = AppState::bare(config);
        state.oauth_states.issue("oauth_swap_1_abc", "swap", "http://cb");
        std::thread::sleep(Duration::from_millis(5));

        let (states, counters) = run_once(&state);
        assert_eq!(states, 1);
        assert_eq!(counters, 0);
        assert!(state.oauth_states.is_empty());
    }
}
