//! The poll loop: one scoped refresh per tick, forever.
//!
//! The cadence clock starts when a refresh completes, not when it starts:
//! a slow backend gets breathing room instead of a pileup of overlapping
//! fetches, at the cost of a slightly stretched effective period. Transient
//! failures skip the pass and retry next tick; nothing here is fatal.

use crate::app::{App, RefreshOutcome};
use crate::config::ClientConfig;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Run the polling loop until the task is cancelled.
pub async fn run_poller(app: Arc<App>, config: ClientConfig) {
    info!(
        "poller started (interval={:?}, base_url={})",
        config.poll_interval,
        app.client.base_url()
    );

    let mut interval = tokio::time::interval(config.poll_interval);
    // Each tick awaits the full refresh; never burst to catch up.
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        match app.refresh_active().await {
            Ok(RefreshOutcome::Applied) => {}
            Ok(RefreshOutcome::Discarded) => {
                debug!("tick payload discarded (view changed mid-flight)");
            }
            Err(err) => App::note_refresh_error(&err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_poller_survives_unreachable_backend() {
        // Nothing listens on this port; every tick must fail transiently
        // and the loop must keep running rather than exit.
        let config = ClientConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            poll_interval: Duration::from_millis(10),
            request_timeout: Duration::from_millis(50),
            ..ClientConfig::default()
        };
        let app = App::new(&config);

        let result = timeout(Duration::from_millis(200), run_poller(app, config)).await;
        assert!(result.is_err(), "poller must not terminate on its own");
    }
}
