//! Background expiry of overdue checkout sessions and stale portal tokens

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::state::AppState;

/// Sweep every `period` until the task is aborted
pub fn spawn_expiry_sweeper(state: &AppState, period: Duration) -> JoinHandle<()> {
    let checkout = state.checkout.clone();
    let tokens = state.tokens.clone();

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if let Err(e) = checkout.expire_overdue().await {
                tracing::error!("Expiry sweep failed: {}", e);
            }
            if let Err(e) = tokens.prune_expired().await {
                tracing::error!("Portal session prune failed: {}", e);
            }
        }
    })
}
