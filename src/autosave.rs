use crate::state::AppState;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

/// Saves on a fixed period. The first tick fires immediately and is skipped
/// since the state was just loaded.
pub fn spawn_autosave(state: AppState, every: Duration) -> JoinHandle<()> {
    info!("auto-save every {}s", every.as_secs());
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let (saved, _) = state.save().await;
            debug!(saved, "auto-save tick");
        }
    })
}

/// Resolves on Ctrl-C after writing one last unverified copy.
pub async fn shutdown_signal(state: AppState) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down, flushing state");
    state.flush().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::kv::{KeyValueStore, MemoryStore};
    use crate::models::NewPlayerRequest;
    use crate::persistence::{Entity, RetryPolicy};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn autosave_writes_pending_changes() {
        let kv = Arc::new(MemoryStore::new());
        let config = Config {
            retry: RetryPolicy::immediate(1),
            ..Config::default()
        };
        let state = AppState::load(kv.clone(), &config).await.unwrap();
        state
            .tracker
            .lock()
            .await
            .add_player(NewPlayerRequest {
                nickname: "Alice".to_string(),
                kills: json!(3),
                deaths: json!(1),
                time: json!(1),
                screenshot: None,
            })
            .unwrap();
        assert!(kv.get(&Entity::Players.primary_key()).unwrap().is_none());

        let handle = spawn_autosave(state.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.abort();

        let stored = kv.get(&Entity::Players.primary_key()).unwrap().unwrap();
        assert!(stored.contains("Alice"));
        assert!(state.save_status().await.last_saved_at.is_some());
    }
}
