use crate::config::Config;
use crate::kv::KeyValueStore;
use crate::models::{MutationResponse, SaveStatus};
use crate::persistence::{PersistenceGateway, SaveError, SaveOutcome};
use crate::render::HtmlRenderer;
use crate::tracker::Tracker;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

pub const FATAL_SAVE_NOTICE: &str =
    "Critical save error! Your data could not be stored. Please export it manually.";
pub const EMERGENCY_SAVE_NOTICE: &str =
    "Storage is failing; data was kept in an emergency copy only. Please export it.";

#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<Mutex<Tracker<HtmlRenderer>>>,
    pub gateway: Arc<PersistenceGateway>,
    pub status: Arc<Mutex<SaveStatus>>,
}

impl AppState {
    pub fn new(tracker: Tracker<HtmlRenderer>, gateway: PersistenceGateway) -> Self {
        Self {
            tracker: Arc::new(Mutex::new(tracker)),
            gateway: Arc::new(gateway),
            status: Arc::new(Mutex::new(SaveStatus {
                last_outcome: None,
                last_saved_at: None,
                notice: None,
            })),
        }
    }

    /// Loads whatever the storage still holds and wires up the tracker.
    pub async fn load(kv: Arc<dyn KeyValueStore>, config: &Config) -> Result<Self, SaveError> {
        let gateway = PersistenceGateway::new(kv, config.retry, config.max_backups);
        let report = gateway.load_all().await?;
        debug!(
            "load sources: activity={:?} settings={:?}",
            report.activity, report.settings
        );
        let mut tracker = Tracker::new(report.snapshot, HtmlRenderer::default());
        tracker.note("Application started");
        Ok(Self::new(tracker, gateway))
    }

    /// Snapshots under the lock, writes without it. Returns whether the data
    /// reached storage and the notice the user should see, if any.
    pub async fn save(&self) -> (bool, Option<String>) {
        let snapshot = self.tracker.lock().await.snapshot();
        let result = self.gateway.persist_all(&snapshot).await;

        let skipped = matches!(result, Ok(SaveOutcome::Skipped));
        let (saved, outcome, notice) = match result {
            Ok(SaveOutcome::Verified { attempts }) => {
                (true, format!("verified after {attempts} attempt(s)"), None)
            }
            Ok(SaveOutcome::Skipped) => (false, "skipped, save in progress".to_string(), None),
            Ok(SaveOutcome::EmergencyOnly) => (
                true,
                "emergency copy only".to_string(),
                Some(EMERGENCY_SAVE_NOTICE.to_string()),
            ),
            Err(err) => {
                error!("save failed: {err}");
                (false, err.to_string(), Some(FATAL_SAVE_NOTICE.to_string()))
            }
        };

        let mut status = self.status.lock().await;
        status.last_outcome = Some(outcome);
        if saved {
            status.last_saved_at = Some(Utc::now().to_rfc3339());
        }
        // a skipped save says nothing new about storage health
        if !skipped {
            status.notice = notice.clone();
        }
        (saved, notice)
    }

    pub async fn respond<T>(&self, data: T) -> MutationResponse<T> {
        let (saved, notice) = self.save().await;
        MutationResponse {
            data,
            saved,
            notice,
        }
    }

    /// Best-effort write with no verification, for unload and shutdown.
    pub async fn flush(&self) {
        let snapshot = self.tracker.lock().await.snapshot();
        match self.gateway.flush(&snapshot).await {
            Ok(()) => info!("flushed state to storage"),
            Err(err) => {
                warn!("final flush failed: {err}");
                self.status.lock().await.notice = Some(FATAL_SAVE_NOTICE.to_string());
            }
        }
    }

    pub async fn save_status(&self) -> SaveStatus {
        let mut status = self.status.lock().await.clone();
        if status.last_saved_at.is_none() {
            status.last_saved_at = self.gateway.last_saved_at().await;
        }
        status
    }
}
