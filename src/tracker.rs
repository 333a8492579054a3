use crate::activity::ActivityLog;
use crate::models::{
    ContainerSize, EXPORT_VERSION, ExportDocument, NewPlayerRequest, PlayerPatch, PlayerRecord,
    ResizeRequest, Settings, Snapshot, now_millis,
};
use crate::render::{Renderer, View};
use crate::settings::{SettingsError, is_known_background};
use crate::share::{self, ShareCodeError};
use crate::store::{RecordStore, StoreError};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("import file is not a valid export: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("import rejected: {0}")]
    Invalid(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ShareError {
    #[error(transparent)]
    Code(#[from] ShareCodeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to encode share code: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Live application state: records, activity and settings, plus the
/// renderer that mirrors them. Every mutation refreshes the renderer;
/// persisting is left to the caller, which snapshots and writes outside
/// the state lock.
pub struct Tracker<R> {
    store: RecordStore,
    activity: ActivityLog,
    settings: Settings,
    renderer: R,
}

impl<R: Renderer> Tracker<R> {
    pub fn new(snapshot: Snapshot, renderer: R) -> Self {
        let mut tracker = Self {
            store: RecordStore::new(snapshot.players),
            activity: ActivityLog::new(snapshot.activity),
            settings: snapshot.settings,
            renderer,
        };
        tracker.refresh();
        tracker
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            players: self.store.records().to_vec(),
            activity: self.activity.entries().to_vec(),
            settings: self.settings.clone(),
        }
    }

    pub fn view(&self) -> View<'_> {
        View {
            players: self.store.records(),
            activity: self.activity.entries(),
            settings: &self.settings,
            now: Utc::now(),
        }
    }

    pub fn refresh(&mut self) {
        let view = View {
            players: self.store.records(),
            activity: self.activity.entries(),
            settings: &self.settings,
            now: Utc::now(),
        };
        self.renderer.render(&view);
    }

    pub fn note(&mut self, text: impl Into<String>) {
        self.activity.record(text);
        self.refresh();
    }

    pub fn add_player(&mut self, request: NewPlayerRequest) -> Result<PlayerRecord, StoreError> {
        let mut record =
            self.store
                .add(&request.nickname, &request.kills, &request.deaths, &request.time)?;
        if request.screenshot.is_some() {
            let patch = PlayerPatch {
                screenshot: Some(request.screenshot),
                ..PlayerPatch::default()
            };
            record = self.store.update_at(record.id, patch, record.created_at)?;
        }

        info!(id = record.id, "added player {}", record.nickname);
        self.activity.record(format!(
            "Added player {} ({} kills, {} deaths)",
            record.nickname, record.kills, record.deaths
        ));
        self.refresh();
        Ok(record)
    }

    pub fn update_player(&mut self, id: u64, patch: PlayerPatch) -> Result<PlayerRecord, StoreError> {
        let previous = self
            .store
            .get(id)
            .map(|record| record.nickname.clone())
            .ok_or(StoreError::NotFound(id))?;
        let record = self.store.update(id, patch)?;

        if previous != record.nickname {
            self.activity
                .record(format!("Renamed {previous} to {}", record.nickname));
        } else {
            self.activity.record(format!(
                "Updated {} ({} kills, {} deaths)",
                record.nickname, record.kills, record.deaths
            ));
        }
        self.refresh();
        Ok(record)
    }

    pub fn remove_player(&mut self, id: u64) -> Result<PlayerRecord, StoreError> {
        let record = self.store.remove(id)?;
        info!(id, "removed player {}", record.nickname);
        self.activity
            .record(format!("Removed player {}", record.nickname));
        self.refresh();
        Ok(record)
    }

    /// Clear-all: every record, the activity log and the settings go back
    /// to their defaults.
    pub fn clear_all(&mut self) -> usize {
        let removed = self.store.clear();
        self.settings = Settings::default();
        self.activity.replace(Vec::new());
        self.activity.record("All data cleared");
        warn!(removed, "cleared all data");
        self.refresh();
        removed
    }

    pub fn set_background(&mut self, url: &str) -> Result<(), SettingsError> {
        self.settings.set_background(url)?;
        self.activity.record("Background changed");
        self.refresh();
        Ok(())
    }

    pub fn set_resize_mode(&mut self, enabled: bool) {
        self.settings.resize_mode = enabled;
        self.refresh();
    }

    pub fn set_auto_fullscreen(&mut self, enabled: bool) {
        self.settings.auto_fullscreen = enabled;
        self.refresh();
    }

    pub fn resize_container(
        &mut self,
        container_id: &str,
        drag: &ResizeRequest,
    ) -> Result<ContainerSize, SettingsError> {
        let size = self.settings.apply_resize(container_id, drag)?;
        self.refresh();
        Ok(size)
    }

    pub fn reset_layout(&mut self) {
        self.settings.reset_container_sizes();
        self.activity.record("Panel sizes reset");
        self.refresh();
    }

    pub fn export(&self) -> ExportDocument {
        self.export_at(Utc::now())
    }

    pub fn export_at(&self, now: DateTime<Utc>) -> ExportDocument {
        ExportDocument {
            players: self.store.records().to_vec(),
            activity: Some(self.activity.entries().to_vec()),
            background: Some(self.settings.current_background.clone()),
            export_date: Some(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
            version: Some(EXPORT_VERSION.to_string()),
        }
    }

    pub fn import_json(&mut self, text: &str) -> Result<usize, ImportError> {
        let document: ExportDocument = serde_json::from_str(text)?;
        self.import(document)
    }

    /// Replaces the records (and the log/background when present). Applies
    /// nothing if the record set is invalid.
    pub fn import(&mut self, document: ExportDocument) -> Result<usize, ImportError> {
        let count = self.store.replace_all(document.players)?;

        if let Some(activity) = document.activity {
            self.activity.replace(activity);
        }
        match document.background {
            Some(url) if is_known_background(&url) => self.settings.current_background = url,
            Some(url) => warn!("ignoring unknown background in import: {url}"),
            None => {}
        }

        info!(count, "imported players");
        self.activity.record(format!("Imported {count} players"));
        self.refresh();
        Ok(count)
    }

    pub fn share_code(&self, id: u64) -> Result<String, ShareError> {
        let record = self.store.get(id).ok_or(StoreError::NotFound(id))?;
        Ok(share::encode(record, now_millis())?)
    }

    pub fn add_from_share_code(&mut self, code: &str) -> Result<PlayerRecord, ShareError> {
        let shared = share::decode(code)?;
        let record = self.add_player(NewPlayerRequest {
            nickname: shared.nickname,
            kills: json!(shared.kills),
            deaths: json!(shared.deaths),
            time: json!(shared.time),
            screenshot: None,
        })?;
        Ok(record)
    }
}
