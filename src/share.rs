use crate::models::PlayerRecord;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SHARE_PREFIX: &str = "GFRJRF://";

/// Portable description of a player without its local id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedPlayer {
    pub nickname: String,
    #[serde(default)]
    pub kills: u64,
    #[serde(default)]
    pub deaths: u64,
    #[serde(default)]
    pub time: f64,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub exported: i64,
}

#[derive(Debug, Error)]
pub enum ShareCodeError {
    #[error("share code must start with GFRJRF://")]
    MissingPrefix,
    #[error("share code is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("share code payload is not valid: {0}")]
    Payload(#[from] serde_json::Error),
}

pub fn encode(player: &PlayerRecord, now: DateTime<Utc>) -> Result<String, serde_json::Error> {
    let shared = SharedPlayer {
        nickname: player.nickname.clone(),
        kills: player.kills,
        deaths: player.deaths,
        time: player.time,
        created: player.created_at.timestamp_millis(),
        exported: now.timestamp_millis(),
    };
    let json = serde_json::to_string(&shared)?;
    Ok(format!("{SHARE_PREFIX}{}", STANDARD.encode(json)))
}

pub fn decode(code: &str) -> Result<SharedPlayer, ShareCodeError> {
    let payload = code
        .trim()
        .strip_prefix(SHARE_PREFIX)
        .ok_or(ShareCodeError::MissingPrefix)?;
    let bytes = STANDARD.decode(payload.trim())?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RecordStore;
    use serde_json::json;

    #[test]
    fn code_carries_stats_but_not_id() {
        let mut store = RecordStore::default();
        let record = store
            .add("Ünïcode", &json!(12), &json!(4), &json!(3.25))
            .unwrap();
        let now = Utc::now();

        let code = encode(&record, now).unwrap();
        assert!(code.starts_with(SHARE_PREFIX));

        let shared = decode(&code).unwrap();
        assert_eq!(shared.nickname, "Ünïcode");
        assert_eq!((shared.kills, shared.deaths, shared.time), (12, 4, 3.25));
        assert_eq!(shared.created, record.created_at.timestamp_millis());
        assert_eq!(shared.exported, now.timestamp_millis());
    }

    #[test]
    fn rejects_foreign_codes() {
        assert!(matches!(decode("hello"), Err(ShareCodeError::MissingPrefix)));
        assert!(matches!(
            decode("GFRJRF://***"),
            Err(ShareCodeError::Encoding(_))
        ));
        let not_json = format!("{SHARE_PREFIX}{}", STANDARD.encode("[1,2]"));
        assert!(matches!(decode(&not_json), Err(ShareCodeError::Payload(_))));
    }
}
