use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const DEFAULT_BACKGROUND: &str =
    "https://i.postimg.cc/XJkg1VB3/a-gift-for-you-bocchi-the-rock-thumb.jpg";

pub const BACKGROUNDS: &[&str] = &[
    DEFAULT_BACKGROUND,
    "https://i.postimg.cc/pdNMQZt8/korus-beachside-cafe-thumb.jpg",
    "https://i.postimg.cc/YSV8Zp3m/field-of-daisies-thumb.jpg",
    "https://i.postimg.cc/dVVB07Ny/luffy-clouds-one-piece-thumb.jpg",
    "https://i.postimg.cc/g0fq4gzV/black-cat-sakura-thumb.jpg",
    "https://i.postimg.cc/Yqgg3str/fishing-adventure-time-thumb.jpg",
    "https://i.postimg.cc/ZKDjjtTv/mila-looking-at-you-miside-thumb.jpg",
    "https://i.postimg.cc/sXN1qc1m/gojo-cursed-technique-lapse-blue-jujutsu-kaisen-thumb.jpg",
    "https://i.postimg.cc/0jN5kJKQ/lofi-pink-town-thumb.jpg",
    "https://i.postimg.cc/mkcxp3FQ/abandoned-house-lake-thumb.jpg",
    "https://i.postimg.cc/zDWLyc7N/moonlight-drive-thumb.jpg",
];

pub const EXPORT_VERSION: &str = "2.0";

/// One tracked player. Timestamps keep millisecond precision so a record
/// survives a JSON round trip unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub id: u64,
    pub nickname: String,
    #[serde(default, deserialize_with = "count_from_value")]
    pub kills: u64,
    #[serde(default, deserialize_with = "count_from_value")]
    pub deaths: u64,
    #[serde(default, deserialize_with = "hours_from_value")]
    pub time: f64,
    #[serde(default)]
    pub screenshot: Option<String>,
    #[serde(with = "millis_or_rfc3339", alias = "created", default = "now_millis")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "millis_or_rfc3339", alias = "updated", default = "now_millis")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: u64,
    pub text: String,
    #[serde(with = "millis_or_rfc3339")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContainerSize {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub current_background: String,
    pub resize_mode: bool,
    pub container_sizes: BTreeMap<String, ContainerSize>,
    pub auto_fullscreen: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            current_background: DEFAULT_BACKGROUND.to_string(),
            resize_mode: false,
            container_sizes: BTreeMap::new(),
            auto_fullscreen: false,
        }
    }
}

/// Everything the persistence layer writes, detached from the live state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub players: Vec<PlayerRecord>,
    pub activity: Vec<ActivityEntry>,
    pub settings: Settings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub players: Vec<PlayerRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<Vec<ActivityEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default)]
    pub export_date: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewPlayerRequest {
    pub nickname: String,
    #[serde(default)]
    pub kills: Value,
    #[serde(default)]
    pub deaths: Value,
    #[serde(default)]
    pub time: Value,
    #[serde(default)]
    pub screenshot: Option<String>,
}

/// Partial update. Numeric fields go through the same coercion as creation;
/// `"screenshot": null` clears the screenshot, omitting it keeps it.
#[derive(Debug, Default, Deserialize)]
pub struct PlayerPatch {
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub kills: Option<Value>,
    #[serde(default)]
    pub deaths: Option<Value>,
    #[serde(default)]
    pub time: Option<Value>,
    #[serde(default, deserialize_with = "present_or_null")]
    pub screenshot: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
pub struct ShareCodeRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct BackgroundRequest {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub enabled: bool,
}

/// End of a drag on a resize handle: the size the box had when the drag
/// started and the pointer travel since then.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeRequest {
    pub start_width: f64,
    pub start_height: f64,
    #[serde(default)]
    pub delta_x: f64,
    #[serde(default)]
    pub delta_y: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleEvent {
    Hidden,
    Unload,
}

#[derive(Debug, Deserialize)]
pub struct LifecycleRequest {
    pub event: LifecycleEvent,
}

#[derive(Debug, Serialize)]
pub struct MutationResponse<T> {
    pub data: T,
    pub saved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub id: u64,
    pub nickname: String,
    pub kills: u64,
    pub deaths: u64,
    pub time: f64,
    pub kd: f64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct OverviewResponse {
    pub total_players: usize,
    pub total_kills: u64,
    pub total_deaths: u64,
    pub total_time: f64,
    pub overall_kd: f64,
}

#[derive(Debug, Serialize)]
pub struct ShareCodeResponse {
    pub code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveStatus {
    pub last_outcome: Option<String>,
    pub last_saved_at: Option<String>,
    pub notice: Option<String>,
}

pub fn now_millis() -> DateTime<Utc> {
    truncate_millis(Utc::now())
}

pub fn truncate_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}

/// Count coercion with `parseInt` rules: invalid or negative input is 0.
pub fn coerce_count(value: &Value) -> u64 {
    let parsed = match value {
        Value::Number(number) => number
            .as_u64()
            .map(|n| n as f64)
            .or_else(|| number.as_f64()),
        Value::String(text) => leading_number(text, false),
        _ => None,
    };
    match parsed {
        Some(n) if n.is_finite() && n > 0.0 => n.trunc() as u64,
        _ => 0,
    }
}

/// Hours coercion with `parseFloat` rules: invalid or negative input is 0.
pub fn coerce_hours(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => leading_number(text, true),
        _ => None,
    };
    match parsed {
        Some(n) if n.is_finite() && n > 0.0 => n,
        _ => 0.0,
    }
}

fn leading_number(text: &str, allow_fraction: bool) -> Option<f64> {
    let text = text.trim_start();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    for (index, ch) in text.char_indices() {
        match ch {
            '+' | '-' if index == 0 => {}
            '0'..='9' => seen_digit = true,
            '.' if allow_fraction && !seen_dot => seen_dot = true,
            _ => break,
        }
        end = index + ch.len_utf8();
    }
    if !seen_digit {
        return None;
    }
    text[..end].trim_end_matches('.').parse::<f64>().ok()
}

fn count_from_value<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(|value| coerce_count(&value))
}

fn hours_from_value<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(|value| coerce_hours(&value))
}

/// Written as Unix milliseconds; read from milliseconds, a numeric string or
/// an RFC 3339 string. `null` reads as now.
mod millis_or_rfc3339 {
    use super::now_millis;
    use chrono::{DateTime, Utc};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        chrono::serde::ts_milliseconds::serialize(at, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let millis = match Value::deserialize(deserializer)? {
            Value::Null => return Ok(now_millis()),
            Value::Number(number) => number
                .as_i64()
                .or_else(|| number.as_f64().map(|n| n.trunc() as i64)),
            Value::String(text) => match text.trim().parse::<i64>() {
                Ok(millis) => Some(millis),
                Err(_) => {
                    let parsed = DateTime::parse_from_rfc3339(text.trim())
                        .map_err(|err| D::Error::custom(format!("invalid timestamp {text:?}: {err}")))?;
                    return Ok(super::truncate_millis(parsed.with_timezone(&Utc)));
                }
            },
            other => return Err(D::Error::custom(format!("invalid timestamp: {other}"))),
        };
        millis
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .ok_or_else(|| D::Error::custom("timestamp out of range"))
    }
}

fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}
