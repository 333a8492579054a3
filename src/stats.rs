use crate::models::{LeaderboardEntry, OverviewResponse, PlayerRecord};
use crate::store::{kill_death_ratio, ratio};
use serde::Deserialize;
use std::cmp::Ordering;

pub const LEADERBOARD_SIZE: usize = 5;
pub const FEATURED_SIZE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    #[default]
    Name,
    Kills,
    Deaths,
    Time,
    Kd,
    Date,
}

impl SortMode {
    pub const ALL: [SortMode; 6] = [
        SortMode::Name,
        SortMode::Kills,
        SortMode::Deaths,
        SortMode::Time,
        SortMode::Kd,
        SortMode::Date,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SortMode::Name => "name",
            SortMode::Kills => "kills",
            SortMode::Deaths => "deaths",
            SortMode::Time => "time",
            SortMode::Kd => "kd",
            SortMode::Date => "date",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortMode::Name => "Name",
            SortMode::Kills => "Kills",
            SortMode::Deaths => "Deaths",
            SortMode::Time => "Time",
            SortMode::Kd => "K/D",
            SortMode::Date => "Newest",
        }
    }
}

/// Sorted view over the records. Name sorts ascending, everything else
/// descending; the sort is stable so ties keep insertion order.
pub fn sort_players(players: &[PlayerRecord], mode: SortMode) -> Vec<&PlayerRecord> {
    let mut sorted: Vec<&PlayerRecord> = players.iter().collect();
    sorted.sort_by(|a, b| compare(a, b, mode));
    sorted
}

fn compare(a: &PlayerRecord, b: &PlayerRecord, mode: SortMode) -> Ordering {
    match mode {
        SortMode::Name => a.nickname.to_lowercase().cmp(&b.nickname.to_lowercase()),
        SortMode::Kills => b.kills.cmp(&a.kills),
        SortMode::Deaths => b.deaths.cmp(&a.deaths),
        SortMode::Time => b.time.total_cmp(&a.time),
        SortMode::Kd => kill_death_ratio(b).total_cmp(&kill_death_ratio(a)),
        SortMode::Date => b.created_at.cmp(&a.created_at),
    }
}

pub fn leaderboard(players: &[PlayerRecord], mode: SortMode, limit: usize) -> Vec<LeaderboardEntry> {
    sort_players(players, mode)
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(index, player)| LeaderboardEntry {
            rank: index + 1,
            id: player.id,
            nickname: player.nickname.clone(),
            kills: player.kills,
            deaths: player.deaths,
            time: player.time,
            kd: kill_death_ratio(player),
        })
        .collect()
}

pub fn overview(players: &[PlayerRecord]) -> OverviewResponse {
    let total_kills = players.iter().fold(0u64, |sum, p| sum.saturating_add(p.kills));
    let total_deaths = players.iter().fold(0u64, |sum, p| sum.saturating_add(p.deaths));
    let total_time = players.iter().map(|p| p.time).sum();

    OverviewResponse {
        total_players: players.len(),
        total_kills,
        total_deaths,
        total_time,
        overall_kd: ratio(total_kills, total_deaths),
    }
}
