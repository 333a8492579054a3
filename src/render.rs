use crate::activity::{FEED_SIZE, time_ago};
use crate::models::{ActivityEntry, BACKGROUNDS, PlayerRecord, Settings};
use crate::stats::{self, FEATURED_SIZE, LEADERBOARD_SIZE, SortMode};
use crate::store::{kill_death_ratio, kills_per_hour};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RenderTarget {
    PlayerGrid,
    Leaderboard,
    FeaturedPlayers,
    ActivityFeed,
    BackgroundPicker,
    Overview,
}

impl RenderTarget {
    pub const ALL: [RenderTarget; 6] = [
        RenderTarget::PlayerGrid,
        RenderTarget::Leaderboard,
        RenderTarget::FeaturedPlayers,
        RenderTarget::ActivityFeed,
        RenderTarget::BackgroundPicker,
        RenderTarget::Overview,
    ];

    pub fn id(self) -> &'static str {
        match self {
            RenderTarget::PlayerGrid => "player-grid",
            RenderTarget::Leaderboard => "leaderboard",
            RenderTarget::FeaturedPlayers => "featured-players",
            RenderTarget::ActivityFeed => "activity-feed",
            RenderTarget::BackgroundPicker => "background-picker",
            RenderTarget::Overview => "overview",
        }
    }
}

/// Read-only state handed to a renderer.
#[derive(Debug, Clone, Copy)]
pub struct View<'a> {
    pub players: &'a [PlayerRecord],
    pub activity: &'a [ActivityEntry],
    pub settings: &'a Settings,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    pub player_sort: SortMode,
    pub board_sort: SortMode,
    pub board_size: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            player_sort: SortMode::Name,
            board_sort: SortMode::Kd,
            board_size: LEADERBOARD_SIZE,
        }
    }
}

/// Output capability the tracker refreshes after every mutation.
pub trait Renderer: Send {
    fn render(&mut self, view: &View<'_>);
}

/// Keeps the latest markup for each mounted target.
#[derive(Debug)]
pub struct HtmlRenderer {
    mounted: BTreeSet<RenderTarget>,
    options: RenderOptions,
    fragments: BTreeMap<RenderTarget, String>,
}

impl Default for HtmlRenderer {
    fn default() -> Self {
        Self::with_targets(&RenderTarget::ALL)
    }
}

impl HtmlRenderer {
    pub fn with_targets(targets: &[RenderTarget]) -> Self {
        Self {
            mounted: targets.iter().copied().collect(),
            options: RenderOptions::default(),
            fragments: BTreeMap::new(),
        }
    }

    pub fn options(&self) -> RenderOptions {
        self.options
    }

    pub fn fragment(&self, target: RenderTarget) -> Option<&str> {
        self.fragments.get(&target).map(String::as_str)
    }
}

impl Renderer for HtmlRenderer {
    fn render(&mut self, view: &View<'_>) {
        for target in RenderTarget::ALL {
            if !self.mounted.contains(&target) {
                warn!("render target #{} is not mounted, skipping", target.id());
                continue;
            }
            let html = render_target(target, view, &self.options);
            self.fragments.insert(target, html);
        }
    }
}

pub fn render_target(target: RenderTarget, view: &View<'_>, options: &RenderOptions) -> String {
    match target {
        RenderTarget::PlayerGrid => render_player_grid(view, options.player_sort),
        RenderTarget::Leaderboard => {
            render_leaderboard(view.players, options.board_sort, options.board_size)
        }
        RenderTarget::FeaturedPlayers => render_featured(view.players, options.board_sort),
        RenderTarget::ActivityFeed => render_activity_feed(view.activity, view.now),
        RenderTarget::BackgroundPicker => render_background_picker(view.settings),
        RenderTarget::Overview => render_overview(view.players),
    }
}

pub fn render_player_grid(view: &View<'_>, sort: SortMode) -> String {
    if view.players.is_empty() {
        return concat!(
            r#"<div class="empty-state"><h2>No players yet</h2>"#,
            r#"<p>Add a player to get started</p>"#,
            r#"<button class="glass-button primary" data-action="open-player-form">Add first player</button></div>"#
        )
        .to_string();
    }

    let mut html = String::new();
    for (index, player) in stats::sort_players(view.players, sort).into_iter().enumerate() {
        let top = if index < FEATURED_SIZE { " top-player" } else { "" };
        let _ = write!(
            html,
            r#"<div class="player-card glass-card{top}" data-id="{id}" data-container="player-{id}">
  <div class="player-card-header">
    <div class="player-avatar">{initial}</div>
    <div class="player-info">
      <div class="player-name">{name}</div>
      <div class="player-date">Added {added}</div>
    </div>
    <div class="player-actions">
      <button class="action-btn share" data-action="share" data-id="{id}" title="Share">share</button>
      <button class="action-btn edit" data-action="edit" data-id="{id}" title="Edit">edit</button>
      <button class="action-btn delete" data-action="delete" data-id="{id}" data-name="{name}" title="Delete">delete</button>
    </div>
  </div>
  <div class="player-stats">
    <div class="stat-item"><div class="stat-value">{kills}</div><div class="stat-label">Kills</div></div>
    <div class="stat-item"><div class="stat-value">{deaths}</div><div class="stat-label">Deaths</div></div>
    <div class="stat-item"><div class="stat-value">{time}h</div><div class="stat-label">Time</div></div>
    <div class="stat-item"><div class="stat-value">{kph:.1}</div><div class="stat-label">Kills/h</div></div>
  </div>
  <div class="player-kd"><div class="kd-value">{kd:.2}</div><div class="kd-label">K/D ratio</div></div>{screenshot}
</div>
"#,
            id = player.id,
            initial = escape_html(&initial(&player.nickname)),
            name = escape_html(&player.nickname),
            added = player.created_at.format("%Y-%m-%d"),
            kills = player.kills,
            deaths = player.deaths,
            time = player.time,
            kph = kills_per_hour(player),
            kd = kill_death_ratio(player),
            screenshot = render_screenshot(player),
        );
    }
    html
}

/// Only inline image data is shown; anything else stored as a screenshot
/// is left out of the page.
fn render_screenshot(player: &PlayerRecord) -> String {
    match player.screenshot.as_deref() {
        Some(src) if src.starts_with("data:image/") => format!(
            r#"
  <div class="player-screenshot"><img src="{src}" alt="Screenshot of {name}" loading="lazy"></div>"#,
            src = escape_html(src),
            name = escape_html(&player.nickname),
        ),
        _ => String::new(),
    }
}

pub fn render_leaderboard(players: &[PlayerRecord], sort: SortMode, size: usize) -> String {
    if players.is_empty() {
        return r#"<div class="empty-state"><p>No players yet</p></div>"#.to_string();
    }

    let mut html = String::new();
    for entry in stats::leaderboard(players, sort, size) {
        let _ = write!(
            html,
            r#"<div class="top-item"><div class="top-rank rank-{rank}">{rank}</div><div class="top-info"><div class="top-name">{name}</div><div class="top-stats">K/D: <span class="top-value">{kd:.2}</span> | Kills: <span class="top-value">{kills}</span></div></div></div>
"#,
            rank = entry.rank,
            name = escape_html(&entry.nickname),
            kd = entry.kd,
            kills = entry.kills,
        );
    }
    html
}

pub fn render_featured(players: &[PlayerRecord], sort: SortMode) -> String {
    let mut html = String::new();
    for player in stats::sort_players(players, sort).into_iter().take(FEATURED_SIZE) {
        let _ = write!(
            html,
            r#"<div class="featured-card glass-card"><div class="featured-avatar">{initial}</div><h3>{name}</h3><div class="featured-stats"><span>K/D {kd:.2}</span><span>{kills} kills</span><span>{deaths} deaths</span><span>{time}h</span></div></div>
"#,
            initial = escape_html(&initial(&player.nickname)),
            name = escape_html(&player.nickname),
            kd = kill_death_ratio(player),
            kills = player.kills,
            deaths = player.deaths,
            time = player.time,
        );
    }
    html
}

pub fn render_activity_feed(activity: &[ActivityEntry], now: DateTime<Utc>) -> String {
    if activity.is_empty() {
        return r#"<div class="activity-item empty">No recent activity</div>"#.to_string();
    }

    let mut html = String::new();
    for entry in activity.iter().take(FEED_SIZE) {
        let _ = write!(
            html,
            r#"<div class="activity-item"><span class="activity-text">{text}</span><span class="activity-time">{ago}</span></div>
"#,
            text = escape_html(&entry.text),
            ago = time_ago(entry.timestamp, now),
        );
    }
    html
}

pub fn render_background_picker(settings: &Settings) -> String {
    let mut html = String::new();
    for url in BACKGROUNDS {
        let active = if *url == settings.current_background { " active" } else { "" };
        let _ = write!(
            html,
            r#"<button class="background-option{active}" data-action="background" data-url="{url}" style="background-image:url('{url}')"></button>
"#,
            url = escape_html(url),
        );
    }
    html
}

pub fn render_overview(players: &[PlayerRecord]) -> String {
    let totals = stats::overview(players);
    format!(
        r#"<div class="overview-item"><span id="total-players">{}</span> players</div><div class="overview-item"><span id="total-kills">{}</span> kills</div><div class="overview-item"><span id="total-deaths">{}</span> deaths</div><div class="overview-item"><span id="total-time">{:.1}</span> hours</div><div class="overview-item"><span id="overall-kd">{:.2}</span> K/D</div>"#,
        totals.total_players,
        totals.total_kills,
        totals.total_deaths,
        totals.total_time,
        totals.overall_kd,
    )
}

fn initial(nickname: &str) -> String {
    nickname
        .chars()
        .next()
        .map(|ch| ch.to_uppercase().collect())
        .unwrap_or_default()
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
