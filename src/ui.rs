use crate::render::{HtmlRenderer, RenderTarget, escape_html, render_player_grid};
use crate::stats::SortMode;
use crate::tracker::Tracker;
use std::fmt::Write;

/// Full page: the renderer's current fragments, the requested grid sort and
/// the persisted settings the script needs on load.
pub fn render_index(tracker: &Tracker<HtmlRenderer>, sort: SortMode, notice: Option<&str>) -> String {
    let renderer = tracker.renderer();
    let fragment = |target| renderer.fragment(target).unwrap_or_default().to_string();

    let grid = if sort == renderer.options().player_sort {
        fragment(RenderTarget::PlayerGrid)
    } else {
        render_player_grid(&tracker.view(), sort)
    };

    let mut sort_buttons = String::new();
    for mode in SortMode::ALL {
        let active = if mode == sort { " active" } else { "" };
        let _ = write!(
            sort_buttons,
            r#"<button class="sort-btn{active}" data-sort="{}">{}</button>"#,
            mode.as_str(),
            mode.label()
        );
    }

    let mut board_buttons = String::new();
    for mode in [SortMode::Kd, SortMode::Kills, SortMode::Time] {
        let active = if mode == renderer.options().board_sort { " active" } else { "" };
        let _ = write!(
            board_buttons,
            r#"<button class="board-btn{active}" data-board="{}">{}</button>"#,
            mode.as_str(),
            mode.label()
        );
    }

    let settings = tracker.settings();
    // `<` would let a container id close the script element
    let settings_json = serde_json::to_string(settings)
        .unwrap_or_else(|_| "{}".to_string())
        .replace('<', "\\u003c");
    let notice_html = notice
        .map(|text| format!(r#"<div id="save-notice" class="notice">{}</div>"#, escape_html(text)))
        .unwrap_or_else(|| r#"<div id="save-notice" class="notice hidden"></div>"#.to_string());

    INDEX_HTML
        .replace("{{BACKGROUND}}", &escape_html(&settings.current_background))
        .replace("{{NOTICE}}", &notice_html)
        .replace("{{SORT_BUTTONS}}", &sort_buttons)
        .replace("{{BOARD_BUTTONS}}", &board_buttons)
        .replace("{{CURRENT_SORT}}", sort.as_str())
        .replace("{{OVERVIEW}}", &fragment(RenderTarget::Overview))
        .replace("{{FEATURED}}", &fragment(RenderTarget::FeaturedPlayers))
        .replace("{{LEADERBOARD}}", &fragment(RenderTarget::Leaderboard))
        .replace("{{ACTIVITY}}", &fragment(RenderTarget::ActivityFeed))
        .replace("{{BACKGROUNDS}}", &fragment(RenderTarget::BackgroundPicker))
        .replace("{{PLAYER_GRID}}", &grid)
        .replace("{{SETTINGS_JSON}}", &settings_json)
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>Stats Tracker</title>
  <style>
    :root {
      --glass: rgba(255, 255, 255, 0.12);
      --glass-border: rgba(255, 255, 255, 0.25);
      --ink: #f5f7fa;
      --muted: rgba(245, 247, 250, 0.7);
      --accent: #7c5cff;
      --danger: #ff5c7a;
      --shadow: 0 24px 60px rgba(0, 0, 0, 0.35);
    }

    * {
      box-sizing: border-box;
    }

    body {
      margin: 0;
      min-height: 100vh;
      color: var(--ink);
      font-family: "Segoe UI", "Trebuchet MS", sans-serif;
      background: #111 center / cover fixed no-repeat;
      background-image: url('{{BACKGROUND}}');
    }

    .app {
      width: min(1200px, 100%);
      margin: 0 auto;
      padding: 28px 18px 48px;
      display: grid;
      gap: 22px;
    }

    .glass-card, .panel {
      background: var(--glass);
      border: 1px solid var(--glass-border);
      border-radius: 20px;
      backdrop-filter: blur(14px);
      box-shadow: var(--shadow);
      padding: 18px;
      position: relative;
      overflow: auto;
    }

    header {
      display: flex;
      flex-wrap: wrap;
      gap: 12px;
      justify-content: space-between;
      align-items: center;
    }

    h1, h2, h3 {
      margin: 0 0 10px;
    }

    .toolbar, .sort-bar, .board-bar {
      display: flex;
      flex-wrap: wrap;
      gap: 8px;
    }

    button, .glass-button {
      border: 1px solid var(--glass-border);
      background: var(--glass);
      color: var(--ink);
      border-radius: 12px;
      padding: 8px 14px;
      cursor: pointer;
      font: inherit;
    }

    button.primary, button.active {
      background: var(--accent);
      border-color: var(--accent);
    }

    button.danger {
      background: var(--danger);
      border-color: var(--danger);
    }

    .layout {
      display: grid;
      grid-template-columns: 2fr 1fr;
      gap: 22px;
    }

    .player-grid {
      display: grid;
      grid-template-columns: repeat(auto-fill, minmax(260px, 1fr));
      gap: 16px;
    }

    .player-card-header {
      display: flex;
      gap: 10px;
      align-items: center;
    }

    .player-screenshot img, #screenshot-preview {
      width: 100%;
      max-height: 160px;
      object-fit: cover;
      border-radius: 8px;
      margin-top: 10px;
    }

    .player-avatar, .featured-avatar {
      width: 42px;
      height: 42px;
      border-radius: 50%;
      display: grid;
      place-items: center;
      background: var(--accent);
      font-weight: 700;
    }

    .player-info {
      flex: 1;
    }

    .player-date, .stat-label, .kd-label, .activity-time, .top-stats {
      color: var(--muted);
      font-size: 0.85rem;
    }

    .action-btn {
      padding: 4px 8px;
      font-size: 0.8rem;
    }

    .player-stats {
      display: grid;
      grid-template-columns: repeat(4, 1fr);
      gap: 8px;
      margin: 12px 0;
      text-align: center;
    }

    .stat-value, .kd-value {
      font-size: 1.3rem;
      font-weight: 700;
    }

    .top-player {
      border-color: gold;
    }

    .featured {
      display: grid;
      grid-template-columns: repeat(auto-fit, minmax(200px, 1fr));
      gap: 16px;
    }

    .featured-stats {
      display: flex;
      flex-wrap: wrap;
      gap: 10px;
      color: var(--muted);
    }

    .top-item, .activity-item {
      display: flex;
      gap: 12px;
      align-items: center;
      justify-content: space-between;
      padding: 8px 0;
      border-bottom: 1px solid var(--glass-border);
    }

    .top-rank {
      width: 30px;
      height: 30px;
      border-radius: 50%;
      display: grid;
      place-items: center;
      background: var(--glass);
    }

    .rank-1 { background: gold; color: #222; }
    .rank-2 { background: silver; color: #222; }
    .rank-3 { background: #cd7f32; color: #222; }

    .overview {
      display: flex;
      flex-wrap: wrap;
      gap: 18px;
      font-size: 1.05rem;
    }

    .background-picker {
      display: grid;
      grid-template-columns: repeat(auto-fill, minmax(64px, 1fr));
      gap: 8px;
    }

    .background-option {
      height: 48px;
      background-size: cover;
      background-position: center;
    }

    .background-option.active {
      outline: 3px solid var(--accent);
    }

    form {
      display: grid;
      grid-template-columns: repeat(auto-fit, minmax(140px, 1fr));
      gap: 10px;
    }

    input {
      border-radius: 10px;
      border: 1px solid var(--glass-border);
      background: rgba(0, 0, 0, 0.25);
      color: var(--ink);
      padding: 8px 10px;
      font: inherit;
    }

    .notice {
      background: var(--danger);
      border-radius: 12px;
      padding: 12px 16px;
      font-weight: 600;
    }

    .hidden {
      display: none;
    }

    .resize-handle {
      display: none;
      position: absolute;
      right: 4px;
      bottom: 4px;
      width: 16px;
      height: 16px;
      cursor: nwse-resize;
      border-right: 3px solid var(--ink);
      border-bottom: 3px solid var(--ink);
    }

    body.resize-mode .resize-handle {
      display: block;
    }

    body.resize-mode .panel {
      outline: 1px dashed var(--glass-border);
    }

    body.fullscreen-fallback {
      position: fixed;
      inset: 0;
      overflow: auto;
    }

    body.fullscreen-fallback .app {
      width: 100%;
    }

    .empty-state {
      text-align: center;
      padding: 30px;
      grid-column: 1 / -1;
    }

    @media (max-width: 860px) {
      .layout {
        grid-template-columns: 1fr;
      }
    }
  </style>
</head>
<body>
  <main class="app">
    {{NOTICE}}
    <header>
      <h1>Stats Tracker</h1>
      <div class="toolbar">
        <button id="save-btn">Save</button>
        <button id="export-btn">Export</button>
        <label class="glass-button">Import<input id="import-file" type="file" accept="application/json" hidden /></label>
        <button id="resize-btn">Resize mode</button>
        <button id="layout-reset-btn">Reset layout</button>
        <button id="fullscreen-btn">Fullscreen</button>
        <button id="clear-btn" class="danger">Clear all</button>
      </div>
    </header>

    <section class="panel" data-container="overview-panel">
      <div id="overview" class="overview">{{OVERVIEW}}</div>
      <span class="resize-handle"></span>
    </section>

    <section class="panel" data-container="featured-panel">
      <h2>Featured players</h2>
      <div id="featured-players" class="featured">{{FEATURED}}</div>
      <span class="resize-handle"></span>
    </section>

    <div class="layout">
      <section class="panel" data-container="players-panel">
        <h2>Players</h2>
        <form id="player-form">
          <input name="nickname" placeholder="Nickname" required />
          <input name="kills" type="number" min="0" step="1" placeholder="Kills" />
          <input name="deaths" type="number" min="0" step="1" placeholder="Deaths" />
          <input name="time" type="number" min="0" step="0.1" placeholder="Hours" />
          <input name="screenshot" type="file" accept="image/*" title="Screenshot" />
          <img id="screenshot-preview" class="hidden" alt="Screenshot preview" />
          <button type="submit" class="primary">Add player</button>
        </form>
        <form id="share-form">
          <input name="code" placeholder="GFRJRF://..." required />
          <button type="submit">Add from share code</button>
        </form>
        <div class="sort-bar">{{SORT_BUTTONS}}</div>
        <div id="player-grid" class="player-grid">{{PLAYER_GRID}}</div>
        <span class="resize-handle"></span>
      </section>

      <aside class="panel" data-container="side-panel">
        <h2>Leaderboard</h2>
        <div class="board-bar">{{BOARD_BUTTONS}}</div>
        <div id="leaderboard">{{LEADERBOARD}}</div>
        <h2>Recent activity</h2>
        <div id="activity-feed">{{ACTIVITY}}</div>
        <h2>Background</h2>
        <div id="background-picker" class="background-picker">{{BACKGROUNDS}}</div>
        <span class="resize-handle"></span>
      </aside>
    </div>
  </main>

  <script id="settings-data" type="application/json">{{SETTINGS_JSON}}</script>
  <script>
    const MIN_WIDTH = 200;
    const MIN_HEIGHT = 100;
    const settings = JSON.parse(document.getElementById('settings-data').textContent);
    let currentSort = '{{CURRENT_SORT}}';
    let currentBoard = document.querySelector('.board-btn.active')?.dataset.board || 'kd';
    const noticeEl = document.getElementById('save-notice');

    const showNotice = (text) => {
      if (!text) return;
      noticeEl.textContent = text;
      noticeEl.classList.remove('hidden');
    };

    const api = async (method, url, body) => {
      const options = { method, headers: {} };
      if (body !== undefined) {
        options.headers['Content-Type'] = 'application/json';
        options.body = typeof body === 'string' ? body : JSON.stringify(body);
      }
      const res = await fetch(url, options);
      if (!res.ok) {
        const message = await res.text();
        alert(message || 'Request failed');
        return null;
      }
      if (res.status === 204) return null;
      const payload = await res.json();
      if (payload && payload.notice) showNotice(payload.notice);
      return payload;
    };

    const refresh = async () => {
      const res = await fetch(`/api/fragments?sort=${currentSort}&board=${currentBoard}`);
      if (!res.ok) return;
      const fragments = await res.json();
      for (const [id, html] of Object.entries(fragments)) {
        const target = document.getElementById(id);
        if (target) {
          target.innerHTML = html;
        } else {
          console.warn(`render target #${id} is not mounted`);
        }
      }
    };

    const applySizes = () => {
      for (const panel of document.querySelectorAll('[data-container]')) {
        const size = settings.containerSizes[panel.dataset.container];
        if (size) {
          panel.style.width = `${size.width}px`;
          panel.style.height = `${size.height}px`;
        }
      }
    };

    const readDataUrl = (file) => new Promise((resolve, reject) => {
      const reader = new FileReader();
      reader.onload = () => resolve(reader.result);
      reader.onerror = () => reject(reader.error);
      reader.readAsDataURL(file);
    });

    const screenshotPreview = document.getElementById('screenshot-preview');
    document.querySelector('#player-form input[name=screenshot]').addEventListener('change', async (event) => {
      const file = event.target.files[0];
      screenshotPreview.classList.toggle('hidden', !file);
      if (file) screenshotPreview.src = await readDataUrl(file);
    });

    document.getElementById('player-form').addEventListener('submit', async (event) => {
      event.preventDefault();
      const form = new FormData(event.target);
      const file = form.get('screenshot');
      form.delete('screenshot');
      const payload = Object.fromEntries(form.entries());
      if (file && file.size > 0) {
        try {
          payload.screenshot = await readDataUrl(file);
        } catch (err) {
          alert(`Could not read screenshot: ${err}`);
          return;
        }
      }
      if (await api('POST', '/api/players', payload)) {
        event.target.reset();
        screenshotPreview.classList.add('hidden');
        screenshotPreview.removeAttribute('src');
        await refresh();
      }
    });

    document.getElementById('share-form').addEventListener('submit', async (event) => {
      event.preventDefault();
      const code = new FormData(event.target).get('code');
      if (await api('POST', '/api/share', { code })) {
        event.target.reset();
        await refresh();
      }
    });

    document.addEventListener('click', async (event) => {
      const button = event.target.closest('[data-action], [data-sort], [data-board]');
      if (!button) return;

      if (button.dataset.sort) {
        currentSort = button.dataset.sort;
        document.querySelectorAll('.sort-btn').forEach((b) => b.classList.toggle('active', b === button));
        await refresh();
        return;
      }
      if (button.dataset.board) {
        currentBoard = button.dataset.board;
        document.querySelectorAll('.board-btn').forEach((b) => b.classList.toggle('active', b === button));
        await refresh();
        return;
      }

      const id = button.dataset.id;
      switch (button.dataset.action) {
        case 'delete':
          if (confirm(`Delete ${button.dataset.name}?`)) {
            await api('DELETE', `/api/players/${id}`);
            await refresh();
          }
          break;
        case 'edit': {
          const kills = prompt('Kills');
          if (kills === null) return;
          const deaths = prompt('Deaths');
          if (deaths === null) return;
          const time = prompt('Hours played');
          if (time === null) return;
          await api('PATCH', `/api/players/${id}`, { kills, deaths, time });
          await refresh();
          break;
        }
        case 'share': {
          const payload = await api('GET', `/api/players/${id}/share`);
          if (payload) prompt('Share code', payload.code);
          break;
        }
        case 'background': {
          const url = button.dataset.url;
          if (await api('PUT', '/api/settings/background', { url })) {
            document.body.style.backgroundImage = `url('${url}')`;
            settings.currentBackground = url;
            await refresh();
          }
          break;
        }
        case 'open-player-form':
          document.querySelector('#player-form input[name=nickname]').focus();
          break;
      }
    });

    document.getElementById('save-btn').addEventListener('click', async () => {
      const payload = await api('POST', '/api/save');
      if (payload && payload.saved) alert('Data saved');
    });

    document.getElementById('export-btn').addEventListener('click', () => {
      window.location.href = '/api/export';
    });

    document.getElementById('import-file').addEventListener('change', async (event) => {
      const file = event.target.files[0];
      if (!file) return;
      const text = await file.text();
      const payload = await api('POST', '/api/import', text);
      if (payload) {
        alert(`Imported ${payload.data} players`);
        window.location.reload();
      }
      event.target.value = '';
    });

    document.getElementById('clear-btn').addEventListener('click', async () => {
      if (!confirm('Delete all players, activity and settings?')) return;
      if (await api('DELETE', '/api/players')) window.location.reload();
    });

    const setResizeMode = (enabled) => {
      settings.resizeMode = enabled;
      document.body.classList.toggle('resize-mode', enabled);
      document.getElementById('resize-btn').classList.toggle('active', enabled);
    };

    document.getElementById('resize-btn').addEventListener('click', async () => {
      const enabled = !settings.resizeMode;
      if (await api('PUT', '/api/settings/resize-mode', { enabled })) setResizeMode(enabled);
    });

    document.getElementById('layout-reset-btn').addEventListener('click', async () => {
      if (!(await api('DELETE', '/api/settings/containers'))) return;
      settings.containerSizes = {};
      for (const panel of document.querySelectorAll('[data-container]')) {
        panel.style.width = '';
        panel.style.height = '';
      }
    });

    for (const handle of document.querySelectorAll('.resize-handle')) {
      handle.addEventListener('pointerdown', (event) => {
        if (!settings.resizeMode) return;
        event.preventDefault();
        const panel = handle.parentElement;
        const rect = panel.getBoundingClientRect();
        const start = { x: event.clientX, y: event.clientY, width: rect.width, height: rect.height };
        handle.setPointerCapture(event.pointerId);

        const onMove = (move) => {
          const width = Math.max(MIN_WIDTH, start.width + move.clientX - start.x);
          const height = Math.max(MIN_HEIGHT, start.height + move.clientY - start.y);
          panel.style.width = `${width}px`;
          panel.style.height = `${height}px`;
        };
        const onUp = async (up) => {
          handle.removeEventListener('pointermove', onMove);
          handle.removeEventListener('pointerup', onUp);
          const payload = await api('PUT', `/api/settings/containers/${panel.dataset.container}`, {
            startWidth: start.width,
            startHeight: start.height,
            deltaX: up.clientX - start.x,
            deltaY: up.clientY - start.y,
          });
          if (payload) settings.containerSizes[panel.dataset.container] = payload.data;
        };
        handle.addEventListener('pointermove', onMove);
        handle.addEventListener('pointerup', onUp);
      });
    }

    const enterFullscreen = async () => {
      const root = document.documentElement;
      if (root.requestFullscreen) {
        try {
          await root.requestFullscreen();
          return;
        } catch (err) {
          console.warn('fullscreen request refused, using fallback', err);
        }
      }
      document.body.classList.add('fullscreen-fallback');
    };

    const exitFullscreen = async () => {
      if (document.fullscreenElement && document.exitFullscreen) await document.exitFullscreen();
      document.body.classList.remove('fullscreen-fallback');
    };

    document.getElementById('fullscreen-btn').addEventListener('click', async () => {
      const enabled = !(document.fullscreenElement || document.body.classList.contains('fullscreen-fallback'));
      if (enabled) await enterFullscreen(); else await exitFullscreen();
      await api('PUT', '/api/settings/fullscreen', { enabled });
    });

    const beacon = (event) => {
      const body = new Blob([JSON.stringify({ event })], { type: 'application/json' });
      if (!navigator.sendBeacon || !navigator.sendBeacon('/api/lifecycle', body)) {
        fetch('/api/lifecycle', { method: 'POST', body, keepalive: true, headers: { 'Content-Type': 'application/json' } });
      }
    };

    document.addEventListener('visibilitychange', () => {
      if (document.visibilityState === 'hidden') beacon('hidden');
    });
    window.addEventListener('pagehide', () => beacon('unload'));

    setInterval(async () => {
      const res = await fetch('/api/status');
      if (res.ok) {
        const status = await res.json();
        if (status.notice) showNotice(status.notice);
      }
    }, 30000);

    applySizes();
    setResizeMode(settings.resizeMode);
    if (settings.autoFullscreen) {
      document.addEventListener('click', enterFullscreen, { once: true });
    }
  </script>
</body>
</html>
"#;
