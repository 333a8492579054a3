use once_cell::sync::Lazy;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::net::TcpListener;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio::time::sleep;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Player {
    id: u64,
    nickname: String,
    kills: u64,
    deaths: u64,
    time: f64,
    updated_at: i64,
}

#[derive(Debug, Deserialize)]
struct Mutation<T> {
    data: T,
    saved: bool,
    notice: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LeaderboardEntry {
    rank: usize,
    nickname: String,
    kd: f64,
}

struct TestServer {
    base_url: String,
    child: Child,
    _data: Option<TempDir>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

static TEST_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));
static SERVER: Lazy<Mutex<Option<Arc<TestServer>>>> = Lazy::new(|| Mutex::new(None));

#[cfg(unix)]
mod cleanup {
    use std::sync::Once;
    use std::sync::atomic::{AtomicI32, Ordering};

    static REGISTER: Once = Once::new();
    static PID: AtomicI32 = AtomicI32::new(0);

    pub fn register(pid: u32) {
        REGISTER.call_once(|| {
            PID.store(pid as i32, Ordering::SeqCst);
            unsafe {
                libc::atexit(on_exit);
            }
        });
    }

    extern "C" fn on_exit() {
        let pid = PID.load(Ordering::SeqCst);
        if pid > 0 {
            unsafe {
                libc::kill(pid, libc::SIGTERM);
            }
        }
    }
}

fn pick_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind random port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

async fn wait_until_ready(base_url: &str) {
    let client = Client::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(resp) = client.get(format!("{base_url}/api/status")).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        if Instant::now() > deadline {
            panic!("server did not become ready");
        }
        sleep(Duration::from_millis(100)).await;
    }
}

async fn spawn_server_in(data_path: &Path, data: Option<TempDir>) -> TestServer {
    let port = pick_free_port();
    let child = Command::new(env!("CARGO_BIN_EXE_stats_tracker"))
        .env("PORT", port.to_string())
        .env("APP_DATA_PATH", data_path)
        .env("SAVE_VERIFY_DELAY_MS", "0")
        .env("AUTOSAVE_SECS", "3600")
        .env("RUST_LOG", "info")
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .expect("failed to spawn server");

    #[cfg(unix)]
    cleanup::register(child.id());

    let base_url = format!("http://127.0.0.1:{port}");
    wait_until_ready(&base_url).await;

    TestServer {
        base_url,
        child,
        _data: data,
    }
}

async fn spawn_server() -> TestServer {
    let dir = TempDir::new().expect("temp data dir");
    let path = dir.path().to_path_buf();
    spawn_server_in(&path, Some(dir)).await
}

async fn shared_server() -> Arc<TestServer> {
    let mut guard = SERVER.lock().await;
    if let Some(server) = guard.as_ref() {
        return Arc::clone(server);
    }
    let server = Arc::new(spawn_server().await);
    *guard = Some(Arc::clone(&server));
    server
}

fn unique_name(prefix: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{prefix}{nanos}")
}

async fn add_player(
    client: &Client,
    base_url: &str,
    nickname: &str,
    kills: u64,
    deaths: u64,
    time: f64,
) -> reqwest::Response {
    client
        .post(format!("{base_url}/api/players"))
        .json(&json!({ "nickname": nickname, "kills": kills, "deaths": deaths, "time": time }))
        .send()
        .await
        .unwrap()
}

async fn list_players(client: &Client, base_url: &str) -> Vec<Player> {
    client
        .get(format!("{base_url}/api/players"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn http_add_player_is_listed_and_saved() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();
    let name = unique_name("Alice");

    let response = add_player(&client, &server.base_url, &name, 10, 2, 1.5).await;
    assert_eq!(response.status(), StatusCode::OK);
    let created: Mutation<Player> = response.json().await.unwrap();
    assert!(created.saved);
    assert!(created.notice.is_none());
    assert_eq!(created.data.nickname, name);

    let players = list_players(&client, &server.base_url).await;
    let stored = players.iter().find(|p| p.id == created.data.id).unwrap();
    assert_eq!((stored.kills, stored.deaths, stored.time), (10, 2, 1.5));
}

#[tokio::test]
async fn http_duplicate_nickname_is_rejected() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();
    let name = unique_name("dupe");

    let first = add_player(&client, &server.base_url, &name, 1, 1, 1.0).await;
    assert_eq!(first.status(), StatusCode::OK);
    let before = list_players(&client, &server.base_url).await.len();

    let second = add_player(&client, &server.base_url, &name.to_uppercase(), 2, 2, 2.0).await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(list_players(&client, &server.base_url).await.len(), before);

    let empty = add_player(&client, &server.base_url, "   ", 0, 0, 0.0).await;
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn http_delete_removes_only_that_player() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let keep: Mutation<Player> = add_player(&client, &server.base_url, &unique_name("keep"), 3, 1, 1.0)
        .await
        .json()
        .await
        .unwrap();
    let gone: Mutation<Player> = add_player(&client, &server.base_url, &unique_name("gone"), 1, 3, 1.0)
        .await
        .json()
        .await
        .unwrap();

    let response = client
        .delete(format!("{}/api/players/{}", server.base_url, gone.data.id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let players = list_players(&client, &server.base_url).await;
    assert!(players.iter().all(|p| p.id != gone.data.id));
    let kept = players.iter().find(|p| p.id == keep.data.id).unwrap();
    assert_eq!(kept.updated_at, keep.data.updated_at);

    let missing = client
        .delete(format!("{}/api/players/{}", server.base_url, gone.data.id))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn http_player_screenshot_is_stored_and_shown() {
    let server = spawn_server().await;
    let client = Client::new();
    // larger than axum's default body limit
    let screenshot = format!("data:image/png;base64,{}", "A".repeat(3 * 1024 * 1024));

    let response = client
        .post(format!("{}/api/players", server.base_url))
        .json(&json!({
            "nickname": "Shooter",
            "kills": 4,
            "deaths": 1,
            "time": 2,
            "screenshot": screenshot,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let page = client
        .get(format!("{}/", server.base_url))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(page.contains(r#"<div class="player-screenshot"><img src="data:image/png;base64,AAAA"#));
    assert!(page.contains(r#"alt="Screenshot of Shooter""#));
}

#[tokio::test]
async fn http_leaderboard_ranks_by_kill_death_ratio() {
    let server = spawn_server().await;
    let client = Client::new();

    add_player(&client, &server.base_url, "Alice", 10, 2, 1.5).await;
    add_player(&client, &server.base_url, "Bob", 5, 5, 2.0).await;
    add_player(&client, &server.base_url, "Nodeaths", 4, 0, 1.0).await;

    let board: Vec<LeaderboardEntry> = client
        .get(format!("{}/api/leaderboard?sort=kd", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let ranked: Vec<(usize, &str, f64)> = board
        .iter()
        .map(|entry| (entry.rank, entry.nickname.as_str(), entry.kd))
        .collect();
    assert_eq!(
        ranked,
        vec![(1, "Alice", 5.0), (2, "Nodeaths", 4.0), (3, "Bob", 1.0)]
    );

    let overview: Value = client
        .get(format!("{}/api/overview", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(overview["total_players"], 3);
    assert_eq!(overview["total_kills"], 19);
}

#[tokio::test]
async fn http_export_then_import_restores_players() {
    let server = spawn_server().await;
    let client = Client::new();

    add_player(&client, &server.base_url, "Alice", 10, 2, 1.5).await;
    add_player(&client, &server.base_url, "Bob", 5, 5, 2.0).await;
    let before = list_players(&client, &server.base_url).await;

    let export = client
        .get(format!("{}/api/export", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(export.status(), StatusCode::OK);
    let disposition = export
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("stats-backup-"));
    let document = export.text().await.unwrap();

    let cleared = client
        .delete(format!("{}/api/players", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(cleared.status(), StatusCode::OK);
    assert!(list_players(&client, &server.base_url).await.is_empty());

    let imported: Mutation<usize> = client
        .post(format!("{}/api/import", server.base_url))
        .body(document)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(imported.data, 2);

    let after = list_players(&client, &server.base_url).await;
    let summary = |players: &[Player]| -> Vec<(u64, String, u64, u64)> {
        players
            .iter()
            .map(|p| (p.id, p.nickname.clone(), p.kills, p.deaths))
            .collect()
    };
    assert_eq!(summary(&after), summary(&before));

    let broken = client
        .post(format!("{}/api/import", server.base_url))
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(broken.status(), StatusCode::BAD_REQUEST);
    assert_eq!(list_players(&client, &server.base_url).await.len(), 2);
}

#[tokio::test]
async fn http_players_survive_restart() {
    let dir = TempDir::new().unwrap();
    let client = Client::new();

    let first = spawn_server_in(dir.path(), None).await;
    let created: Mutation<Player> = add_player(&client, &first.base_url, "Persistent", 7, 3, 2.5)
        .await
        .json()
        .await
        .unwrap();
    assert!(created.saved);
    drop(first);

    let second = spawn_server_in(dir.path(), None).await;
    let players = list_players(&client, &second.base_url).await;
    assert_eq!(players.len(), 1);
    assert_eq!(players[0].nickname, "Persistent");
    assert_eq!(players[0].id, created.data.id);
    assert_eq!((players[0].kills, players[0].deaths), (7, 3));
}

#[tokio::test]
async fn http_index_and_settings() {
    let server = spawn_server().await;
    let client = Client::new();
    add_player(&client, &server.base_url, "<b>Mallory</b>", 1, 1, 1.0).await;

    let page = client
        .get(format!("{}/?sort=kills", server.base_url))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(page.contains("Stats Tracker"));
    assert!(page.contains("&lt;b&gt;Mallory&lt;/b&gt;"));
    assert!(!page.contains("<b>Mallory</b>"));

    let resize: Mutation<Value> = client
        .put(format!("{}/api/settings/containers/players-panel", server.base_url))
        .json(&json!({ "startWidth": 300, "startHeight": 300, "deltaX": -250, "deltaY": 20 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resize.data, json!({ "width": 200.0, "height": 320.0 }));

    let bad_background = client
        .put(format!("{}/api/settings/background", server.base_url))
        .json(&json!({ "url": "https://example.invalid/bg.png" }))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_background.status(), StatusCode::BAD_REQUEST);

    let settings: Value = client
        .get(format!("{}/api/settings", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(settings["containerSizes"]["players-panel"]["width"], 200.0);
}
