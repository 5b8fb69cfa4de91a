use std::fmt::Display;
use std::sync::Arc;

use crate::models::{LeaderboardEntry, LeaderboardResponse};
use crate::time_utils::format_timestamp;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::TimeZone;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const LEADERBOARD_URL: &str = "https://mvponflow.cc/api/leaderboard";

pub const COLUMNS: [&str; 5] = ["#", "TopShot Username", "Points", "Last scored at", "Prize"];

pub const NO_ENTRIES: &str = "No entries yet.";

/// Where the view reads its data from.
#[async_trait]
pub trait LeaderboardSource: Send + Sync {
    async fn fetch(&self) -> Result<LeaderboardResponse>;
}

pub struct HttpSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_url(client, LEADERBOARD_URL)
    }

    pub fn with_url(client: reqwest::Client, url: impl Into<String>) -> Self {
        HttpSource {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl LeaderboardSource for HttpSource {
    async fn fetch(&self) -> Result<LeaderboardResponse> {
        info!("Fetching leaderboard from {}", self.url);
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.url))?;

        match response.status() {
            s if s.is_success() => {}
            http::StatusCode::NOT_FOUND => {
                return Err(anyhow!("Leaderboard endpoint {} does not exist", self.url));
            }
            s => return Err(anyhow!("Leaderboard endpoint returned {}", s)),
        }

        response
            .json::<LeaderboardResponse>()
            .await
            .context("Leaderboard response was not a valid payload")
    }
}

/// The data of one successful fetch. Prize pool and entries always travel together.
#[derive(Debug, Clone, PartialEq)]
pub struct Leaderboard {
    pub prize_pool: f64,
    pub entries: Vec<LeaderboardEntry>,
}

impl From<LeaderboardResponse> for Leaderboard {
    fn from(response: LeaderboardResponse) -> Self {
        Leaderboard {
            prize_pool: response.prize_pool,
            entries: response.leaderboard,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum LoadState {
    #[default]
    Pending,
    Loaded(Leaderboard),
    Failed(String),
}

impl LoadState {
    pub fn prize_pool(&self) -> f64 {
        match self {
            LoadState::Loaded(board) => board.prize_pool,
            _ => 0.0,
        }
    }

    pub fn entries(&self) -> &[LeaderboardEntry] {
        match self {
            LoadState::Loaded(board) => &board.entries,
            _ => &[],
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, LoadState::Failed(_))
    }
}

#[derive(Debug, Default)]
struct ViewState {
    generation: u64,
    mounted: bool,
    load: LoadState,
}

/// Leaderboard page state. One fetch per activation, results from a stale
/// activation are dropped.
pub struct LeaderboardView {
    source: Arc<dyn LeaderboardSource>,
    state: Arc<RwLock<ViewState>>,
}

impl LeaderboardView {
    pub fn new(source: Arc<dyn LeaderboardSource>) -> Self {
        LeaderboardView {
            source,
            state: Arc::new(RwLock::new(ViewState::default())),
        }
    }

    /// Mounts the view and spawns its fetch. Returns `None` if the view is
    /// already mounted, in which case nothing is fetched.
    pub async fn activate(&self) -> Option<JoinHandle<()>> {
        let generation = {
            let mut state = self.state.write().await;
            if state.mounted {
                debug!("Leaderboard view already active, not fetching again");
                return None;
            }
            state.mounted = true;
            state.generation += 1;
            state.generation
        };

        let source = self.source.clone();
        let state = self.state.clone();
        Some(tokio::spawn(async move {
            let result = source.fetch().await;
            apply(&state, generation, result).await;
        }))
    }

    /// Unmounts the view and drops whatever it had loaded.
    pub async fn teardown(&self) {
        let mut state = self.state.write().await;
        state.mounted = false;
        state.generation += 1;
        state.load = LoadState::Pending;
    }

    pub async fn snapshot(&self) -> LoadState {
        self.state.read().await.load.clone()
    }
}

async fn apply(
    state: &RwLock<ViewState>,
    generation: u64,
    result: Result<LeaderboardResponse>,
) {
    let mut state = state.write().await;
    if !state.mounted || state.generation != generation {
        debug!(
            "Discarding leaderboard result for generation {} (current {})",
            generation, state.generation
        );
        return;
    }
    state.load = match result {
        Result::Ok(response) => {
            info!(
                "Leaderboard loaded with {} entries",
                response.leaderboard.len()
            );
            LoadState::Loaded(response.into())
        }
        Result::Err(e) => {
            warn!("Leaderboard failed to load: {:#}", e);
            LoadState::Failed(format!("{:#}", e))
        }
    };
}

#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    Entry([String; 5]),
    Placeholder,
}

/// Table rows in server order. Rank is the 1-based position.
pub fn rows<Tz>(load: &LoadState, tz: &Tz) -> Vec<Row>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let entries = load.entries();
    if entries.is_empty() {
        return vec![Row::Placeholder];
    }
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            Row::Entry([
                (index + 1).to_string(),
                entry.username.clone(),
                entry.points.to_string(),
                format_timestamp(entry.last_scored_at.as_deref(), tz),
                entry.prize.clone(),
            ])
        })
        .collect()
}

pub fn render_table(rows: &[Row]) -> String {
    let mut widths = COLUMNS.map(|c| c.chars().count());
    for row in rows {
        if let Row::Entry(cells) = row {
            for (width, cell) in widths.iter_mut().zip(cells) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }
    let full_width = widths.iter().sum::<usize>() + 3 * (widths.len() - 1);

    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut out = vec![
        line(&COLUMNS.map(String::from)[..]),
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    ];
    for row in rows {
        match row {
            Row::Entry(cells) => out.push(line(&cells[..])),
            Row::Placeholder => out.push(
                format!("{:^width$}", NO_ENTRIES, width = full_width)
                    .trim_end()
                    .to_string(),
            ),
        }
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Points;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::Semaphore;
    use tokio_test::{assert_err, assert_ok};

    fn entry(username: &str, points: f64, last_scored_at: Option<&str>) -> LeaderboardEntry {
        LeaderboardEntry {
            username: username.to_string(),
            points: points.into(),
            last_scored_at: last_scored_at.map(String::from),
            prize: "-".to_string(),
        }
    }

    fn sample() -> LeaderboardResponse {
        LeaderboardResponse {
            prize_pool: 125.0,
            leaderboard: vec![
                entry("horsefan", 80.0, Some("2025-10-15 14:30:00")),
                entry("joker15", 40.5, None),
                entry("mile_high", 4.5, Some("not-a-date")),
            ],
        }
    }

    struct StaticSource {
        response: Option<LeaderboardResponse>,
        calls: AtomicUsize,
    }

    impl StaticSource {
        fn ok(response: LeaderboardResponse) -> Arc<Self> {
            Arc::new(StaticSource {
                response: Some(response),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(StaticSource {
                response: None,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LeaderboardSource for StaticSource {
        async fn fetch(&self) -> Result<LeaderboardResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response
                .clone()
                .ok_or_else(|| anyhow!("connection refused"))
        }
    }

    /// Each call blocks on its own gate and answers with a payload naming
    /// the call, so results from different activations can be told apart.
    struct GatedSource {
        gates: Vec<Semaphore>,
        calls: AtomicUsize,
    }

    impl GatedSource {
        fn new(calls: usize) -> Arc<Self> {
            Arc::new(GatedSource {
                gates: (0..calls).map(|_| Semaphore::new(0)).collect(),
                calls: AtomicUsize::new(0),
            })
        }

        fn release(&self, call: usize) {
            self.gates[call].add_permits(1);
        }

        async fn wait_for_calls(&self, calls: usize) {
            while self.calls.load(Ordering::SeqCst) < calls {
                tokio::task::yield_now().await;
            }
        }
    }

    #[async_trait]
    impl LeaderboardSource for GatedSource {
        async fn fetch(&self) -> Result<LeaderboardResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.gates[call].acquire().await?.forget();
            Ok(LeaderboardResponse {
                prize_pool: 100.0 * (call + 1) as f64,
                leaderboard: vec![entry(&format!("call-{}", call), 1.0, None)],
            })
        }
    }

    fn local_client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let mut read: Vec<u8> = Vec::new();
            while !read.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                read.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{}/api/leaderboard", addr)
    }

    #[test]
    fn test_rows_follow_server_order() {
        let load = LoadState::Loaded(sample().into());
        let rows = rows(&load, &Utc);
        assert_eq!(rows.len(), 3);
        for (index, row) in rows.iter().enumerate() {
            match row {
                Row::Entry(cells) => assert_eq!(cells[0], (index + 1).to_string()),
                Row::Placeholder => panic!("unexpected placeholder"),
            }
        }
        assert_eq!(
            rows[0],
            Row::Entry([
                "1".to_string(),
                "horsefan".to_string(),
                "80".to_string(),
                "Oct 15, 2025, 02:30 PM".to_string(),
                "-".to_string(),
            ])
        );
        let Row::Entry(second) = &rows[1] else {
            panic!("expected entry")
        };
        assert_eq!(second[2], "40.5");
        assert_eq!(second[3], "-");
        let Row::Entry(third) = &rows[2] else {
            panic!("expected entry")
        };
        assert_eq!(third[3], "not-a-date");
    }

    #[test]
    fn test_decimal_string_points_render_as_sent() {
        let mut response = sample();
        response.leaderboard[0].points = Points::Text("112.0".to_string());
        let rows = rows(&LoadState::Loaded(response.into()), &Utc);
        let Row::Entry(first) = &rows[0] else {
            panic!("expected entry")
        };
        assert_eq!(first[2], "112.0");
    }

    #[test]
    fn test_no_client_side_sort() {
        let response = LeaderboardResponse {
            prize_pool: 0.0,
            leaderboard: vec![entry("low", 1.0, None), entry("high", 99.0, None)],
        };
        let rows = rows(&LoadState::Loaded(response.into()), &Utc);
        let Row::Entry(first) = &rows[0] else {
            panic!("expected entry")
        };
        assert_eq!(first[1], "low");
    }

    #[test]
    fn test_empty_states_render_placeholder() {
        let empty = LoadState::Loaded(LeaderboardResponse::default().into());
        for load in [
            LoadState::Pending,
            empty,
            LoadState::Failed("boom".to_string()),
        ] {
            assert_eq!(rows(&load, &Utc), vec![Row::Placeholder]);
            assert_eq!(load.prize_pool(), 0.0);
        }
    }

    #[test]
    fn test_render_table_placeholder_spans_columns() {
        let table = render_table(&[Row::Placeholder]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("# | TopShot Username | Points"));
        assert_eq!(lines[2].trim(), NO_ENTRIES);
        assert!(!lines[2].contains('|'));
    }

    #[test]
    fn test_render_table_aligns_columns() {
        let rows = rows(&LoadState::Loaded(sample().into()), &Utc);
        let table = render_table(&rows);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 2 + 3);
        let header_bar = lines[0].find(" | ").unwrap();
        for line in &lines[2..] {
            assert_eq!(line.find(" | ").unwrap(), header_bar);
        }
        assert!(lines[2].contains("Oct 15, 2025, 02:30 PM"));
    }

    #[tokio::test]
    async fn test_activation_loads_once() {
        let source = StaticSource::ok(sample());
        let view = LeaderboardView::new(source.clone());
        assert_eq!(view.snapshot().await, LoadState::Pending);

        let handle = view.activate().await.unwrap();
        assert!(view.activate().await.is_none());
        handle.await.unwrap();

        let load = view.snapshot().await;
        assert_eq!(load.prize_pool(), 125.0);
        assert_eq!(load.entries().len(), 3);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_keeps_default_view() {
        let view = LeaderboardView::new(StaticSource::failing());
        view.activate().await.unwrap().await.unwrap();

        let load = view.snapshot().await;
        assert!(load.is_failed());
        assert_eq!(load.prize_pool(), 0.0);
        assert_eq!(rows(&load, &Utc), vec![Row::Placeholder]);
    }

    #[tokio::test]
    async fn test_result_after_teardown_is_discarded() {
        let source = GatedSource::new(1);
        let view = LeaderboardView::new(source.clone());

        let handle = view.activate().await.unwrap();
        view.teardown().await;
        source.release(0);
        handle.await.unwrap();

        assert_eq!(view.snapshot().await, LoadState::Pending);
    }

    #[tokio::test]
    async fn test_stale_generation_is_discarded() {
        let source = GatedSource::new(2);
        let view = LeaderboardView::new(source.clone());

        let stale = view.activate().await.unwrap();
        source.wait_for_calls(1).await;
        view.teardown().await;
        let fresh = view.activate().await.unwrap();
        source.wait_for_calls(2).await;

        source.release(1);
        fresh.await.unwrap();
        assert_eq!(view.snapshot().await.prize_pool(), 200.0);

        // The older fetch resolves last, while the view is mounted again.
        source.release(0);
        stale.await.unwrap();

        let load = view.snapshot().await;
        assert_eq!(load.prize_pool(), 200.0);
        assert_eq!(load.entries().len(), 1);
        assert_eq!(load.entries()[0].username, "call-1");
    }

    #[tokio::test]
    async fn test_teardown_drops_data() {
        let view = LeaderboardView::new(StaticSource::ok(sample()));
        view.activate().await.unwrap().await.unwrap();
        view.teardown().await;
        assert_eq!(view.snapshot().await, LoadState::Pending);
    }

    #[tokio::test]
    async fn test_http_source_parses_payload() {
        let url = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"leaderboard": [{"username": "horsefan", "points": 12, "last_scored_at": "2025-10-15 14:30:00", "prize": "-"}]}"#,
        )
        .await;
        let source = HttpSource::with_url(local_client(), url);
        let response = assert_ok!(source.fetch().await);
        assert_eq!(response.prize_pool, 0.0);
        assert_eq!(response.leaderboard[0].username, "horsefan");
    }

    #[tokio::test]
    async fn test_http_source_rejects_server_error() {
        let url = serve_once("HTTP/1.1 500 Internal Server Error", "{}").await;
        let source = HttpSource::with_url(local_client(), url);
        let err = assert_err!(source.fetch().await);
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_http_source_rejects_non_json() {
        let url = serve_once("HTTP/1.1 200 OK", "<html>maintenance</html>").await;
        let source = HttpSource::with_url(local_client(), url);
        assert_err!(source.fetch().await);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_keeps_default_view() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let source = HttpSource::with_url(
            local_client(),
            format!("http://{}/api/leaderboard", addr),
        );
        let view = LeaderboardView::new(Arc::new(source));
        view.activate().await.unwrap().await.unwrap();

        let load = view.snapshot().await;
        assert!(load.is_failed());
        assert_eq!(rows(&load, &Utc), vec![Row::Placeholder]);
    }
}
