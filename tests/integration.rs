use async_trait::async_trait;
use mediadex::config::load_config;
use mediadex::connector_export::ExportHistory;
use mediadex::ingest::{select_target, IndexRequest, IndexSettings, IndexingCoordinator};
use mediadex::models::{ChatRef, JobStatus};
use mediadex::progress::{ProgressReporter, ProgressSnapshot};
use mediadex::store::SqliteStore;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, OnceLock};
use tempfile::TempDir;

fn mdx_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("mdx");
    path
}

const EXPORT: &str = r#"{
  "name": "Film Archive",
  "type": "public_channel",
  "id": 1500000001,
  "messages": [
    {
      "id": 1, "type": "message", "text": "First cut",
      "file": "video_files/first_cut.mp4", "file_size": 1048576,
      "media_type": "video_file", "mime_type": "video/mp4",
      "duration_seconds": 95, "width": 1280, "height": 720
    },
    { "id": 2, "type": "message", "text": "just talking" },
    {
      "id": 3, "type": "message", "text": "",
      "photo": "photos/poster.jpg", "photo_file_size": 2048,
      "width": 800, "height": 600
    },
    {
      "id": 5, "type": "message",
      "text": [{"type": "bold", "text": "Score"}, " part 1"],
      "file": "files/score_part-1.mp3", "file_size": 4096,
      "media_type": "audio_file", "mime_type": "audio/mpeg",
      "duration_seconds": 180
    },
    {
      "id": 6, "type": "message", "text": "",
      "file": "files/Script.Final.pdf", "file_size": 20480,
      "mime_type": "application/pdf"
    }
  ]
}"#;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    fs::write(root.join("result.json"), EXPORT).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/mdx.sqlite"

[indexer]
batch_size = 2
batch_pause_ms = 0
min_retry_wait_secs = 1

[export]
path = "{}/result.json"
"#,
        root.display(),
        root.display()
    );

    let config_path = config_dir.join("mdx.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_mdx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = mdx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run mdx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn index(config_path: &Path, extra: &[&str]) -> (String, String, bool) {
    let mut args = vec!["index", "--progress", "off"];
    args.extend_from_slice(extra);
    run_mdx(config_path, &args)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_mdx(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data").join("mdx.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_mdx(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_mdx(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_resolve_public_link() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_mdx(&config_path, &["resolve", "https://t.me/filmarchive/1520"]);
    assert!(success);
    assert!(stdout.contains("chat: @filmarchive"));
    assert!(stdout.contains("position: 1520"));
}

#[test]
fn test_resolve_private_link_without_position() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_mdx(&config_path, &["resolve", "t.me/c/1500000001"]);
    assert!(success);
    assert!(stdout.contains("chat: -1001500000001"));
    assert!(stdout.contains("position: latest"));
}

#[test]
fn test_resolve_rejects_garbage() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_mdx(&config_path, &["resolve", "hello there"]);
    assert!(!success, "Malformed link should fail");
    assert!(
        stderr.contains("Invalid submission"),
        "Should reject the submission, got: {}",
        stderr
    );
}

#[test]
fn test_index_whole_export() {
    let (_tmp, config_path) = setup_test_env();

    run_mdx(&config_path, &["init"]);
    let (stdout, stderr, success) = index(&config_path, &[]);
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("index 1500000001 (Film Archive)"));
    assert!(stdout.contains("status: completed"));
    assert!(stdout.contains("fetched: 6"));
    assert!(stdout.contains("saved: 3"));
    assert!(stdout.contains("duplicate: 0"));
    assert!(stdout.contains("deleted: 1"));
    assert!(stdout.contains("no media: 1"));
    assert!(stdout.contains("unsupported: 1"));
    assert!(stdout.contains("errors: 0"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_reindex_counts_duplicates() {
    let (_tmp, config_path) = setup_test_env();

    run_mdx(&config_path, &["init"]);
    let (stdout1, _, _) = index(&config_path, &[]);
    assert!(stdout1.contains("saved: 3"));

    let (stdout2, _, success) = index(&config_path, &[]);
    assert!(success);
    assert!(stdout2.contains("saved: 0"));
    assert!(stdout2.contains("duplicate: 3"));
}

#[test]
fn test_index_from_link_position() {
    let (_tmp, config_path) = setup_test_env();

    run_mdx(&config_path, &["init"]);
    let (stdout, stderr, success) = index(&config_path, &["https://t.me/c/1500000001/3"]);
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("fetched: 3"));
    assert!(stdout.contains("saved: 1"));
    assert!(stdout.contains("unsupported: 1"));
    assert!(stdout.contains("no media: 1"));
}

#[test]
fn test_index_from_overrides_position() {
    let (_tmp, config_path) = setup_test_env();

    run_mdx(&config_path, &["init"]);
    let (stdout, _, success) = index(&config_path, &["--from", "2"]);
    assert!(success);
    assert!(stdout.contains("fetched: 2"));
    assert!(stdout.contains("cursor: 0"));
}

#[test]
fn test_index_rejects_malformed_reference() {
    let (_tmp, config_path) = setup_test_env();

    run_mdx(&config_path, &["init"]);
    let (stdout, stderr, success) = index(&config_path, &["not a link"]);
    assert!(!success, "Malformed reference should fail");
    assert!(stderr.contains("Invalid submission"));
    assert!(!stdout.contains("status:"), "No job should have run");
}

#[test]
fn test_index_foreign_chat_fails() {
    let (_tmp, config_path) = setup_test_env();

    run_mdx(&config_path, &["init"]);
    let (stdout, stderr, success) = index(&config_path, &["t.me/c/42/10"]);
    assert!(!success, "Indexing a chat outside the export should fail");
    assert!(stdout.contains("status: error"));
    assert!(stdout.contains("errors: 1"));
    assert!(
        stderr.contains("not in the export"),
        "Should explain the failure, got: {}",
        stderr
    );
}

#[test]
fn test_index_json_progress() {
    let (_tmp, config_path) = setup_test_env();

    run_mdx(&config_path, &["init"]);
    let (_, stderr, success) = run_mdx(&config_path, &["index", "--progress", "json"]);
    assert!(success);
    let terminal = stderr
        .lines()
        .filter(|l| l.starts_with('{'))
        .last()
        .expect("a JSON progress line");
    let value: serde_json::Value = serde_json::from_str(terminal).unwrap();
    assert_eq!(value["status"], "completed");
    assert_eq!(value["fetched_count"], 6);
    assert_eq!(value["saved"], 3);
}

#[test]
fn test_index_unknown_progress_mode() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_mdx(&config_path, &["index", "--progress", "loud"]);
    assert!(!success);
    assert!(stderr.contains("progress"));
}

#[test]
fn test_resume_without_marker_starts_at_latest() {
    let (_tmp, config_path) = setup_test_env();

    run_mdx(&config_path, &["init"]);
    let (stdout, _, success) = index(&config_path, &["--resume"]);
    assert!(success);
    assert!(stdout.contains("fetched: 6"));
}

#[test]
fn test_stats_after_index() {
    let (_tmp, config_path) = setup_test_env();

    run_mdx(&config_path, &["init"]);
    index(&config_path, &[]);

    let (stdout, stderr, success) = run_mdx(&config_path, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Media:       3"));
    assert!(stdout.contains("video"));
    assert!(stdout.contains("audio"));
    assert!(stdout.contains("document"));
    // Completed jobs leave no resume marker behind
    assert!(!stdout.contains("Unfinished jobs"));
}

#[test]
fn test_missing_config_errors() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");

    let (_, stderr, success) = run_mdx(&missing, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_completions() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_mdx(&config_path, &["completions", "bash"]);
    assert!(success);
    assert!(stdout.contains("mdx"));
}

#[test]
fn test_index_from_zero_starts_at_newest() {
    let (_tmp, config_path) = setup_test_env();

    run_mdx(&config_path, &["init"]);
    let (stdout, _, success) = index(&config_path, &["--from", "0"]);
    assert!(success);
    assert!(stdout.contains("fetched: 6"));
    assert!(stdout.contains("saved: 3"));
}

#[test]
fn test_every_chat_reference_selects_the_export_chat() {
    let (_tmp, config_path) = setup_test_env();
    let config = load_config(&config_path).unwrap();
    let history = ExportHistory::load(&config.export.unwrap().path).unwrap();
    let export_chat = ChatRef::Id(1500000001);

    for (reference, chat) in [
        (Some("https://t.me/filmarchive/4"), None),
        (Some("t.me/c/1500000001/4"), None),
        (None, Some("@filmarchive")),
        (None, None),
    ] {
        let (source, _) = select_target(
            &history,
            reference.map(String::from),
            chat.map(String::from),
            None,
        )
        .unwrap();
        assert_eq!(source, export_chat, "{:?} / {:?}", reference, chat);
    }

    let (_, position) = select_target(&history, None, None, Some(-5)).unwrap();
    assert_eq!(position, None);
}

/// Cancels the coordinator once `after` items have been reported.
struct CancelAfter {
    after: u64,
    coordinator: OnceLock<IndexingCoordinator>,
}

#[async_trait]
impl ProgressReporter for CancelAfter {
    async fn report(&self, snapshot: &ProgressSnapshot) -> anyhow::Result<()> {
        if snapshot.status == JobStatus::Running && snapshot.fetched_count >= self.after {
            if let Some(c) = self.coordinator.get() {
                c.cancel();
            }
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_resume_finds_marker_left_by_link_job() {
    let (_tmp, config_path) = setup_test_env();
    let config = load_config(&config_path).unwrap();
    let history = Arc::new(ExportHistory::load(&config.export.clone().unwrap().path).unwrap());

    // Interrupted job started from a public link
    let (source, position) = select_target(
        &history,
        Some("https://t.me/filmarchive/6".to_string()),
        None,
        None,
    )
    .unwrap();
    let store = Arc::new(SqliteStore::open(&config).await.unwrap());
    let mut settings = IndexSettings::from(&config.indexer);
    settings.progress_every = 1;
    let coordinator =
        IndexingCoordinator::new(history, store.clone(), Some(store.clone()), settings);
    let reporter = CancelAfter {
        after: 3,
        coordinator: OnceLock::new(),
    };
    let _ = reporter.coordinator.set(coordinator.clone());

    let first = coordinator
        .run(IndexRequest::new(source, position), &reporter)
        .await
        .unwrap();
    assert_eq!(first.status, JobStatus::Cancelled);
    assert_eq!(first.fetched, 3);
    assert_eq!(first.cursor, 3);
    store.close().await;

    // A bare resume picks up the remaining three messages
    let (stdout, stderr, success) = index(&config_path, &["--resume"]);
    assert!(success, "resume failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("fetched: 3"), "got: {}", stdout);
    assert!(stdout.contains("saved: 1"));
    assert!(stdout.contains("status: completed"));
}
