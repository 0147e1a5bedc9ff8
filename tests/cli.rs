use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

fn ah_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_ah"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    fs::create_dir_all(root.join("config")).unwrap();
    fs::create_dir_all(root.join("files")).unwrap();
    fs::write(
        root.join("files/invoice.txt"),
        "Invoice 2025-03\nTotal due: 120 EUR\n",
    )
    .unwrap();
    fs::write(root.join("files/clip.mp4"), b"not really a video").unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/ah.sqlite"

[storage]
provider = "memory"
bucket = "test-assets"

[ingest]
max_upload_bytes = 1048576

[embedding]
provider = "disabled"

[server]
bind = "127.0.0.1:0"
"#,
        root.display()
    );
    let config_path = root.join("config/ah.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run(config: &Path, args: &[&str]) -> Output {
    Command::new(ah_binary())
        .arg("--config")
        .arg(config)
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to run ah")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn test_init_is_idempotent() {
    let (_tmp, config) = setup_test_env();

    let first = run(&config, &["init"]);
    assert!(first.status.success(), "{:?}", first);
    assert!(stdout(&first).contains("Database initialized successfully."));
    assert!(stdout(&first).contains("Bucket 'test-assets' is ready."));

    let second = run(&config, &["init"]);
    assert!(second.status.success());
}

#[test]
fn test_upload_list_status_flow() {
    let (tmp, config) = setup_test_env();
    assert!(run(&config, &["init"]).status.success());

    let file = tmp.path().join("files/invoice.txt");
    let upload = run(&config, &["upload", file.to_str().unwrap()]);
    assert!(upload.status.success(), "{:?}", upload);
    let out = stdout(&upload);
    assert!(out.contains("Uploaded invoice.txt"));
    assert!(out.contains("status: PENDING"));

    let id = out
        .lines()
        .find_map(|l| l.trim().strip_prefix("id:"))
        .map(|s| s.trim().to_string())
        .expect("upload prints the asset id");

    let list = run(&config, &["assets", "list", "--status", "pending"]);
    assert!(list.status.success());
    assert!(stdout(&list).contains(&id));
    assert!(stdout(&list).starts_with("1 assets"));

    let status = run(&config, &["status", &id]);
    assert!(status.status.success());
    assert!(stdout(&status).contains("stage=QUEUED"));

    // pending assets are not searchable yet
    let search = run(&config, &["search", "invoice"]);
    assert!(search.status.success());
    assert!(stdout(&search).contains("No results."));
}

#[test]
fn test_upload_rejects_unsupported_type() {
    let (tmp, config) = setup_test_env();
    assert!(run(&config, &["init"]).status.success());

    let file = tmp.path().join("files/clip.mp4");
    let output = run(&config, &["upload", file.to_str().unwrap(), "--mime", "video/mp4"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid file type"));
}

#[test]
fn test_missing_asset_fails() {
    let (_tmp, config) = setup_test_env();
    assert!(run(&config, &["init"]).status.success());

    let output = run(&config, &["assets", "get", "does-not-exist"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("asset not found"));
}
