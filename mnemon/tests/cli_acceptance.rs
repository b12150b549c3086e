use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_data).expect("failed to create XDG_DATA_HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        seed_claude_fixture(&home);

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
        }
    }

    fn store_root(&self) -> PathBuf {
        self.xdg_data.join("mnemon/store")
    }
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../mnemon-core/tests/fixtures")
        .join(name)
}

fn seed_claude_fixture(home: &Path) {
    let target = home.join(".claude/projects/test-project/session-c1.jsonl");
    fs::create_dir_all(target.parent().expect("missing fixture parent"))
        .expect("failed to create claude fixture directories");
    fs::copy(fixture("claude-code/session-c1.jsonl"), target).expect("failed to copy fixture");
}

fn run_mnemon(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("mnemon"));

    Command::new(bin_path)
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute mnemon: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "mnemon {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

#[test]
fn scan_ingests_claude_fixture_and_populates_store() {
    let env = CliTestEnv::new();

    let output = run_mnemon(&env, &["scan"]);
    assert_success(&["scan"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("Claude Code: 1 processed"),
        "expected scan summary in stdout, got:\n{stdout}"
    );
    assert!(stdout.contains("Store: 1 conversations"));

    let store_root = env.store_root();
    assert!(
        store_root.join("recent/records.jsonl").exists(),
        "store records should exist at {}",
        store_root.display()
    );

    // Second scan is a no-op thanks to the cursor
    let rescan = run_mnemon(&env, &["scan"]);
    assert_success(&["scan"], &rescan);
    let rescan_stdout = String::from_utf8_lossy(&rescan.stdout);
    assert!(rescan_stdout.contains("Store: 1 conversations"));
}

#[test]
fn status_migrate_and_verify_work_on_populated_store() {
    let env = CliTestEnv::new();

    let scan = run_mnemon(&env, &["scan"]);
    assert_success(&["scan"], &scan);

    let status = run_mnemon(&env, &["status"]);
    assert_success(&["status"], &status);
    let status_stdout = String::from_utf8_lossy(&status.stdout);
    assert!(status_stdout.contains("Conversations: 1"));
    assert!(status_stdout.contains("Claude Code"));

    // Fixture timestamps are far in the past, so a migration moves the record
    let migrate = run_mnemon(&env, &["migrate"]);
    assert_success(&["migrate"], &migrate);
    let migrate_stdout = String::from_utf8_lossy(&migrate.stdout);
    assert!(migrate_stdout.contains("Migration complete:"));

    let verify = run_mnemon(&env, &["status", "--verify"]);
    assert_success(&["status", "--verify"], &verify);
    let verify_stdout = String::from_utf8_lossy(&verify.stdout);
    assert!(verify_stdout.contains("Index verification: consistent"));
}

#[test]
fn import_ingests_export_file_without_deleting_it() {
    let env = CliTestEnv::new();

    let export = env.home.join("cursor-export.json");
    fs::copy(fixture("cursor-export.json"), &export).expect("failed to copy export fixture");
    let export_arg = export.to_string_lossy().into_owned();

    let args = ["import", "cursor_export", export_arg.as_str()];
    let output = run_mnemon(&env, &args);
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("Cursor Export: 1 processed"),
        "expected import summary in stdout, got:\n{stdout}"
    );
    assert!(export.exists(), "import must not delete the export file");
}
