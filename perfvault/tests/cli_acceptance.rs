use perfvault_core::{ProfileStore, SqliteStore, Tables};
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::Duration;
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

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
        }
    }

    fn db_path(&self) -> PathBuf {
        self.xdg_data.join("perfvault/profiles.db")
    }

    fn write_config(&self, content: &str) {
        let dir = self.xdg_config.join("perfvault");
        fs::create_dir_all(&dir).expect("failed to create config dir");
        fs::write(dir.join("config.toml"), content).expect("failed to write config");
    }

    fn write_export(&self, lines: &[&str]) -> PathBuf {
        let path = self.home.join("export.jsonl");
        fs::write(&path, lines.join("\n")).expect("failed to write export");
        path
    }
}

fn export_line(id: &str, url: &str, request_ts: i64, wt: i64) -> String {
    format!(
        r#"{{"_id":"{id}","profile":{{"main()":{{"wt":{wt},"ct":1,"cpu":10,"mu":100,"pmu":200}}}},"meta":{{"url":"{url}","request_ts":{request_ts}}}}}"#
    )
}

fn run(env: &CliTestEnv, args: &[&str]) -> Output {
    Command::new(assert_cmd::cargo::cargo_bin!("perfvault"))
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute perfvault: {e}"))
}

fn assert_success(args: &[&str], output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if output.status.success() {
        return stdout;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "perfvault {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

fn run_ok(env: &CliTestEnv, args: &[&str]) -> String {
    let output = run(env, args);
    assert_success(args, &output)
}

#[test]
fn stats_on_fresh_store_reports_no_data() {
    let env = CliTestEnv::new();

    let stdout = run_ok(&env, &["stats"]);
    assert!(stdout.contains("No profiles stored"), "got:\n{stdout}");
    assert!(
        env.db_path().exists(),
        "database file should exist at {}",
        env.db_path().display()
    );
}

#[test]
fn import_list_and_delete_profiles() {
    let env = CliTestEnv::new();
    let first = export_line("aaaaaaaaaaaaaaaaaaaaaaa1", "/users?id=1", 1_700_000_000, 500);
    let second = export_line("aaaaaaaaaaaaaaaaaaaaaaa2", "/users?id=2", 1_700_000_100, 700);
    let third = export_line("aaaaaaaaaaaaaaaaaaaaaaa3", "/orders", 1_700_000_200, 900);
    let export = env.write_export(&[&first, &second, "", &third, &first]);
    let export = export.to_string_lossy().into_owned();

    let stdout = run_ok(&env, &["import", &export]);
    assert!(
        stdout.contains("Imported 3 profile(s), skipped 1 duplicate(s)"),
        "got:\n{stdout}"
    );

    let stdout = run_ok(&env, &["count", "--url", "/users"]);
    assert_eq!(stdout.trim(), "2");

    let stdout = run_ok(&env, &["list", "--url", "/users?id", "--direction", "asc"]);
    let first_pos = stdout.find("aaaaaaaaaaaaaaaaaaaaaaa1").expect("first profile listed");
    let second_pos = stdout.find("aaaaaaaaaaaaaaaaaaaaaaa2").expect("second profile listed");
    assert!(first_pos < second_pos, "ascending order expected:\n{stdout}");
    assert!(stdout.contains("Showing 2 of 2 profile(s)"));

    run_ok(&env, &["delete", "aaaaaaaaaaaaaaaaaaaaaaa1"]);

    let store = SqliteStore::open(&env.db_path(), Tables::default(), Duration::from_secs(1))
        .expect("failed to open db");
    assert!(store
        .get_by_id("aaaaaaaaaaaaaaaaaaaaaaa1")
        .unwrap_err()
        .is_not_found());
    assert_eq!(store.statistics().unwrap().profiles(), 2);
}

#[test]
fn show_missing_profile_fails() {
    let env = CliTestEnv::new();
    let output = run(&env, &["show", "missing"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not found"), "got:\n{stderr}");
}

#[test]
fn purge_requires_confirmation() {
    let env = CliTestEnv::new();
    let line = export_line("aaaaaaaaaaaaaaaaaaaaaaa1", "/a", 1_700_000_000, 1);
    let export = env.write_export(&[&line]);
    run_ok(&env, &["import", &export.to_string_lossy()]);

    let output = run(&env, &["purge"]);
    assert!(!output.status.success());

    let stdout = run_ok(&env, &["purge", "--yes"]);
    assert!(stdout.contains("Deleted 1 profile(s)"), "got:\n{stdout}");
}

#[test]
fn invalid_direction_is_rejected() {
    let env = CliTestEnv::new();
    let output = run(&env, &["list", "--direction", "sideways"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unsupported sort direction"), "got:\n{stderr}");
}

#[test]
fn watch_commands_manage_watches() {
    let env = CliTestEnv::new();

    let stdout = run_ok(&env, &["watch", "add", "App\\Controller::index"]);
    let id = stdout
        .trim()
        .strip_prefix("Added watch ")
        .expect("watch id printed")
        .to_string();

    run_ok(&env, &["watch", "update", &id, "App\\Controller::index", "--removed", "yes"]);
    let stdout = run_ok(&env, &["watch", "list"]);
    assert!(stdout.contains("removed (yes)"), "got:\n{stdout}");

    let stdout = run_ok(&env, &["watch", "update", "nope", "x"]);
    assert!(stdout.contains("No watch with id nope"));

    let stdout = run_ok(&env, &["watch", "clear"]);
    assert!(stdout.contains("Removed 1 watch(es)"));
}

#[test]
fn custom_table_names_from_config() {
    let env = CliTestEnv::new();
    env.write_config(
        r#"
[store]
profiles_table = "app_results"
watches_table = "app_watches"
"#,
    );

    run_ok(&env, &["watch", "add", "strlen"]);

    let store = SqliteStore::open(
        &env.db_path(),
        Tables::new("app_results", "app_watches").unwrap(),
        Duration::from_secs(1),
    )
    .expect("failed to open db");
    assert_eq!(store.all_watches().unwrap().count(), 1);
}

#[test]
fn bad_table_name_in_config_fails() {
    let env = CliTestEnv::new();
    env.write_config(
        r#"
[store]
profiles_table = "results; DROP TABLE x"
"#,
    );

    let output = run(&env, &["stats"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to load configuration"), "got:\n{stderr}");
}

#[test]
fn logs_to_dated_file_in_state_dir() {
    let env = CliTestEnv::new();
    run_ok(&env, &["stats"]);

    let today = chrono::Utc::now().date_naive().format("%Y-%m-%d");
    let log_file = env.xdg_state.join(format!("perfvault/perfvault.{today}.log"));
    assert!(log_file.exists(), "expected log file at {}", log_file.display());
}
