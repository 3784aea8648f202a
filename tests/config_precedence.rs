use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::atomic::{AtomicU64, Ordering};

const BHPOLL_ENV: &[&str] = &[
    "BHPOLL_CONFIG",
    "BHPOLL_BLOODHOUND_BASE_URL",
    "BHPOLL_BLOODHOUND_TOKEN_ID",
    "BHPOLL_BLOODHOUND_TOKEN_KEY",
    "BHPOLL_SOAR_BASE_URL",
    "BHPOLL_SOAR_AUTH_TOKEN",
    "BHPOLL_SOAR_ASSET_ID",
    "BHPOLL_SOAR_CONTAINER_LABEL",
    "BHPOLL_POLL_MAX_CONTAINERS",
    "BHPOLL_POLL_MAX_ARTIFACTS",
    "BHPOLL_POLL_REQUEST_TIMEOUT_SECS",
];

fn bhpoll_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_bhpoll"));
    cmd.env("HOME", home);
    cmd.env_remove("RUST_LOG");
    for key in BHPOLL_ENV {
        cmd.env_remove(key);
    }
    cmd
}

fn run(home: &Path, args: &[&str]) -> Output {
    bhpoll_cmd(home).args(args).output().expect("run bhpoll")
}

fn make_temp_home() -> PathBuf {
    static HOME_SEQ: AtomicU64 = AtomicU64::new(0);

    let temp = std::env::temp_dir();
    let seq = HOME_SEQ.fetch_add(1, Ordering::Relaxed);
    let uniq = format!("bhpoll-config-test-{}-{seq}", std::process::id());
    let home = temp.join(uniq);
    let _ = std::fs::remove_dir_all(&home);
    std::fs::create_dir_all(&home).expect("create home");
    home
}

fn write_file(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("mkdirs");
    }
    std::fs::write(path, bytes).expect("write");
}

fn show_json(home: &Path, extra: &[&str]) -> serde_json::Value {
    let mut args = vec!["config", "--show", "--json"];
    args.extend_from_slice(extra);
    let out = run(home, &args);
    assert!(
        out.status.success(),
        "stderr={}",
        String::from_utf8_lossy(&out.stderr)
    );
    serde_json::from_slice(&out.stdout).expect("parse json")
}

#[test]
fn defaults_apply_without_a_config_file() {
    let home = make_temp_home();
    let v = show_json(&home, &[]);
    assert_eq!(v["soar"]["container_label"], "events");
    assert_eq!(v["poll"]["request_timeout_secs"], 60);
    assert!(v["poll"].get("max_containers").is_none());
    assert!(v.get("config_path").is_none());
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn config_file_values_are_shown_with_secrets_masked() {
    let home = make_temp_home();
    write_file(
        home.join(".config/bhpoll/config.toml").as_path(),
        br#"
[bloodhound]
base_url = "https://bhe.example.com"
token_id = "tid-1"
token_key = "supersecret"

[soar]
auth_token = "soar-token"
asset_id = 42

[poll]
max_artifacts = 100
"#,
    );

    let out = run(&home, &["config", "--show"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(!stdout.contains("supersecret"), "stdout={stdout}");
    assert!(!stdout.contains("soar-token"), "stdout={stdout}");
    assert!(stdout.contains("token_id = \"tid-1\""), "stdout={stdout}");
    assert!(stdout.contains("asset_id = 42"), "stdout={stdout}");

    let v = show_json(&home, &[]);
    assert_eq!(v["bloodhound"]["token_key"], "********");
    assert_eq!(v["poll"]["max_artifacts"], 100);
    assert!(
        v["config_path"]
            .as_str()
            .is_some_and(|p| p.ends_with(".config/bhpoll/config.toml"))
    );
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn explicit_config_flag_beats_env_and_default_path() {
    let home = make_temp_home();
    write_file(
        home.join(".config/bhpoll/config.toml").as_path(),
        b"[soar]\ncontainer_label = \"from-default\"\n",
    );
    let env_path = home.join("env.toml");
    write_file(&env_path, b"[soar]\ncontainer_label = \"from-env-path\"\n");
    let flag_path = home.join("flag.toml");
    write_file(&flag_path, b"[soar]\ncontainer_label = \"from-flag\"\n");

    let out = bhpoll_cmd(&home)
        .env("BHPOLL_CONFIG", &env_path)
        .args(["config", "--show", "--json"])
        .output()
        .expect("run bhpoll");
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse json");
    assert_eq!(v["soar"]["container_label"], "from-env-path");

    let flag = flag_path.display().to_string();
    let out = bhpoll_cmd(&home)
        .env("BHPOLL_CONFIG", &env_path)
        .args(["config", "--show", "--json", "--config", flag.as_str()])
        .output()
        .expect("run bhpoll");
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse json");
    assert_eq!(v["soar"]["container_label"], "from-flag");
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn missing_explicit_config_exits_2() {
    let home = make_temp_home();
    let missing = home.join("nope.toml").display().to_string();
    let out = run(&home, &["config", "--show", "--config", missing.as_str()]);
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn malformed_config_exits_2() {
    let home = make_temp_home();
    write_file(
        home.join(".config/bhpoll/config.toml").as_path(),
        b"[soar\nasset_id = ",
    );
    let out = run(&home, &["config", "--show"]);
    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("TOML"), "stderr={stderr}");
    let _ = std::fs::remove_dir_all(&home);
}
