use signalkit::config::ConfigLoader;
use std::{
    env, fs,
    path::PathBuf,
    sync::{Mutex, MutexGuard, OnceLock},
};
use tempfile::TempDir;

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    unsafe {
        env::remove_var("SIGNALKIT_PROFILE");
        env::remove_var("SIGNALKIT_API_BIND_ADDR");
        env::remove_var("SIGNALKIT_LOG_LEVEL");
        env::remove_var("SIGNALKIT_CRYPTO_KEY");
        env::remove_var("SIGNALKIT_SYNC_PR_LIMIT");
        env::remove_var("SIGNALKIT_SWEEP_INTERVAL_SECS");
        env::remove_var("SIGNALKIT_GITHUB_CLIENT_ID");
        env::remove_var("SIGNALKIT_GITHUB_CLIENT_SECRET");
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    let path = dir.path().join(name);
    fs::write(path, contents).unwrap();
}

#[test]
fn loads_defaults_when_no_env_present() {
    let _guard = env_guard();
    clear_env();

    // Set a valid crypto key for the test
    unsafe {
        env::set_var(
            "SIGNALKIT_CRYPTO_KEY",
            "YWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWE=",
        );
    }

    let loader = ConfigLoader::new();
    let cfg = loader.load().expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:8080");
    // Note: log_level might be "debug" if .env.local exists and sets it
    assert!(cfg.log_level == "info" || cfg.log_level == "debug");
    cfg.bind_addr().expect("default bind addr parses");
    clear_env();
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "SIGNALKIT_API_BIND_ADDR=127.0.0.1:3000\n");
    write_env_file(
        &temp_dir,
        ".env.test",
        "SIGNALKIT_API_BIND_ADDR=192.168.0.10:5000\n",
    );
    write_env_file(
        &temp_dir,
        ".env.test.local",
        "SIGNALKIT_API_BIND_ADDR=10.0.0.5:6000\n",
    );

    // Select profile via .env.local before profile-specific files load.
    write_env_file(
        &temp_dir,
        ".env.local",
        "SIGNALKIT_PROFILE=test\nSIGNALKIT_API_BIND_ADDR=127.0.0.1:4000\nSIGNALKIT_CRYPTO_KEY=YWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWE=\n",
    );

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with layered env files");

    assert_eq!(cfg.profile, "test");
    assert_eq!(cfg.api_bind_addr, "10.0.0.5:6000");
    clear_env();
}

#[test]
fn os_environment_has_highest_precedence() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "SIGNALKIT_API_BIND_ADDR=127.0.0.1:3000\n",
    );

    unsafe {
        env::set_var("SIGNALKIT_API_BIND_ADDR", "0.0.0.0:9090");
        env::set_var(
            "SIGNALKIT_CRYPTO_KEY",
            "YWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWE=",
        );
    }

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with env override");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:9090");

    clear_env();
}

#[test]
fn invalid_bind_addr_returns_error() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("SIGNALKIT_API_BIND_ADDR", "not-an-addr");
        env::set_var(
            "SIGNALKIT_CRYPTO_KEY",
            "YWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWE=",
        );
    }
    let loader = ConfigLoader::new();
    let err = loader.load().expect_err("invalid bind addr should fail");
    assert!(format!("{}", err).contains("invalid api bind address"));

    clear_env();
}

#[test]
fn github_settings_load_from_env_files() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "SIGNALKIT_CRYPTO_KEY=YWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWE=\n\
         SIGNALKIT_GITHUB_CLIENT_ID=  abc123  \n\
         SIGNALKIT_GITHUB_CLIENT_SECRET=shh\n\
         SIGNALKIT_SYNC_PR_LIMIT=50\n",
    );

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads GitHub settings");

    assert_eq!(cfg.github_client_id.as_deref(), Some("abc123"));
    assert_eq!(cfg.sync_pr_limit, 50);
    assert_eq!(cfg.github_api_base, "https://api.github.com");
    let redacted = cfg.redacted_json().unwrap();
    assert!(!redacted.contains("shh"));

    clear_env();
}

#[test]
fn out_of_range_sync_limit_is_rejected() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "SIGNALKIT_CRYPTO_KEY=YWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWE=\nSIGNALKIT_SYNC_PR_LIMIT=500\n",
    );

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let err = loader.load().expect_err("limit above 100 should fail");
    assert!(err.to_string().contains("sync pull request limit"));

    clear_env();
}

#[test]
fn non_local_profile_requires_github_credentials() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "SIGNALKIT_PROFILE=prod\nSIGNALKIT_CRYPTO_KEY=YWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWFhYWE=\n",
    );

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let err = loader.load().expect_err("prod without GitHub credentials should fail");
    assert!(err.to_string().contains("GitHub client ID is missing"));

    clear_env();
}
