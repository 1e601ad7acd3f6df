//! Integration tests for truss-config

use std::env;
use std::fs;
use std::path::PathBuf;
use truss_config::*;
use truss_core::AppOptions;

fn write_temp(name: &str, content: &str) -> PathBuf {
    let path = env::temp_dir().join(format!("truss-config-{}-{}", std::process::id(), name));
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_toml_file() {
    let path = write_temp(
        "app.toml",
        r#"
            version = 2
            prefix = "/api"
            port = 9000
        "#,
    );

    let manager = ConfigManager::new();
    manager.load_path(path.to_str().unwrap()).unwrap();
    let options: AppOptions = manager.load_validated().unwrap();

    assert_eq!(options.version, 2);
    assert_eq!(options.port, 9000);
    assert_eq!(options.mount_path(), "/api/v2");

    fs::remove_file(path).ok();
}

#[test]
fn test_load_json_file() {
    let path = write_temp("app.json", r#"{"host": "127.0.0.1", "method_override": false}"#);

    let manager = ConfigManager::new();
    manager
        .load_file(path.to_str().unwrap(), FileFormat::Json)
        .unwrap();
    let options: AppOptions = manager.load_validated().unwrap();

    assert_eq!(options.host, "127.0.0.1");
    assert!(!options.method_override);

    fs::remove_file(path).ok();
}

#[test]
fn test_missing_file() {
    let manager = ConfigManager::new();
    let result = manager.load_path("/nonexistent/truss/app.toml");
    assert!(matches!(result, Err(ConfigError::LoadError(_))));
}

#[test]
fn test_env_overrides_file() {
    let path = write_temp("layered.toml", "port = 9000\nversion = 3\n");

    unsafe {
        env::set_var("TRUSSLAYER_PORT", "9100");
        env::set_var("TRUSSLAYER_METHOD_OVERRIDE", "false");
    }

    let manager = ConfigManager::with_prefix("TRUSSLAYER");
    manager.load_path(path.to_str().unwrap()).unwrap();
    manager.load_env().unwrap();
    let options: AppOptions = manager.load_validated().unwrap();

    assert_eq!(options.port, 9100);
    assert_eq!(options.version, 3);
    assert!(!options.method_override);

    unsafe {
        env::remove_var("TRUSSLAYER_PORT");
        env::remove_var("TRUSSLAYER_METHOD_OVERRIDE");
    }
    fs::remove_file(path).ok();
}

#[test]
fn test_env_loader_with_prefix() {
    unsafe {
        env::set_var("TRUSSVAR_BODY_LIMIT", "2048");
    }

    let loader = EnvLoader::new(Some("TRUSSVAR".to_string()));
    assert_eq!(loader.load_var("body_limit").unwrap(), "2048");
    assert_eq!(
        loader.load().unwrap().get("body_limit").map(String::as_str),
        Some("2048")
    );

    unsafe {
        env::remove_var("TRUSSVAR_BODY_LIMIT");
    }
}

#[test]
fn test_invalid_file_fails_validation() {
    let path = write_temp("invalid.json", r#"{"prefix": "api"}"#);

    let manager = ConfigManager::new();
    manager.load_path(path.to_str().unwrap()).unwrap();
    let result = manager.load_validated::<AppOptions>();
    assert!(matches!(result, Err(ConfigError::ValidationError(_))));

    fs::remove_file(path).ok();
}
