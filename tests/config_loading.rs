//! Integration test: Configuration utilities
//!
//! Tests config path resolution and loading the listener YAML.

use channels_client::bin_common::{load_config_from_env, ConfigType};
use channels_client::channels::{AuthMethod, ClientConfig, Host};
use std::env;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(yaml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

#[test]
fn test_listener_config_path() {
    env::remove_var("CHANNELS_CONFIG_PATH");
    let config_path = load_config_from_env(ConfigType::Listener);
    assert_eq!(config_path.to_str().unwrap(), "config/channels.yaml");

    env::set_var("CHANNELS_CONFIG_PATH", "elsewhere/channels.yaml");
    let config_path = load_config_from_env(ConfigType::Listener);
    assert_eq!(config_path.to_str().unwrap(), "elsewhere/channels.yaml");
    env::remove_var("CHANNELS_CONFIG_PATH");
}

#[test]
fn test_custom_config() {
    let custom = ConfigType::Custom("custom/path.yaml".to_string());
    let config_path = load_config_from_env(custom);

    assert_eq!(config_path.to_str().unwrap(), "custom/path.yaml");
}

#[test]
fn test_shipped_config_parses() {
    let config = ClientConfig::load("config/channels.yaml").unwrap();
    assert_eq!(config.cluster.as_deref(), Some("mt1"));
    assert_eq!(config.channels, vec!["my-channel"]);

    let options = config.client_options();
    assert_eq!(options.host, Host::Cluster("mt1".to_string()));
    assert!(options.use_tls);
}

#[test]
fn test_load_self_hosted_config() {
    let file = write_config(
        "app_key: local-key\nhost: localhost\nport: 6001\nuse_tls: false\nauth_endpoint: http://localhost:8080/auth\nactivity_timeout_secs: 30\nchannels:\n  - a\n  - private-b\n",
    );

    let config = ClientConfig::load(file.path()).unwrap();
    assert_eq!(config.app_key, "local-key");
    assert_eq!(config.channels, vec!["a", "private-b"]);

    let options = config.client_options();
    assert_eq!(options.host, Host::Host("localhost".to_string()));
    assert_eq!(options.port, Some(6001));
    assert!(!options.use_tls);
    assert_eq!(options.activity_timeout, Some(Duration::from_secs(30)));
    assert!(matches!(options.auth_method, AuthMethod::Endpoint(_)));
    assert!(options
        .socket_url(&config.app_key)
        .starts_with("ws://localhost:6001/app/local-key?client="));
}

#[test]
fn test_invalid_config_is_rejected() {
    let file = write_config("app_key: k\ncluster: eu\nhost: localhost\n");
    assert!(ClientConfig::load(file.path()).is_err());

    let file = write_config("cluster: eu\n");
    assert!(ClientConfig::load(file.path()).is_err());
}

#[test]
fn test_missing_file_is_an_error() {
    assert!(ClientConfig::load("does/not/exist.yaml").is_err());
}

#[test]
fn test_load_with_secret_requires_env() {
    env::remove_var("CHANNELS_APP_SECRET");
    let file = write_config("app_key: k\ncluster: eu\n");

    assert!(ClientConfig::load(file.path()).is_ok());
    assert!(ClientConfig::load_with_secret(file.path()).is_err());
}
