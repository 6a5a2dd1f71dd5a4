use std::collections::HashMap;
use std::time::Duration;

use playpulse::config::{ConfigError, ENV_ENDPOINT, ENV_PLAYER, ENV_STORE};
use playpulse::AggregatorConfig;

#[test]
fn test_defaults() {
    let config = AggregatorConfig::default();
    assert_eq!(config.max_retry_attempts, 3);
    assert_eq!(config.retry_delay(), Duration::from_secs(5));
    assert_eq!(config.connection_timeout(), Duration::from_secs(30));
    assert_eq!(config.max_offline_sessions, 100);
    assert!(config.send_on_scene_change);
    assert!(config.send_on_session_end);
    assert!(!config.send_on_interval);
    assert!(config.save_offline_data);
    assert!(config.game_scenes.iter().any(|s| s == "MathGame"));
    assert!(!config.game_scenes.iter().any(|s| s == "MainMenu"));
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_json_keeps_defaults() {
    let json = r#"{
        "endpoint_url": "http://collector/api",
        "max_retry_attempts": 5,
        "game_scenes": ["Maze"]
    }"#;
    let config = AggregatorConfig::from_json(json).unwrap();

    assert_eq!(config.endpoint_url, "http://collector/api");
    assert_eq!(config.max_retry_attempts, 5);
    assert_eq!(config.game_scenes, vec!["Maze".to_string()]);
    assert_eq!(config.max_offline_sessions, 100);
    assert_eq!(config.send_interval(), Duration::from_secs(300));
}

#[test]
fn test_malformed_json_is_an_error() {
    assert!(AggregatorConfig::from_json("{ not json").is_err());
}

#[test]
fn test_overrides_ignore_empty_values() {
    let vars: HashMap<&str, &str> = [
        (ENV_ENDPOINT, "http://override/api"),
        (ENV_PLAYER, "  "),
        (ENV_STORE, "/tmp/pp.json"),
    ]
    .into_iter()
    .collect();
    let mut config = AggregatorConfig::default();
    config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

    assert_eq!(config.endpoint_url, "http://override/api");
    assert_eq!(config.player_name, "Player1");
    assert_eq!(config.store_path.to_str(), Some("/tmp/pp.json"));
}

#[test]
fn test_test_endpoint_switch() {
    let mut config = AggregatorConfig {
        test_endpoint_url: Some("http://staging/api".into()),
        ..AggregatorConfig::default()
    };
    assert_eq!(config.active_endpoint(), config.endpoint_url);

    config.use_test_endpoint = true;
    assert_eq!(config.active_endpoint(), "http://staging/api");
}

#[test]
fn test_validation_names_the_field() {
    let defaults = AggregatorConfig::default;
    let cases = [
        (
            AggregatorConfig {
                endpoint_url: " ".into(),
                ..defaults()
            },
            "endpoint_url",
        ),
        (
            AggregatorConfig {
                max_retry_attempts: 0,
                ..defaults()
            },
            "max_retry_attempts",
        ),
        (
            AggregatorConfig {
                max_offline_sessions: 0,
                ..defaults()
            },
            "max_offline_sessions",
        ),
        (
            AggregatorConfig {
                retry_delay_secs: f64::NAN,
                ..defaults()
            },
            "retry_delay_secs",
        ),
        (
            AggregatorConfig {
                use_test_endpoint: true,
                ..defaults()
            },
            "test_endpoint_url",
        ),
        (
            AggregatorConfig {
                send_on_interval: true,
                send_interval_secs: 0.0,
                ..defaults()
            },
            "send_interval_secs",
        ),
    ];

    for (config, expected) in cases {
        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected),
            Ok(()) => panic!("{expected} should be rejected"),
        }
    }
}

#[test]
fn test_load_reads_file() {
    let path = std::env::temp_dir().join(format!("playpulse_config_{}.json", uuid::Uuid::new_v4()));
    std::fs::write(&path, r#"{ "player_name": "Ayla", "max_offline_sessions": 7 }"#).unwrap();

    let config = AggregatorConfig::load(&path).unwrap();
    assert_eq!(config.max_offline_sessions, 7);

    let _ = std::fs::remove_file(&path);
    assert!(AggregatorConfig::load(&path).is_err());
}
