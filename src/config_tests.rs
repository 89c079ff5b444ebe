//! Tests for configuration loading and validation

#[cfg(test)]
mod tests {
    use super::super::config::*;
    use crate::error::FabricError;
    use std::time::Duration;
    use tokio_test::assert_ok;

    const SAMPLE: &str = r#"
        [system]
        environment = "development"
        log_level = "debug"

        [storage]
        backend = "memory"

        [defaults]
        max_requests_per_window = 5
        rate_limit_window_secs = 1

        [[sources]]
        name = "binance"
        collection = "market_ticks"
        url = "https://api.binance.com/api/v3/ticker/price?symbol=BTCUSDT"
        id_field = "symbol"

        [[sources]]
        name = "fred"
        collection = "macro"
        url = "https://api.stlouisfed.org/fred/series/observations"
        api_key_env = "FRED_API_KEY"
        max_retries = 5
        interval_secs = 3600
    "#;

    fn sample() -> Config {
        toml::from_str(SAMPLE).expect("sample config parses")
    }

    fn problems(err: FabricError) -> Vec<String> {
        match err {
            FabricError::Configuration { problems } => problems,
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = sample();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.defaults.max_requests_per_window, 5);
        // untouched knobs keep their defaults
        assert_eq!(config.defaults.max_retries, 3);
        assert_eq!(config.defaults.max_errors_before_alert, 10);
        assert!(config.alerts.telegram.is_none());
        assert_eq!(config.sources.len(), 2);
    }

    #[test]
    fn test_settings_for_applies_overrides() {
        let config = sample();
        let binance = config.settings_for(&config.sources[0]);
        assert_eq!(binance.source_name, "binance");
        assert_eq!(binance.max_requests_per_window, 5);
        assert_eq!(binance.rate_limit_window, Duration::from_secs(1));
        assert_eq!(binance.max_retries, 3);
        assert_eq!(binance.retry_base_delay, Duration::from_millis(5_000));

        let fred = config.settings_for(&config.sources[1]);
        assert_eq!(fred.max_retries, 5);
        assert_eq!(fred.interval, Duration::from_secs(3600));
        assert_eq!(fred.collection, "macro");
    }

    #[test]
    fn test_valid_config_passes() {
        assert_ok!(sample().validate_with(|_| None));
    }

    #[test]
    fn test_validation_reports_all_problems_at_once() {
        let mut config = sample();
        config.defaults.max_retries = 0;
        config.sources[0].url = String::new();
        config.sources[1].max_requests_per_window = Some(0);
        config.sources[1].name = "binance".to_string();

        let found = problems(config.validate_with(|_| None).unwrap_err());
        assert_eq!(found.len(), 4, "{:?}", found);
        assert!(found.iter().any(|p| p.contains("defaults.max_retries")));
        assert!(found.iter().any(|p| p.contains("sources[0].url")));
        assert!(found.iter().any(|p| p.contains("sources[1].max_requests_per_window")));
        assert!(found.iter().any(|p| p.contains("duplicated")));
    }

    #[test]
    fn test_production_requires_keys_and_alerts() {
        let mut config = sample();
        config.system.environment = "production".to_string();

        let found = problems(config.validate_with(|_| None).unwrap_err());
        assert!(found.iter().any(|p| p.contains("FRED_API_KEY")));
        assert!(found.iter().any(|p| p.contains("alerts.telegram")));

        config.alerts.telegram = Some(TelegramConfig {
            bot_token: "token".to_string(),
            chat_id: "chat".to_string(),
        });
        let ok = config.validate_with(|key| (key == "FRED_API_KEY").then(|| "k".to_string()));
        assert_ok!(ok);
    }

    #[test]
    fn test_missing_api_key_tolerated_outside_production() {
        let config = sample();
        assert!(!config.is_production());
        assert_ok!(config.validate_with(|_| None));
    }

    #[test]
    fn test_sqlite_path_directory_must_exist() {
        let mut config = sample();
        config.storage.backend = StorageBackend::Sqlite;
        config.storage.path = "/definitely/not/here/data.db".to_string();

        let found = problems(config.validate_with(|_| None).unwrap_err());
        assert!(found.iter().any(|p| p.contains("does not exist")));

        let dir = tempfile::tempdir().unwrap();
        config.storage.path = dir.path().join("data.db").display().to_string();
        assert_ok!(config.validate_with(|_| None));
    }

    #[test]
    fn test_no_sources_is_invalid() {
        let mut config = sample();
        config.sources.clear();
        let found = problems(config.validate_with(|_| None).unwrap_err());
        assert_eq!(found, vec!["no sources configured".to_string()]);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = Config::load(&path).expect("loads from disk");
        assert_eq!(config.sources[0].name, "binance");
        assert_eq!(config.system.log_level, "debug");
    }

    #[test]
    fn test_load_first_existing_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("data-fabric.toml");
        std::fs::write(&present, SAMPLE).unwrap();
        let missing = dir.path().join("missing.toml").display().to_string();
        let present = present.display().to_string();

        let config = Config::load_first(&[missing.as_str(), present.as_str()])
            .expect("falls through to second");
        assert_eq!(config.sources.len(), 2);

        assert!(Config::load_first(&[missing.as_str()]).is_err());
    }
}
