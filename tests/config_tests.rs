use std::fs;

use tempfile::TempDir;

use work_pilot::config::{BackendKind, WorkConfig, WorkPaths};
use work_pilot::model::DeleteMode;

#[test]
fn test_default_config() {
    let config = WorkConfig::default();

    assert!((config.pipeline.confidence_threshold - 0.6).abs() < f32::EPSILON);
    assert!(config.pipeline.fast_path_enabled);

    assert_eq!(config.generation.backend, BackendKind::Anthropic);
    assert_eq!(config.generation.timeout_secs, 30);

    assert_eq!(config.bulk.delete_mode, DeleteMode::Soft);
    assert!(!config.bulk.abort_on_first_error);

    assert_eq!(config.turns.retry_multiplier, 3);
    assert_eq!(config.turns.max_retries, 2);
    assert!(!config.turns.complexity_estimation);

    assert!(config.store.persist);
}

#[tokio::test]
async fn test_save_and_load_round_trip() {
    let temp = TempDir::new().unwrap();
    let paths = WorkPaths::new(temp.path().to_path_buf());
    paths.ensure_dirs().await.unwrap();

    let mut config = WorkConfig::default();
    config.pipeline.confidence_threshold = 0.75;
    config.generation.backend = BackendKind::OpenAi;
    config.generation.api_url = Some("http://localhost:8080/v1/chat/completions".into());
    config.bulk.delete_mode = DeleteMode::Hard;
    config.turns.complexity_estimation = true;
    config.save(&paths.work_dir).await.unwrap();

    assert!(paths.config_file.exists());
    let loaded = WorkConfig::load(&paths.work_dir).await.unwrap();
    assert!((loaded.pipeline.confidence_threshold - 0.75).abs() < f32::EPSILON);
    assert_eq!(loaded.generation.backend, BackendKind::OpenAi);
    assert_eq!(
        loaded.generation.resolved_api_url(),
        "http://localhost:8080/v1/chat/completions"
    );
    assert_eq!(loaded.bulk.delete_mode, DeleteMode::Hard);
    assert!(loaded.turns.complexity_estimation);
}

#[tokio::test]
async fn test_partial_file_fills_defaults() {
    let temp = TempDir::new().unwrap();
    let paths = WorkPaths::new(temp.path().to_path_buf());
    paths.ensure_dirs().await.unwrap();
    fs::write(
        &paths.config_file,
        "[pipeline]\nconfidence_threshold = 0.55\n\n[turns]\nmax_retries = 4\n",
    )
    .unwrap();

    let config = WorkConfig::load(&paths.work_dir).await.unwrap();
    assert!((config.pipeline.confidence_threshold - 0.55).abs() < f32::EPSILON);
    assert_eq!(config.turns.max_retries, 4);
    assert_eq!(config.turns.retry_multiplier, 3);
    assert_eq!(config.turns.budgets.small, 8);
    assert!((config.pipeline.fallback_confidence - 0.5).abs() < f32::EPSILON);
}

#[tokio::test]
async fn test_retired_generation_keys_are_ignored() {
    let temp = TempDir::new().unwrap();
    let paths = WorkPaths::new(temp.path().to_path_buf());
    paths.ensure_dirs().await.unwrap();
    fs::write(
        &paths.config_file,
        "[generation]\ntimeout_secs = 12\nrate_limit_default_delay_secs = 60\nconnection_retry_delay_secs = 5\n",
    )
    .unwrap();

    let config = WorkConfig::load(&paths.work_dir).await.unwrap();
    assert_eq!(config.generation.timeout_secs, 12);
    let saved = toml::to_string(&config).unwrap();
    assert!(!saved.contains("retry_delay"));
}

#[tokio::test]
async fn test_missing_file_loads_defaults() {
    let temp = TempDir::new().unwrap();
    let config = WorkConfig::load(temp.path()).await.unwrap();
    assert!((config.pipeline.confidence_threshold - 0.6).abs() < f32::EPSILON);
}

#[tokio::test]
async fn test_invalid_values_are_rejected_on_load_and_save() {
    let temp = TempDir::new().unwrap();
    let paths = WorkPaths::new(temp.path().to_path_buf());
    paths.ensure_dirs().await.unwrap();
    fs::write(&paths.config_file, "[turns]\nretry_multiplier = 0\n").unwrap();

    let err = WorkConfig::load(&paths.work_dir).await.unwrap_err();
    assert!(err.to_string().contains("retry_multiplier"));

    let mut config = WorkConfig::default();
    config.generation.temperature = 3.0;
    assert!(config.save(&paths.work_dir).await.is_err());
}

#[test]
fn test_snapshot_path_lives_under_work_dir() {
    let paths = WorkPaths::new("/tmp/project".into());
    let config = WorkConfig::default();
    assert_eq!(
        paths.snapshot_file(&config.store),
        paths.work_dir.join("store.yaml")
    );
    assert!(paths.work_dir.ends_with(".work-pilot"));
}
