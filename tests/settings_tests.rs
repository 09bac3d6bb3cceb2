use anyhow::Result;
use dlcore::prelude::*;
use std::fs;
use std::path::PathBuf;

fn write_toml(name: &str, content: &str) -> Result<PathBuf> {
    let dir = std::env::temp_dir().join(format!("dlcore-test-{}", std::process::id()));
    fs::create_dir_all(&dir)?;
    let path = dir.join(name);
    fs::write(&path, content)?;
    Ok(path)
}

#[test]
fn test_read_toml_configuration() -> Result<()> {
    let path = write_toml(
        "valid.toml",
        r#"
[config]
n_components = 70
reduction = 12
alpha = 0.001
learning_rate = 0.92
batch_size = 200
n_epochs = 3
random_state = 7
n_jobs = 4

[log]
level = "debug"
"#,
    )?;

    let settings = settings::read(path.to_string_lossy())?;
    assert_eq!(settings.config.n_components, 70);
    assert_eq!(settings.config.reduction, 12);
    assert_eq!(settings.config.alpha, 0.001);
    assert_eq!(settings.config.batch_size, 200);
    assert_eq!(settings.config.n_jobs, 4);
    assert_eq!(settings.log.level, "debug");
    // Untouched sections keep their defaults
    assert!(!settings.output.write);
    Ok(())
}

#[test]
fn test_read_rejects_invalid_learning_rate() -> Result<()> {
    let path = write_toml(
        "bad_rate.toml",
        r#"
[config]
learning_rate = 0.3
"#,
    )?;
    assert!(settings::read(path.to_string_lossy()).is_err());
    Ok(())
}

#[test]
fn test_read_rejects_unknown_fields() -> Result<()> {
    let path = write_toml(
        "unknown.toml",
        r#"
[config]
n_compnents = 10
"#,
    )?;
    assert!(settings::read(path.to_string_lossy()).is_err());
    Ok(())
}

#[test]
fn test_settings_serialization_round_trip() -> Result<()> {
    let mut settings = Settings::new();
    settings.config.n_components = 25;
    settings.config.reduction = 5;

    let json = serde_json::to_string(&settings)?;
    assert!(json.contains("\"n_components\""));

    let deserialized: Settings = serde_json::from_str(&json)?;
    assert_eq!(deserialized.config.n_components, 25);
    assert_eq!(deserialized.config.reduction, 5);
    Ok(())
}
