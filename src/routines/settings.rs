use crate::error::{FactorError, Result};
use crate::routines::output::OutputFile;
use anyhow::{bail, Context};
use config::Config as eConfig;
use serde::{Deserialize, Serialize};

/// Contains all settings for a factorization run
#[derive(Debug, Deserialize, Clone, Serialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Settings {
    /// Hyperparameters of the streaming factorization
    pub config: Config,
    /// Configuration for logging
    pub log: Log,
    /// Configuration for the output files
    pub output: Output,
}

impl Settings {
    pub fn new() -> Self {
        Settings::default()
    }

    /// Validate the settings
    ///
    /// Fails fast with [FactorError::Config] so an invalid configuration
    /// never reaches the fitting state machine.
    pub fn validate(&self) -> Result<()> {
        self.config.validate()
    }

    /// Writes a copy of the parsed settings to `settings.json` in the output folder
    pub fn write(&self) -> anyhow::Result<()> {
        let serialized =
            serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        let outputfile = OutputFile::new(&self.output.path, "settings.json")?;
        let mut file = outputfile.file;
        std::io::Write::write_all(&mut file, serialized.as_bytes())?;
        Ok(())
    }
}

/// Hyperparameters of the streaming factorization
#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Number of dictionary components (rows) to learn
    pub n_components: usize,
    /// Feature subsampling factor
    ///
    /// Every iteration updates a random subset of `n_features / reduction`
    /// feature columns; subset contributions are rescaled by `reduction` so
    /// the gradient estimate stays unbiased. A value of 1 disables
    /// subsampling.
    pub reduction: usize,
    /// Ridge penalty used by the code solver
    pub alpha: f64,
    /// Exponent of the learning-rate decay schedule
    ///
    /// The forgetting weight of sample `t` is `t^-learning_rate`. Must lie in
    /// (0.5, 1] for the averaged statistics to converge.
    pub learning_rate: f64,
    /// Number of samples per mini-batch
    pub batch_size: usize,
    /// Number of passes over the sample stream
    pub n_epochs: usize,
    /// Seed for the random number generator
    pub random_state: u64,
    /// Size of the worker pool used for the parallel solve phases
    pub n_jobs: usize,
    /// Verbosity of per-batch diagnostics (0 disables them)
    pub verbose: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            n_components: 10,
            reduction: 1,
            alpha: 0.1,
            learning_rate: 0.92,
            batch_size: 50,
            n_epochs: 1,
            random_state: 42,
            n_jobs: 1,
            verbose: 0,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.n_components == 0 {
            return Err(FactorError::Config {
                parameter: "n_components",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.reduction == 0 {
            return Err(FactorError::Config {
                parameter: "reduction",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.alpha > 0.0) {
            return Err(FactorError::Config {
                parameter: "alpha",
                reason: format!("must be positive, got {}", self.alpha),
            });
        }
        if !(self.learning_rate > 0.5 && self.learning_rate <= 1.0) {
            return Err(FactorError::Config {
                parameter: "learning_rate",
                reason: format!("must lie in (0.5, 1], got {}", self.learning_rate),
            });
        }
        if self.batch_size == 0 {
            return Err(FactorError::Config {
                parameter: "batch_size",
                reason: "must be positive".to_string(),
            });
        }
        if self.n_epochs == 0 {
            return Err(FactorError::Config {
                parameter: "n_epochs",
                reason: "must be positive".to_string(),
            });
        }
        if self.n_jobs == 0 {
            return Err(FactorError::Config {
                parameter: "n_jobs",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Log {
    /// The maximum log level to display
    ///
    /// One of `trace`, `debug`, `info`, `warn` or `error`.
    pub level: String,
    /// The file to write the log to
    pub file: String,
    /// Whether to write logs
    ///
    /// If set to `false`, a global subscriber will not be set by the library.
    /// This can be useful when the caller installs its own subscriber, or
    /// when running benchmarks.
    pub write: bool,
}

impl Default for Log {
    fn default() -> Self {
        Log {
            level: String::from("info"),
            file: String::from("log.txt"),
            write: false,
        }
    }
}

/// Configuration for the output files
#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Output {
    /// Whether to write the output files
    pub write: bool,
    /// The (relative) path to write the output files to
    pub path: String,
}

impl Default for Output {
    fn default() -> Self {
        Output {
            write: false,
            path: String::from("outputs/"),
        }
    }
}

/// Parses the settings from a TOML configuration file
///
/// Entries in the TOML file may be overridden by environment variables
/// prefixed with `DLCORE_`, with a single underscore separating nested
/// entries.
pub fn read(path: impl Into<String>) -> anyhow::Result<Settings> {
    let settings_path = path.into();

    let parsed = eConfig::builder()
        .add_source(config::File::with_name(&settings_path).format(config::FileFormat::Toml))
        .add_source(config::Environment::with_prefix("DLCORE").separator("_"))
        .build()?;

    let settings: Settings = parsed.try_deserialize()?;

    settings.validate()?;

    if settings.output.write {
        if let Err(error) = settings.write() {
            bail!("Could not write settings to file: {}", error);
        }
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        assert!(Settings::new().validate().is_ok());
    }

    #[test]
    fn test_invalid_learning_rate() {
        let mut settings = Settings::new();
        settings.config.learning_rate = 0.5;
        assert!(matches!(
            settings.validate(),
            Err(FactorError::Config {
                parameter: "learning_rate",
                ..
            })
        ));
        settings.config.learning_rate = 1.0;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_invalid_batch_size() {
        let mut settings = Settings::new();
        settings.config.batch_size = 0;
        assert!(matches!(
            settings.validate(),
            Err(FactorError::Config {
                parameter: "batch_size",
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_reduction() {
        let mut settings = Settings::new();
        settings.config.reduction = 0;
        assert!(matches!(
            settings.validate(),
            Err(FactorError::Config {
                parameter: "reduction",
                ..
            })
        ));
    }
}
