//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `sporehub.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use sporehub_app::automation_engine::EngineSettings;
use sporehub_app::runtime::RuntimeSettings;
use sporehub_domain::error::{ConfigurationError, SporeHubError, ValidationError};
use sporehub_domain::id::RelayId;
use sporehub_domain::profile::{AutomationProfile, ProfilePreset};
use sporehub_domain::relay::{RelayDefinition, RelayRole, RelaySet};
use sporehub_domain::sensor::AggregatorSettings;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub sensors: SensorsConfig,
    pub profile: ProfileConfig,
    pub simulation: SimulationConfig,
    pub logging: LoggingConfig,
    /// Relay layout. The built-in eight-relay board when empty.
    pub relays: Vec<RelayConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tick_interval_ms: u64,
    /// Sensor data older than this pauses environmental relays.
    pub stale_after_secs: u64,
    pub command_capacity: usize,
    /// How long each relay stays energized during a self-test.
    pub self_test_pulse_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SensorsConfig {
    pub poll_interval_secs: u64,
    /// Consecutive failures before a sensor is excluded from averages.
    pub error_threshold: u32,
    pub max_reading_age_secs: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub preset: ProfilePreset,
    /// Exported profile JSON; takes precedence over `preset`.
    pub file: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub step_interval_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// One `[[relays]]` entry. Omitted fields take the relay builder defaults.
#[derive(Debug, Deserialize)]
pub struct RelayConfig {
    pub id: RelayId,
    pub name: String,
    pub channel: Option<u8>,
    pub visible: Option<bool>,
    #[serde(default)]
    pub depends_on: Vec<RelayId>,
    pub override_timeout_secs: Option<u32>,
    pub role: Option<RelayRole>,
}

impl RelayConfig {
    fn to_definition(&self) -> Result<RelayDefinition, SporeHubError> {
        let mut builder = RelayDefinition::builder(self.id).name(self.name.clone());
        if let Some(channel) = self.channel {
            builder = builder.channel(channel);
        }
        if let Some(visible) = self.visible {
            builder = builder.visible(visible);
        }
        for &master in &self.depends_on {
            builder = builder.depends_on(master);
        }
        if let Some(secs) = self.override_timeout_secs {
            builder = builder.override_timeout_secs(secs);
        }
        if let Some(role) = self.role {
            builder = builder.role(role);
        }
        builder.build()
    }
}

impl Config {
    /// Load configuration from `sporehub.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, an
    /// override does not parse, or a value is out of range.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("sporehub.toml")?;
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(
        &mut self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(val) = env("SPOREHUB_TICK_MS") {
            self.engine.tick_interval_ms = parse_env("SPOREHUB_TICK_MS", &val)?;
        }
        if let Some(val) = env("SPOREHUB_STALE_AFTER_SECS") {
            self.engine.stale_after_secs = parse_env("SPOREHUB_STALE_AFTER_SECS", &val)?;
        }
        if let Some(val) = env("SPOREHUB_PROFILE") {
            self.profile.preset = parse_env("SPOREHUB_PROFILE", &val)?;
        }
        if let Some(val) = env("SPOREHUB_PROFILE_FILE") {
            self.profile.file = Some(PathBuf::from(val));
        }
        if let Some(val) = env("SPOREHUB_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = env("RUST_LOG") {
            self.logging.filter = val;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("engine.tick_interval_ms", self.engine.tick_interval_ms),
            ("engine.stale_after_secs", self.engine.stale_after_secs),
            ("sensors.poll_interval_secs", self.sensors.poll_interval_secs),
            ("simulation.step_interval_secs", self.simulation.step_interval_secs),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Validation(format!("{field} must be non-zero")));
        }
        if self.engine.command_capacity == 0 {
            return Err(ConfigError::Validation(
                "engine.command_capacity must be non-zero".to_string(),
            ));
        }
        if self.sensors.error_threshold == 0 {
            return Err(ConfigError::Validation(
                "sensors.error_threshold must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            stale_after: secs_delta(self.engine.stale_after_secs),
        }
    }

    #[must_use]
    pub fn runtime_settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            tick_interval: Duration::from_millis(self.engine.tick_interval_ms),
            command_capacity: self.engine.command_capacity,
            self_test_pulse: Duration::from_millis(self.engine.self_test_pulse_ms),
        }
    }

    #[must_use]
    pub fn aggregator_settings(&self) -> AggregatorSettings {
        AggregatorSettings {
            error_threshold: self.sensors.error_threshold,
            max_reading_age: secs_delta(self.sensors.max_reading_age_secs),
        }
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.sensors.poll_interval_secs)
    }

    #[must_use]
    pub fn step_interval(&self) -> Duration {
        Duration::from_secs(self.simulation.step_interval_secs)
    }

    /// Build and validate the relay set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Relay`] for an invalid entry or
    /// [`ConfigError::RelaySet`] when the layout breaks a graph invariant.
    pub fn relay_set(&self) -> Result<RelaySet, ConfigError> {
        if self.relays.is_empty() {
            return Ok(RelaySet::standard());
        }
        let definitions = self
            .relays
            .iter()
            .map(RelayConfig::to_definition)
            .collect::<Result<Vec<_>, _>>()
            .map_err(ConfigError::Relay)?;
        RelaySet::new(definitions).map_err(ConfigError::from)
    }

    /// The profile to start with: the exported file if configured, else the
    /// preset.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile file cannot be read or is invalid.
    pub fn profile(&self) -> Result<AutomationProfile, ConfigError> {
        match &self.profile.file {
            Some(path) => load_profile(path),
            None => Ok(AutomationProfile::preset(self.profile.preset)),
        }
    }
}

fn load_profile(path: &Path) -> Result<AutomationProfile, ConfigError> {
    let json = std::fs::read_to_string(path).map_err(|source| ConfigError::ProfileIo {
        path: path.to_path_buf(),
        source,
    })?;
    AutomationProfile::import_json(&json).map_err(|source| ConfigError::Profile {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        name,
        value: value.to_string(),
    })
}

fn secs_delta(secs: u64) -> chrono::TimeDelta {
    chrono::TimeDelta::seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1000))
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            stale_after_secs: 120,
            command_capacity: 64,
            self_test_pulse_ms: 1000,
        }
    }
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            error_threshold: 5,
            max_reading_age_secs: 90,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            step_interval_secs: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "sporehubd=info,sporehub_app=info,sporehub_adapter_virtual=info".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    #[error("environment variable {name} has invalid value `{value}`")]
    InvalidEnv { name: &'static str, value: String },
    #[error("failed to read profile {}", path.display())]
    ProfileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid profile {}", path.display())]
    Profile {
        path: PathBuf,
        #[source]
        source: ValidationError,
    },
    #[error("invalid relay definition")]
    Relay(#[source] SporeHubError),
    #[error("invalid relay layout")]
    RelaySet(#[from] ConfigurationError),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
