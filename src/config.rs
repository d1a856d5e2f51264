//! Settings file handling.
//!
//! The settings are stored at `$BALANCE_SHEET_HOME/settings.json` and hold what the settings
//! screen edits: where the backend lives, who the persons are, the monthly food budget and the
//! preselected position and location of the entry form.

use crate::model::{Amount, Location, Position};
use crate::{utils, Result};
use anyhow::{bail, ensure, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

const APP_NAME: &str = "balancesheet";
const CONFIG_VERSION: u8 = 1;
const SETTINGS_JSON: &str = "settings.json";

/// The `Settings` object represents the configuration of the app. You instantiate it by providing
/// the path to `$BALANCE_SHEET_HOME` and from there it loads `settings.json`.
#[derive(Debug, Clone)]
pub struct Settings {
    root: PathBuf,
    settings_path: PathBuf,
    settings_file: SettingsFile,
}

impl Settings {
    /// Creates the home directory and an initial `settings.json` pointing at `host:port`.
    ///
    /// # Errors
    /// - Returns an error if `host` is empty or if any file operations fail.
    pub async fn create(dir: impl Into<PathBuf>, host: &str, port: u16) -> Result<Self> {
        let maybe_relative = dir.into();
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the balancesheet home directory")?;
        let root = utils::canonicalize(&maybe_relative).await?;
        let settings_path = root.join(SETTINGS_JSON);

        let mut settings = Self {
            root,
            settings_path,
            settings_file: SettingsFile::default(),
        };
        settings.set_host(host)?;
        settings.set_port(port)?;
        settings.save().await?;
        Ok(settings)
    }

    /// Validates that the home directory and the settings file exist and loads the settings.
    pub async fn load(home: impl Into<PathBuf>) -> Result<Self> {
        let maybe_relative = home.into();
        let root = utils::canonicalize(&maybe_relative)
            .await
            .context("The balancesheet home directory is missing, run init first")?;

        let settings_path = root.join(SETTINGS_JSON);
        if !settings_path.is_file() {
            bail!(
                "The settings file is missing '{}'",
                settings_path.display()
            )
        }
        let settings_file = SettingsFile::load(&settings_path).await?;
        Ok(Self {
            root,
            settings_path,
            settings_file,
        })
    }

    /// Writes the current settings to `settings.json`.
    pub async fn save(&self) -> Result<()> {
        self.settings_file.save(&self.settings_path).await
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    pub fn host(&self) -> &str {
        &self.settings_file.host
    }

    pub fn port(&self) -> u16 {
        self.settings_file.port
    }

    /// `http://<host>:<port>`
    pub fn base_url(&self) -> Result<Url> {
        let s = format!("http://{}:{}", self.host(), self.port());
        Url::parse(&s).with_context(|| format!("'{s}' is not a valid backend address"))
    }

    pub fn persons(&self) -> &[String] {
        &self.settings_file.persons
    }

    /// The monthly food reserve per person, passed along with every per-person fetch.
    pub fn food_budget(&self) -> Amount {
        self.settings_file.food_budget
    }

    pub fn default_position(&self) -> &Position {
        &self.settings_file.default_position
    }

    pub fn default_location(&self) -> &Location {
        &self.settings_file.default_location
    }

    /// The deadline of a single request attempt.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(
            self.settings_file
                .timeout_ms
                .unwrap_or(DEFAULT_TIMEOUT_MS),
        )
    }

    /// How many times a failed request is retried.
    pub fn retries(&self) -> u32 {
        self.settings_file.retries.unwrap_or(DEFAULT_RETRIES)
    }

    pub fn set_host(&mut self, host: &str) -> Result<()> {
        let host = host.trim();
        ensure!(!host.is_empty(), "The host must not be empty");
        ensure!(
            !host.contains(['/', ' ', ':']),
            "The host '{host}' must be a bare host name or IP address"
        );
        self.settings_file.host = host.to_string();
        Ok(())
    }

    pub fn set_port(&mut self, port: u16) -> Result<()> {
        ensure!(port != 0, "The port must not be 0");
        self.settings_file.port = port;
        Ok(())
    }

    /// Replaces the persons. Each entry may itself hold several space separated names, the way
    /// the settings screen takes them.
    pub fn set_persons<S: AsRef<str>>(&mut self, persons: &[S]) {
        let mut names: Vec<String> = Vec::new();
        for name in persons.iter().flat_map(|p| p.as_ref().split_whitespace()) {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        self.settings_file.persons = names;
    }

    pub fn set_food_budget(&mut self, budget: &str) -> Result<()> {
        let amount = Amount::from_str(budget)
            .with_context(|| format!("'{budget}' is not a valid food budget"))?;
        ensure!(!amount.is_negative(), "The food budget must not be negative");
        self.settings_file.food_budget = amount;
        Ok(())
    }

    pub fn set_default_position(&mut self, position: Position) {
        self.settings_file.default_position = position;
    }

    pub fn set_default_location(&mut self, location: Location) {
        self.settings_file.default_location = location;
    }
}

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_RETRIES: u32 = 1;

/// Represents the serialization and deserialization format of the settings file.
///
/// Example settings:
/// ```json
/// {
///   "app_name": "balancesheet",
///   "config_version": 1,
///   "host": "192.168.0.10",
///   "port": 8080,
///   "persons": ["Bernd", "Julia"],
///   "food_budget": "350.00",
///   "default_position": "Essen",
///   "default_location": "Hollgasse 1/1"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
struct SettingsFile {
    /// Application name, should always be "balancesheet"
    app_name: String,

    /// Settings file version
    config_version: u8,

    host: String,

    port: u16,

    #[serde(default)]
    persons: Vec<String>,

    #[serde(default)]
    food_budget: Amount,

    #[serde(default)]
    default_position: Position,

    #[serde(default)]
    default_location: Location,

    /// Per-attempt request deadline in milliseconds, 30 seconds if not specified
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeout_ms: Option<u64>,

    /// Retries after a failed attempt, 1 if not specified
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retries: Option<u32>,
}

impl Default for SettingsFile {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            persons: Vec::new(),
            food_budget: Amount::ZERO,
            default_position: Position::default(),
            default_location: Location::default(),
            timeout_ms: None,
            retries: None,
        }
    }
}

impl SettingsFile {
    /// Loads and validates a settings file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or if it belongs to another app.
    async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let settings: SettingsFile = utils::deserialize(path.as_ref()).await?;
        ensure!(
            settings.app_name == APP_NAME,
            "Invalid app_name in settings file: expected '{}', got '{}'",
            APP_NAME,
            settings.app_name
        );
        Ok(settings)
    }

    async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let p = path.as_ref();
        let data = serde_json::to_string_pretty(self).context("Unable to serialize settings")?;
        utils::write(p, data)
            .await
            .context("Unable to write settings file")
    }
}
