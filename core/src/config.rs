use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use chat_api::ChatUser;
use chrono_tz::Tz;
use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

use crate::{cli::Cli, session::Timing, taunts::DEFAULT_TAUNTS};

pub const DEFAULT_CONFIG_PATH: &str = "config/typing_record_bot.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("missing required config field `{0}`")]
    MissingField(&'static str),
    #[error("unknown timezone `{0}`")]
    InvalidTimezone(String),
    #[error("taunt probability {0} is outside 0..=1")]
    InvalidProbability(f64),
    #[error("invalid value `{value}` for {var}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Runtime configuration resolved from CLI, environment, config file and defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// The user whose typing is watched.
    pub tracked_user: ChatUser,
    /// Account allowed to run owner-only commands.
    pub owner: Option<ChatUser>,
    pub timezone: Tz,
    pub record_file: PathBuf,
    /// Gateway address; the bot talks over stdio when unset.
    pub connect: Option<String>,
    pub timing: Timing,
    pub taunts: Vec<String>,
    pub logging_enabled: bool,
    pub log_level: String,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    tracked_user: Option<FileUser>,
    owner: Option<FileUser>,
    timezone: Option<String>,
    record_file: Option<PathBuf>,
    connect: Option<String>,
    #[serde(default)]
    timing: FileTiming,
    #[serde(default)]
    taunts: FileTaunts,
    #[serde(default)]
    logging: FileLogging,
}

#[derive(Deserialize)]
struct FileUser {
    name: Option<String>,
    discriminator: Option<String>,
}

#[derive(Deserialize)]
struct FileTiming {
    #[serde(default = "default_grace")]
    grace_period_secs: u64,
    #[serde(default = "default_stop_base")]
    stop_base_secs: u64,
    #[serde(default = "default_stop_step")]
    stop_step_secs: u64,
    #[serde(default = "default_probability")]
    taunt_probability: f64,
}

#[derive(Deserialize)]
struct FileTaunts {
    #[serde(default = "default_taunts")]
    messages: Vec<String>,
}

#[derive(Deserialize)]
struct FileLogging {
    #[serde(default = "default_logging")]
    enabled: bool,
    #[serde(default = "default_level")]
    level: String,
}

fn default_grace() -> u64 {
    45
}

fn default_stop_base() -> u64 {
    30
}

fn default_stop_step() -> u64 {
    15
}

fn default_probability() -> f64 {
    1.0
}

fn default_taunts() -> Vec<String> {
    DEFAULT_TAUNTS.iter().map(|s| s.to_string()).collect()
}

fn default_logging() -> bool {
    true
}

fn default_level() -> String {
    "info".into()
}

impl Default for FileTiming {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace(),
            stop_base_secs: default_stop_base(),
            stop_step_secs: default_stop_step(),
            taunt_probability: default_probability(),
        }
    }
}

impl Default for FileTaunts {
    fn default() -> Self {
        Self {
            messages: default_taunts(),
        }
    }
}

impl Default for FileLogging {
    fn default() -> Self {
        Self {
            enabled: default_logging(),
            level: default_level(),
        }
    }
}

fn user(file: Option<FileUser>, field: &'static str) -> Result<Option<ChatUser>, ConfigError> {
    let Some(file) = file else {
        return Ok(None);
    };
    match (file.name, file.discriminator) {
        (Some(name), Some(discriminator)) => Ok(Some(ChatUser {
            name,
            discriminator,
        })),
        _ => Err(ConfigError::MissingField(field)),
    }
}

fn read_file(path: &Path) -> Result<Option<FileConfig>, ConfigError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    toml::from_str(&contents)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

impl Config {
    /// Resolve configuration from CLI, environment variables, config file and defaults.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        // config file path precedence: CLI -> ENV -> default
        let config_path = cli
            .config
            .clone()
            .or_else(|| std::env::var("TYPING_BOT_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        let file = read_file(&config_path)?.unwrap_or_default();

        let tracked_user = user(file.tracked_user, "tracked_user.name/discriminator")?
            .ok_or(ConfigError::MissingField("tracked_user"))?;
        let owner = user(file.owner, "owner.name/discriminator")?;

        let timezone = match file.timezone {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| ConfigError::InvalidTimezone(name))?,
            None => Tz::UTC,
        };

        let probability = file.timing.taunt_probability;
        if !(0.0..=1.0).contains(&probability) {
            return Err(ConfigError::InvalidProbability(probability));
        }
        let timing = Timing {
            grace_period: Duration::from_secs(file.timing.grace_period_secs),
            stop_base: Duration::from_secs(file.timing.stop_base_secs),
            stop_step: Duration::from_secs(file.timing.stop_step_secs),
            taunt_probability: probability,
        };

        // environment overrides, then CLI overrides
        let mut record_file = file.record_file.unwrap_or_else(default_record_file);
        if let Ok(p) = std::env::var("TYPING_BOT_RECORD_FILE") {
            record_file = PathBuf::from(p);
        }
        if let Some(p) = &cli.record_file {
            record_file = p.clone();
        }

        let mut connect = file.connect;
        if let Ok(addr) = std::env::var("TYPING_BOT_CONNECT") {
            connect = Some(addr);
        }
        if let Some(addr) = &cli.connect {
            connect = Some(addr.clone());
        }

        let mut logging_enabled = file.logging.enabled;
        if let Ok(l) = std::env::var("TYPING_BOT_LOGGING") {
            logging_enabled = l.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "TYPING_BOT_LOGGING",
                value: l,
            })?;
        }
        if let Some(l) = cli.logging {
            logging_enabled = l;
        }

        Ok(Self {
            tracked_user,
            owner,
            timezone,
            record_file,
            connect,
            timing,
            taunts: file.taunts.messages,
            logging_enabled,
            log_level: file.logging.level,
        })
    }
}

/// Default location of the record file inside the platform data directory.
pub fn default_record_file() -> PathBuf {
    match ProjectDirs::from("org", "typing-record-bot", "typing-record-bot") {
        Some(dirs) => dirs.data_dir().join("typing_record.json"),
        None => PathBuf::from("typing_record.json"),
    }
}
