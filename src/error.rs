use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// the `when` of an alarm is neither seconds, a cron expression nor an iso timestamp
    #[error("invalid alarm time specification: `{0}`")]
    InvalidWhen(String),
    #[error("no such media file: {}", .0.display())]
    MissingMedia(PathBuf),
    #[error("alarm `{0}` has media configured but no media plugin")]
    NoMediaPlugin(String),
    #[error("no media plugin named `{0}` is configured")]
    UnknownMediaPlugin(String),
    #[error("no alarm named `{0}`")]
    NoSuchAlarm(String),
    #[error("no alarm is currently running")]
    NoRunningAlarm,
    #[error("media player error: {0}")]
    Player(String),
    #[error("action `{action}` failed: {reason}")]
    Action { action: String, reason: String },
    #[error("couldn't read or write config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("couldn't parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("couldn't serialize config: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
    #[error("couldn't find a config directory")]
    NoConfigDir,
}
