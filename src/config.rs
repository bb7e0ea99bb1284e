use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    action::Action,
    alarm::{AlarmSpec, DEFAULT_POLL_INTERVAL, DEFAULT_SNOOZE_INTERVAL},
    error::{Error, Result},
    when::When,
};

pub const DEFAULT_MEDIA_PLUGIN: &str = "local";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// seconds between checks on the player and on finished alarms
    #[serde(default = "default_poll_interval")]
    pub poll_interval: f64,
    /// seconds, for alarms that don't set their own
    #[serde(default = "default_snooze_interval")]
    pub snooze_interval: f64,
    /// player used by alarms that have media but don't name a player
    #[serde(default = "default_media_plugin")]
    pub media_plugin: String,
    #[serde(default)]
    pub players: HashMap<String, PlayerConfig>,
    #[serde(default)]
    pub alarms: BTreeMap<String, AlarmConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct PlayerConfig {
    /// keep ringing until dismissed
    #[serde(default = "always_true")]
    pub repeat: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self { repeat: true }
    }
}

/// seconds from now, or a cron expression / iso timestamp
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum WhenConfig {
    Seconds(f64),
    Text(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AlarmConfig {
    pub when: WhenConfig,
    pub media: Option<String>,
    pub media_plugin: Option<String>,
    pub audio_volume: Option<f32>,
    /// seconds
    pub snooze_interval: Option<f64>,
    #[serde(default = "always_true")]
    pub enabled: bool,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Default for Config {
    fn default() -> Self {
        let mut actions = toml::Table::new();
        actions.insert("message".to_string(), "good morning".into());
        Self {
            poll_interval: default_poll_interval(),
            snooze_interval: default_snooze_interval(),
            media_plugin: default_media_plugin(),
            players: [(default_media_plugin(), PlayerConfig::default())]
                .into_iter()
                .collect(),
            alarms: [(
                "weekdays".to_string(),
                AlarmConfig {
                    when: WhenConfig::Text("0 7 * * 1-5".to_string()),
                    media: None,
                    media_plugin: None,
                    audio_volume: None,
                    snooze_interval: None,
                    enabled: false,
                    actions: vec![Action::new("log", actions)],
                },
            )]
            .into_iter()
            .collect(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// if the file can't be read or isn't a valid config
    pub fn load(path: &Path) -> Result<Self> {
        let config = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&config)?)
    }

    /// # Errors
    /// if the file or its directory can't be written
    pub fn save(&self, path: &Path) -> Result<()> {
        let config = toml::to_string(self)?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, config)?;
        Ok(())
    }

    /// # Errors
    /// if there is no home directory to put the config in
    pub fn config_path() -> Result<PathBuf> {
        let mut path = directories::ProjectDirs::from("", "", "roosty_alarm")
            .ok_or(Error::NoConfigDir)?
            .config_dir()
            .to_path_buf();
        path.push("config.toml");
        Ok(path)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        seconds(self.poll_interval)
            .filter(|interval| !interval.is_zero())
            .unwrap_or(DEFAULT_POLL_INTERVAL)
    }

    /// Every configured alarm turned into something an alarm can be built from,
    /// with the config wide defaults filled in. A broken alarm only fails itself.
    #[must_use]
    pub fn alarm_specs(&self) -> Vec<(String, Result<AlarmSpec>)> {
        self.alarms
            .iter()
            .map(|(name, alarm)| (name.clone(), alarm.to_spec(name, self)))
            .collect()
    }
}

impl AlarmConfig {
    /// # Errors
    /// if `when` can't be parsed
    pub fn to_spec(&self, name: &str, config: &Config) -> Result<AlarmSpec> {
        let when = match &self.when {
            WhenConfig::Seconds(seconds) => When::seconds(*seconds)?,
            WhenConfig::Text(text) => When::parse(text)?,
        };
        let media_plugin = self
            .media_plugin
            .clone()
            .or_else(|| self.media.as_ref().map(|_| config.media_plugin.clone()));
        let snooze_interval = self
            .snooze_interval
            .and_then(seconds)
            .or_else(|| seconds(config.snooze_interval))
            .unwrap_or(DEFAULT_SNOOZE_INTERVAL);
        Ok(AlarmSpec {
            name: Some(name.to_string()),
            when,
            media: self.media.clone(),
            media_plugin,
            audio_volume: self.audio_volume,
            snooze_interval,
            enabled: self.enabled,
            actions: self.actions.clone(),
        })
    }
}

fn seconds(seconds: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(seconds).ok()
}

#[inline]
#[must_use]
pub const fn always_true() -> bool {
    true
}

fn default_poll_interval() -> f64 {
    DEFAULT_POLL_INTERVAL.as_secs_f64()
}

fn default_snooze_interval() -> f64 {
    DEFAULT_SNOOZE_INTERVAL.as_secs_f64()
}

fn default_media_plugin() -> String {
    DEFAULT_MEDIA_PLUGIN.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
snooze_interval = 120

[players.local]
repeat = false

[alarms.coffee]
when = 300
actions = [{ action = "shell", args = { command = "true" } }]

[alarms.weekdays]
when = "0 7 * * 1-5"
media = "/usr/share/sounds/ring.mp3"
audio_volume = 60
snooze_interval = 30

[alarms.broken]
when = "not-a-date"
enabled = false
"#;

    fn sample() -> Config {
        toml::from_str(SAMPLE).unwrap()
    }

    #[test]
    fn defaults_fill_in_missing_fields() {
        let config = sample();
        assert_eq!(config.poll_interval(), DEFAULT_POLL_INTERVAL);
        assert_eq!(config.media_plugin, DEFAULT_MEDIA_PLUGIN);
        assert!(!config.players["local"].repeat);
        assert_eq!(config.alarms["coffee"].when, WhenConfig::Seconds(300.0));
        assert!(config.alarms["coffee"].enabled);
        assert!(!config.alarms["broken"].enabled);
    }

    #[test]
    fn alarms_become_specs() {
        let config = sample();
        let specs: HashMap<_, _> = config.alarm_specs().into_iter().collect();
        assert_eq!(specs.len(), 3);

        let coffee = specs["coffee"].as_ref().unwrap();
        assert_eq!(coffee.name.as_deref(), Some("coffee"));
        assert!(matches!(coffee.when, When::Relative(s) if s == 300.0));
        assert_eq!(coffee.snooze_interval, Duration::from_secs(120));
        assert_eq!(coffee.media_plugin, None);
        assert_eq!(coffee.actions.len(), 1);

        let weekdays = specs["weekdays"].as_ref().unwrap();
        assert!(weekdays.when.is_recurring());
        assert_eq!(weekdays.media_plugin.as_deref(), Some(DEFAULT_MEDIA_PLUGIN));
        assert_eq!(weekdays.audio_volume, Some(60.0));
        assert_eq!(weekdays.snooze_interval, Duration::from_secs(30));

        assert!(matches!(specs["broken"], Err(Error::InvalidWhen(_))));
    }

    #[test]
    fn nonsense_intervals_fall_back_to_defaults() {
        let config: Config = toml::from_str("poll_interval = -1\nsnooze_interval = -5").unwrap();
        assert_eq!(config.poll_interval(), DEFAULT_POLL_INTERVAL);
        let alarm = AlarmConfig {
            snooze_interval: Some(-1.0),
            ..sample().alarms["coffee"].clone()
        };
        assert_eq!(
            alarm.to_spec("coffee", &config).unwrap().snooze_interval,
            DEFAULT_SNOOZE_INTERVAL
        );
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config::new();
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
        assert!(Config::load(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "alarms = 3").unwrap();
        assert!(matches!(Config::load(&path), Err(Error::ConfigParse(_))));
    }
}
