//! The media playback capability alarms use to ring.

use std::{collections::HashMap, fmt, sync::Arc};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Play,
    Pause,
    Stop,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerStatus {
    /// `None` when the player couldn't tell
    pub state: Option<PlayerState>,
    pub resource: Option<String>,
    pub volume: Option<f32>,
}

impl PlayerStatus {
    #[must_use]
    pub const fn stopped() -> Self {
        Self {
            state: Some(PlayerState::Stop),
            resource: None,
            volume: None,
        }
    }

    /// anything other than an explicit stop counts as still playing
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.state == Some(PlayerState::Stop)
    }
}

pub trait MediaPlayer: Send + Sync {
    /// # Errors
    /// if the resource can't be played
    fn play(&self, resource: &str) -> Result<()>;

    /// `volume` is a percentage (0 - 100)
    ///
    /// # Errors
    /// if the player is unreachable
    fn set_volume(&self, volume: f32) -> Result<()>;

    /// # Errors
    /// if the player is unreachable
    fn stop(&self) -> Result<()>;

    /// # Errors
    /// if the player is unreachable
    fn status(&self) -> Result<PlayerStatus>;
}

/// media players by plugin name
#[derive(Clone, Default)]
pub struct MediaPlayers {
    players: HashMap<String, Arc<dyn MediaPlayer>>,
}

impl fmt::Debug for MediaPlayers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.players.keys()).finish()
    }
}

impl MediaPlayers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, player: Arc<dyn MediaPlayer>) -> Self {
        self.insert(name, player);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, player: Arc<dyn MediaPlayer>) {
        self.players.insert(name.into(), player);
    }

    /// # Errors
    /// if no player with that name is configured
    pub fn get(&self, name: &str) -> Result<Arc<dyn MediaPlayer>> {
        self.players
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownMediaPlugin(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.players.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silent;

    impl MediaPlayer for Silent {
        fn play(&self, _: &str) -> Result<()> {
            Ok(())
        }
        fn set_volume(&self, _: f32) -> Result<()> {
            Ok(())
        }
        fn stop(&self) -> Result<()> {
            Ok(())
        }
        fn status(&self) -> Result<PlayerStatus> {
            Ok(PlayerStatus::stopped())
        }
    }

    #[test]
    fn lookup_by_name() {
        let players = MediaPlayers::new().with("local", Arc::new(Silent));
        assert!(players.get("local").is_ok());
        assert!(matches!(
            players.get("kodi"),
            Err(Error::UnknownMediaPlugin(name)) if name == "kodi"
        ));
        assert_eq!(players.names().collect::<Vec<_>>(), ["local"]);
    }

    #[test]
    fn only_an_explicit_stop_is_stopped() {
        assert!(PlayerStatus::stopped().is_stopped());
        assert!(!PlayerStatus::default().is_stopped());
        let paused = PlayerStatus {
            state: Some(PlayerState::Pause),
            ..PlayerStatus::default()
        };
        assert!(!paused.is_stopped());
    }
}
