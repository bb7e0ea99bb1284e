//! Fakes for the collaborators an alarm talks to.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use crate::{
    action::{Action, ActionExecutor},
    alarm::AlarmContext,
    clock::Clock,
    communication::{EventBus, Message, MessageType},
    error::{Error, Result},
    media::{MediaPlayer, MediaPlayers, PlayerState, PlayerStatus},
};

pub const POLL: Duration = Duration::from_millis(20);

#[derive(Default)]
pub struct RecordingBus(Mutex<Vec<Message>>);

impl RecordingBus {
    pub fn kinds(&self) -> Vec<MessageType> {
        self.0.lock().unwrap().iter().map(|m| m.kind).collect()
    }
}

impl EventBus for RecordingBus {
    fn post(&self, message: Message) {
        self.0.lock().unwrap().push(message);
    }
}

/// records every action, fails the ones called `boom`
#[derive(Default)]
pub struct RecordingExecutor(Mutex<Vec<String>>);

impl RecordingExecutor {
    pub fn count(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn executed(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl ActionExecutor for RecordingExecutor {
    fn execute(&self, action: &Action) -> Result<()> {
        self.0.lock().unwrap().push(action.action.clone());
        if action.action == "boom" {
            Err(Error::Action {
                action: action.action.clone(),
                reason: "boom".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
pub struct FakePlayer {
    playing: Mutex<Option<String>>,
    volume: Mutex<Option<f32>>,
    plays: AtomicUsize,
    stops: AtomicUsize,
    /// status answers with garbage while set
    pub broken_status: AtomicBool,
    /// play takes a while to get going while set
    pub slow_play: AtomicBool,
}

impl FakePlayer {
    pub fn is_playing(&self) -> bool {
        self.playing.lock().unwrap().is_some()
    }

    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn volume(&self) -> Option<f32> {
        *self.volume.lock().unwrap()
    }
}

impl MediaPlayer for FakePlayer {
    fn play(&self, resource: &str) -> Result<()> {
        if self.slow_play.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(300));
        }
        *self.playing.lock().unwrap() = Some(resource.to_string());
        self.plays.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_volume(&self, volume: f32) -> Result<()> {
        *self.volume.lock().unwrap() = Some(volume);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        *self.playing.lock().unwrap() = None;
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn status(&self) -> Result<PlayerStatus> {
        if self.broken_status.load(Ordering::SeqCst) {
            return Ok(PlayerStatus::default());
        }
        let playing = self.playing.lock().unwrap().clone();
        Ok(PlayerStatus {
            state: Some(if playing.is_some() {
                PlayerState::Play
            } else {
                PlayerState::Stop
            }),
            resource: playing,
            volume: self.volume(),
        })
    }
}

pub struct Fakes {
    pub context: AlarmContext,
    pub bus: Arc<RecordingBus>,
    pub executor: Arc<RecordingExecutor>,
    pub player: Arc<FakePlayer>,
}

/// a context whose only media plugin is a [`FakePlayer`] called `fake`
pub fn fakes(clock: Arc<dyn Clock>) -> Fakes {
    let bus = Arc::new(RecordingBus::default());
    let executor = Arc::new(RecordingExecutor::default());
    let player = Arc::new(FakePlayer::default());
    let players = MediaPlayers::new().with("fake", player.clone());
    let context = AlarmContext::new(bus.clone(), executor.clone(), players)
        .with_clock(clock)
        .with_poll_interval(POLL);
    Fakes {
        context,
        bus,
        executor,
        player,
    }
}

pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < timeout {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
