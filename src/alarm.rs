//! A single alarm and the thread that rings it.
//!
//! ```text
//!   start()                     timer elapses, enabled
//!  ───────▶ WAITING ─────────────────────────────────▶ RUNNING
//!              ▲                                          │
//!              │   playback stopped / dismiss()           │ snooze()
//!              ├──────────────────────────────────────────┤
//!              │   next occurrence          SNOOZED ◀─────┘
//!              │                               │ snooze interval elapses
//!              │                               └────────▶ fires again
//!              │
//!    no next occurrence or stop() ──▶ SHUTDOWN
//! ```

use std::{
    fmt,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, OnceLock,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::{
    action::{execute_all, Action, ActionExecutor},
    clock::{Clock, SystemClock},
    communication::{EventBus, Message, MessageType},
    error::{Error, Result},
    media::{MediaPlayer, MediaPlayers},
    timer::{self, Signal, Timer},
    when::When,
};

pub const DEFAULT_SNOOZE_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmState {
    /// armed, waiting for the next fire time
    Waiting,
    /// fired, audio (if any) is playing
    Running,
    Dismissed,
    Snoozed,
    /// nothing will be armed anymore
    Shutdown,
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Waiting => "WAITING",
            Self::Running => "RUNNING",
            Self::Dismissed => "DISMISSED",
            Self::Snoozed => "SNOOZED",
            Self::Shutdown => "SHUTDOWN",
        })
    }
}

static PROCESS_UIDS: OnceLock<Uids> = OnceLock::new();

/// hands out alarm ids, unique across every clone
#[derive(Debug, Clone, Default)]
pub struct Uids(Arc<AtomicU64>);

impl Uids {
    /// a counter of its own, starting at 1
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// the counter shared by the whole process
    #[must_use]
    pub fn process() -> Self {
        PROCESS_UIDS.get_or_init(Self::new).clone()
    }

    #[must_use]
    pub fn get_uid(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Everything an alarm needs from the outside world.
#[derive(Clone)]
pub struct AlarmContext {
    pub bus: Arc<dyn EventBus>,
    pub executor: Arc<dyn ActionExecutor>,
    pub players: MediaPlayers,
    pub clock: Arc<dyn Clock>,
    /// process wide, wakes up every alarm thread
    pub shutdown: Signal,
    pub uids: Uids,
    pub poll_interval: Duration,
}

impl AlarmContext {
    /// Uses the system clock and the process wide id counter,
    /// so alarms built from different contexts still get distinct ids.
    #[must_use]
    pub fn new(
        bus: Arc<dyn EventBus>,
        executor: Arc<dyn ActionExecutor>,
        players: MediaPlayers,
    ) -> Self {
        Self {
            bus,
            executor,
            players,
            clock: Arc::new(SystemClock),
            shutdown: Signal::new(),
            uids: Uids::process(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_uids(mut self, uids: Uids) -> Self {
        self.uids = uids;
        self
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// what an alarm is built from
#[derive(Debug, Clone)]
pub struct AlarmSpec {
    /// defaults to `Alarm_<id>`
    pub name: Option<String>,
    pub when: When,
    /// file path or uri of the sound to play
    pub media: Option<String>,
    pub media_plugin: Option<String>,
    pub audio_volume: Option<f32>,
    pub snooze_interval: Duration,
    pub enabled: bool,
    pub actions: Vec<Action>,
}

impl AlarmSpec {
    #[must_use]
    pub const fn new(when: When) -> Self {
        Self {
            name: None,
            when,
            media: None,
            media_plugin: None,
            audio_volume: None,
            snooze_interval: DEFAULT_SNOOZE_INTERVAL,
            enabled: true,
            actions: Vec::new(),
        }
    }
}

/// snapshot of an alarm for whoever wants to look at it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlarmStatus {
    pub name: String,
    pub id: u64,
    pub when: String,
    pub next_run: Option<DateTime<Local>>,
    pub enabled: bool,
    pub state: Option<AlarmState>,
}

impl fmt::Display for AlarmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] when: {}", self.name, self.id, self.when)?;
        if let Some(next_run) = self.next_run {
            write!(f, ", next run: {}", next_run.format("%Y-%m-%d %H:%M:%S"))?;
        }
        if !self.enabled {
            write!(f, ", disabled")?;
        }
        match self.state {
            Some(state) => write!(f, ", {state}"),
            None => write!(f, ", not armed"),
        }
    }
}

#[derive(Debug)]
struct Cycle {
    /// `None` until the alarm is started
    state: Option<AlarmState>,
    /// snooze interval of the current snooze
    snooze_interval: Duration,
}

pub struct Alarm {
    id: u64,
    name: String,
    when: Mutex<When>,
    media: Option<String>,
    media_plugin: Option<String>,
    audio_volume: Option<f32>,
    snooze_interval: Duration,
    actions: Vec<Action>,
    enabled: AtomicBool,
    cycle: Mutex<Cycle>,
    timer: Mutex<Option<Timer>>,
    context: AlarmContext,
}

impl fmt::Debug for Alarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Alarm")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Alarm {
    /// # Errors
    /// if the media file doesn't exist, or there is media but no plugin to play it with
    pub fn new(spec: AlarmSpec, context: AlarmContext) -> Result<Arc<Self>> {
        let id = context.uids.get_uid();
        let name = spec
            .name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("Alarm_{id}"));
        let media = spec.media.as_deref().map(normalize_media).transpose()?;
        if media.is_some() && spec.media_plugin.is_none() {
            return Err(Error::NoMediaPlugin(name));
        }
        Ok(Arc::new(Self {
            id,
            name,
            when: Mutex::new(spec.when),
            media,
            media_plugin: spec.media_plugin,
            audio_volume: spec.audio_volume,
            snooze_interval: spec.snooze_interval,
            actions: spec.actions,
            enabled: AtomicBool::new(spec.enabled),
            cycle: Mutex::new(Cycle {
                state: None,
                snooze_interval: spec.snooze_interval,
            }),
            timer: Mutex::new(None),
            context,
        }))
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn media(&self) -> Option<&str> {
        self.media.as_deref()
    }

    #[must_use]
    pub fn state(&self) -> Option<AlarmState> {
        crate::lock(&self.cycle).state
    }

    fn set_state(&self, state: AlarmState) {
        crate::lock(&self.cycle).state = Some(state);
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// only looked at when the alarm fires
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn enable(&self) {
        self.set_enabled(true);
    }

    pub fn disable(&self) {
        self.set_enabled(false);
    }

    /// next fire time as of now, without pinning a relative `when`
    #[must_use]
    pub fn next_run(&self) -> Option<DateTime<Local>> {
        crate::lock(&self.when).peek(&self.context.clock.now())
    }

    fn resolve_next(&self, now: &DateTime<Local>) -> Option<DateTime<Local>> {
        crate::lock(&self.when).resolve(now)
    }

    /// true once the alarm's thread is gone, or if it never had one
    #[must_use]
    pub fn is_finished(&self) -> bool {
        crate::lock(&self.timer)
            .as_ref()
            .map_or(true, Timer::is_finished)
    }

    #[must_use]
    pub fn status(&self) -> AlarmStatus {
        let when = crate::lock(&self.when).to_string();
        AlarmStatus {
            name: self.name.clone(),
            id: self.id,
            when,
            next_run: self.next_run(),
            enabled: self.is_enabled(),
            state: self.state(),
        }
    }

    /// Arms the alarm for its next occurrence.
    ///
    /// Without an upcoming occurrence the alarm goes straight to [`AlarmState::Shutdown`].
    /// Starting an alarm that was shut down does nothing.
    ///
    /// # Errors
    /// if the timer thread couldn't be spawned
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.state() == Some(AlarmState::Shutdown) {
            debug!("alarm {} was shut down, not starting it again", self.name);
            return Ok(());
        }
        let mut timer = crate::lock(&self.timer);
        if let Some(old) = timer.take() {
            old.cancel();
        }
        let now = self.context.clock.now();
        let Some(next) = self.resolve_next(&now) else {
            info!("alarm {} has no upcoming run", self.name);
            self.set_state(AlarmState::Shutdown);
            return Ok(());
        };
        let delay = (next - now).to_std().unwrap_or_default();
        self.set_state(AlarmState::Waiting);
        let alarm = Arc::clone(self);
        match Timer::spawn(
            format!("alarm-{}", self.id),
            delay,
            self.context.shutdown.clone(),
            move |cancel| alarm.run(cancel),
        ) {
            Ok(armed) => *timer = Some(armed),
            Err(err) => {
                self.set_state(AlarmState::Shutdown);
                return Err(err.into());
            }
        }
        info!("alarm {} armed for {next}", self.name);
        Ok(())
    }

    /// Shuts the alarm down for good and cancels its timer. A ringing alarm is silenced.
    pub fn stop(&self) {
        let previous = crate::lock(&self.cycle).state.replace(AlarmState::Shutdown);
        if previous == Some(AlarmState::Running) {
            self.stop_audio();
        }
        if let Some(timer) = crate::lock(&self.timer).as_ref() {
            timer.cancel();
        }
    }

    /// Cancels the current ring. Returns false if the alarm wasn't running.
    pub fn dismiss(&self) -> bool {
        {
            let mut cycle = crate::lock(&self.cycle);
            if cycle.state != Some(AlarmState::Running) {
                debug!("alarm {} isn't running, nothing to dismiss", self.name);
                return false;
            }
            cycle.state = Some(AlarmState::Dismissed);
        }
        info!("alarm {} dismissed", self.name);
        self.stop_audio();
        self.context.bus.post(Message::new(
            MessageType::AlarmDismissed,
            self.id,
            &self.name,
        ));
        true
    }

    /// Silences the alarm and rings it again after `interval`
    /// (or the configured snooze interval). Returns false if the alarm wasn't running.
    pub fn snooze(&self, interval: Option<Duration>) -> bool {
        let interval = interval
            .filter(|interval| !interval.is_zero())
            .unwrap_or(self.snooze_interval);
        {
            let mut cycle = crate::lock(&self.cycle);
            if cycle.state != Some(AlarmState::Running) {
                debug!("alarm {} isn't running, nothing to snooze", self.name);
                return false;
            }
            cycle.state = Some(AlarmState::Snoozed);
            cycle.snooze_interval = interval;
        }
        info!(
            "alarm {} snoozed for {}s",
            self.name,
            interval.as_secs_f64()
        );
        self.stop_audio();
        self.context.bus.post(Message::new(
            MessageType::AlarmSnoozed { interval },
            self.id,
            &self.name,
        ));
        true
    }

    fn pause(&self, duration: Duration, cancel: &Signal) -> bool {
        timer::sleep(duration, cancel, &self.context.shutdown)
    }

    fn player(&self) -> Result<Arc<dyn MediaPlayer>> {
        let plugin = self
            .media_plugin
            .as_deref()
            .ok_or_else(|| Error::NoMediaPlugin(self.name.clone()))?;
        self.context.players.get(plugin)
    }

    fn stop_audio(&self) {
        if self.media.is_none() {
            return;
        }
        if let Err(err) = self.player().and_then(|player| player.stop()) {
            warn!("alarm {}: couldn't stop audio: {err}", self.name);
        }
    }

    /// starts playback on its own thread so actions don't wait for the player
    fn play_audio(&self, media: &str) -> Option<JoinHandle<()>> {
        let player = match self.player() {
            Ok(player) => player,
            Err(err) => {
                error!("alarm {}: {err}", self.name);
                return None;
            }
        };
        let media = media.to_string();
        let name = self.name.clone();
        let volume = self.audio_volume;
        let spawned = thread::Builder::new()
            .name(format!("alarm-{}-audio", self.id))
            .spawn(move || {
                if let Some(volume) = volume {
                    if let Err(err) = player.set_volume(volume) {
                        warn!("alarm {name}: couldn't set volume: {err}");
                    }
                }
                if let Err(err) = player.play(&media) {
                    error!("alarm {name}: couldn't play {media}: {err}");
                }
            });
        match spawned {
            Ok(handle) => Some(handle),
            Err(err) => {
                error!("alarm {}: couldn't start audio thread: {err}", self.name);
                None
            }
        }
    }

    /// the alarm is already `RUNNING` when this is called
    fn fire(&self) -> Option<JoinHandle<()>> {
        info!("alarm {} fired", self.name);
        self.context.bus.post(Message::new(
            MessageType::AlarmStarted,
            self.id,
            &self.name,
        ));
        let playback = self.media.as_deref().and_then(|media| self.play_audio(media));
        let failed = execute_all(self.context.executor.as_ref(), &self.name, &self.actions);
        if failed > 0 {
            warn!(
                "alarm {}: {failed} of {} actions failed",
                self.name,
                self.actions.len()
            );
        }
        playback
    }

    /// Blocks until the player reports it stopped. Unreadable statuses count as still playing.
    /// Returns false if interrupted.
    fn wait_for_playback(&self, cancel: &Signal) -> bool {
        if self.media.is_none() {
            return true;
        }
        let Ok(player) = self.player() else {
            return true;
        };
        loop {
            match player.status() {
                Ok(status) if status.is_stopped() => return true,
                Ok(_) => {}
                Err(err) => debug!("alarm {}: couldn't read player status: {err}", self.name),
            }
            if self.pause(self.context.poll_interval, cancel) {
                return false;
            }
        }
    }

    /// Joins a playback thread and silences it if the alarm stopped ringing meanwhile.
    fn settle(&self, playback: Option<JoinHandle<()>>) {
        let Some(playback) = playback else {
            return;
        };
        if playback.join().is_err() {
            error!("alarm {}: audio thread panicked", self.name);
        }
        // dismissed, snoozed or stopped before the player got going
        if matches!(
            self.state(),
            Some(AlarmState::Dismissed | AlarmState::Snoozed | AlarmState::Shutdown)
        ) {
            self.stop_audio();
        }
    }

    fn run(&self, cancel: &Signal) {
        let mut playback = None;
        loop {
            let firing = {
                let mut cycle = crate::lock(&self.cycle);
                let state = cycle.state;
                match state {
                    Some(AlarmState::Shutdown) => break,
                    Some(AlarmState::Snoozed) if !self.is_enabled() => {
                        // a disabled alarm doesn't keep snoozing
                        cycle.state = Some(AlarmState::Waiting);
                        false
                    }
                    _ if self.is_enabled() => {
                        cycle.state = Some(AlarmState::Running);
                        true
                    }
                    _ => {
                        debug!("alarm {} is disabled, skipping", self.name);
                        false
                    }
                }
            };
            if firing {
                playback = self.fire();
            }
            if self.pause(self.context.poll_interval, cancel) {
                break;
            }
            self.settle(playback.take());
            if self.state() == Some(AlarmState::Running) && !self.wait_for_playback(cancel) {
                break;
            }

            let snooze = {
                let mut cycle = crate::lock(&self.cycle);
                let state = cycle.state;
                match state {
                    Some(AlarmState::Shutdown) => break,
                    Some(AlarmState::Snoozed) => Some(cycle.snooze_interval),
                    _ => {
                        cycle.state = Some(AlarmState::Waiting);
                        None
                    }
                }
            };
            let now = self.context.clock.now();
            let next = self.resolve_next(&now);
            let sleep_time = match (snooze, next) {
                (Some(snooze), _) => snooze,
                (None, Some(next)) => (next - now).to_std().unwrap_or_default(),
                (None, None) => {
                    // back to waiting only long enough to find nothing to wait for
                    let mut cycle = crate::lock(&self.cycle);
                    if cycle.state == Some(AlarmState::Waiting) {
                        cycle.state = Some(AlarmState::Shutdown);
                    }
                    drop(cycle);
                    info!("alarm {} has no upcoming run, shutting down", self.name);
                    break;
                }
            };
            debug!(
                "alarm {} sleeping for {}s",
                self.name,
                sleep_time.as_secs_f64()
            );
            if self.pause(sleep_time, cancel) {
                break;
            }
        }
        self.settle(playback.take());
        debug!("alarm {} thread exiting", self.name);
    }
}

/// Local files become absolute paths and have to exist, uris are left alone.
fn normalize_media(media: &str) -> Result<String> {
    if media.contains("://") {
        return Ok(media.to_string());
    }
    let path = match media.strip_prefix("~/") {
        Some(rest) => directories::BaseDirs::new()
            .map_or_else(|| PathBuf::from(media), |dirs| dirs.home_dir().join(rest)),
        None => PathBuf::from(media),
    };
    let path = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()?.join(path)
    };
    if path.is_file() {
        Ok(path.to_string_lossy().into_owned())
    } else {
        Err(Error::MissingMedia(path))
    }
}
