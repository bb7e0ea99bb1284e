use std::{
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use roosty_alarm::{
    action::{Action, ActionExecutor, ShellExecutor},
    alarm::{AlarmContext, AlarmState},
    communication::{ChannelBus, MessageType},
    config::Config,
    manager::AlarmManager,
    media::{MediaPlayer, MediaPlayers, PlayerState, PlayerStatus},
    Result,
};

/// rings until told to stop
#[derive(Default)]
struct Bell(Mutex<Option<String>>);

impl MediaPlayer for Bell {
    fn play(&self, resource: &str) -> Result<()> {
        *self.0.lock().unwrap() = Some(resource.to_string());
        Ok(())
    }

    fn set_volume(&self, _volume: f32) -> Result<()> {
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        *self.0.lock().unwrap() = None;
        Ok(())
    }

    fn status(&self) -> Result<PlayerStatus> {
        let resource = self.0.lock().unwrap().clone();
        Ok(PlayerStatus {
            state: Some(if resource.is_some() {
                PlayerState::Play
            } else {
                PlayerState::Stop
            }),
            resource,
            volume: None,
        })
    }
}

const CONFIG: &str = r#"
poll_interval = 0.02
media_plugin = "bell"

[alarms.kettle]
when = 0.1
media = "http://example.com/ring.mp3"
actions = [{ action = "log", args = { message = "kettle" } }]

[alarms.someday]
when = "0 7 * * 1-5"

[alarms.typo]
when = "whenever"
"#;

#[test]
fn configured_alarm_rings_and_is_dismissed() {
    let config: Config = toml::from_str(CONFIG).unwrap();
    let bell = Arc::new(Bell::default());
    let (bus, events) = ChannelBus::new();
    let context = AlarmContext::new(
        Arc::new(bus),
        Arc::new(ShellExecutor),
        MediaPlayers::new().with("bell", bell.clone()),
    )
    .with_poll_interval(config.poll_interval());
    let manager = Arc::new(AlarmManager::new(context));

    let mut broken = Vec::new();
    for (name, spec) in config.alarm_specs() {
        if spec.and_then(|spec| manager.insert(spec)).is_err() {
            broken.push(name);
        }
    }
    assert_eq!(broken, ["typo"]);

    let runner = {
        let manager = Arc::clone(&manager);
        thread::spawn(move || manager.run())
    };

    let started = events.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(started.kind, MessageType::AlarmStarted);
    assert_eq!(started.name, "kettle");
    while bell.status().unwrap().state != Some(PlayerState::Play) {
        thread::sleep(Duration::from_millis(10));
    }

    let status = manager.dismiss().unwrap();
    assert_eq!(status.name, "kettle");
    assert_eq!(
        events.recv_timeout(Duration::from_secs(5)).unwrap().kind,
        MessageType::AlarmDismissed
    );
    assert!(bell.status().unwrap().resource.is_none());

    // the one shot alarm is gone once its thread is done
    for _ in 0..250 {
        if manager.get("kettle").is_err() {
            break;
        }
        thread::sleep(Duration::from_millis(20));
    }
    assert!(manager.get("kettle").is_err());
    assert_eq!(
        manager.get("someday").unwrap().state(),
        Some(AlarmState::Waiting)
    );

    manager.shutdown();
    runner.join().unwrap();
    assert_eq!(
        manager.get("someday").unwrap().state(),
        Some(AlarmState::Shutdown)
    );
}

#[test]
fn actions_run_through_the_shell() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("fired");
    let mut args = toml::Table::new();
    args.insert(
        "command".to_string(),
        format!("touch '{}'", marker.display()).into(),
    );
    let action = Action::new("shell", args);
    ShellExecutor.execute(&action).unwrap();
    assert!(marker.exists());
}
