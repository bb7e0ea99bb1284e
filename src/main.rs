use std::{
    error::Error,
    io::{self, BufRead},
    path::PathBuf,
    str::FromStr,
    sync::Arc,
    thread,
    time::Duration,
};

use clap::{command, Parser, Subcommand};
use log::{error, info};
use roosty_alarm::{
    action::ShellExecutor,
    alarm::AlarmContext,
    communication::ChannelBus,
    config::Config,
    manager::AlarmManager,
    media::MediaPlayers,
    player::RodioPlayer,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// config file to use instead of the default one
    #[clap(long, short, global = true)]
    config: Option<PathBuf>,
    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// write a default config file
    Init {
        #[clap(long, short)]
        force: bool,
    },
    /// parse the config and show when every alarm will go off
    Check,
    /// run the alarms (the default), reading commands from stdin
    Run,
}

/// what can be typed into a running daemon
#[derive(Debug, PartialEq)]
enum Control {
    List,
    Dismiss,
    Snooze(Option<Duration>),
    Enable(String),
    Disable(String),
    Remove(String),
    Quit,
}

impl FromStr for Control {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or_default();
        let rest = words.collect::<Vec<_>>().join(" ");
        let name = || {
            if rest.is_empty() {
                Err(format!("`{command}` needs an alarm name"))
            } else {
                Ok(rest.clone())
            }
        };
        match command {
            "list" | "ls" => Ok(Self::List),
            "dismiss" => Ok(Self::Dismiss),
            "snooze" if rest.is_empty() => Ok(Self::Snooze(None)),
            "snooze" => rest
                .parse::<f64>()
                .ok()
                .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
                .map(|interval| Self::Snooze(Some(interval)))
                .ok_or_else(|| format!("`{rest}` isn't a number of seconds")),
            "enable" => name().map(Self::Enable),
            "disable" => name().map(Self::Disable),
            "remove" | "rm" => name().map(Self::Remove),
            "quit" | "exit" => Ok(Self::Quit),
            _ => Err(format!("unknown command `{line}`")),
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    // initilize the logger
    simple_file_logger::init_logger!("roosty_alarm").expect("couldn't initialize logger");

    let args = Args::parse();
    let path = match args.config {
        Some(path) => path,
        None => Config::config_path()?,
    };
    match args.command.unwrap_or(Command::Run) {
        Command::Init { force } => {
            if force || !path.exists() {
                Config::new().save(&path)?;
                println!("wrote {}", path.display());
            } else {
                println!(
                    "{} already exists, use --force to overwrite it",
                    path.display()
                );
            }
        }
        Command::Check => {
            let config = Config::load(&path)?;
            let manager = AlarmManager::new(context(&config, MediaPlayers::new()));
            load_alarms(&manager, &config);
            for plugin in config.alarms.values().filter_map(|alarm| {
                alarm
                    .media
                    .as_ref()
                    .map(|_| alarm.media_plugin.as_ref().unwrap_or(&config.media_plugin))
            }) {
                if !config.players.contains_key(plugin) {
                    println!("warning: no player named {plugin} is configured");
                }
            }
            for status in manager.alarms() {
                println!("{status}");
            }
        }
        Command::Run => run(&Config::load(&path)?)?,
    }
    Ok(())
}

fn context(config: &Config, players: MediaPlayers) -> AlarmContext {
    let (bus, events) = ChannelBus::new();
    thread::spawn(move || {
        for message in events {
            info!("{message}");
            println!("{message}");
        }
    });
    AlarmContext::new(Arc::new(bus), Arc::new(ShellExecutor), players)
        .with_poll_interval(config.poll_interval())
}

fn load_alarms(manager: &AlarmManager, config: &Config) {
    for (name, spec) in config.alarm_specs() {
        if let Err(err) = spec.and_then(|spec| manager.insert(spec)) {
            error!("skipping alarm {name}: {err}");
            eprintln!("skipping alarm {name}: {err}");
        }
    }
}

fn run(config: &Config) -> Result<(), Box<dyn Error>> {
    let mut players = MediaPlayers::new();
    for (name, player) in &config.players {
        players.insert(name.clone(), Arc::new(RodioPlayer::spawn(player.repeat)?));
    }
    info!(
        "media players: {}",
        players.names().collect::<Vec<_>>().join(", ")
    );
    let manager = Arc::new(AlarmManager::new(context(config, players)));
    load_alarms(&manager, config);

    let runner = {
        let manager = Arc::clone(&manager);
        thread::spawn(move || manager.run())
    };
    for line in io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Control>() {
            Ok(Control::Quit) => {
                manager.shutdown();
                break;
            }
            Ok(control) => handle(&manager, control),
            Err(err) => eprintln!("{err}"),
        }
    }
    // without stdin keep going until something else shuts the manager down
    if runner.join().is_err() {
        error!("alarm manager thread panicked");
    }
    Ok(())
}

fn handle(manager: &AlarmManager, control: Control) {
    let result = match control {
        Control::List => {
            for status in manager.alarms() {
                println!("{status}");
            }
            return;
        }
        Control::Dismiss => manager.dismiss(),
        Control::Snooze(interval) => manager.snooze(interval),
        Control::Enable(name) => manager.enable(&name),
        Control::Disable(name) => manager.disable(&name),
        Control::Remove(name) => manager.remove(&name),
        Control::Quit => return,
    };
    match result {
        Ok(status) => println!("{status}"),
        Err(err) => eprintln!("{err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_commands() {
        assert_eq!("list".parse::<Control>(), Ok(Control::List));
        assert_eq!("snooze".parse::<Control>(), Ok(Control::Snooze(None)));
        assert_eq!(
            "snooze 90".parse::<Control>(),
            Ok(Control::Snooze(Some(Duration::from_secs(90))))
        );
        assert_eq!(
            "disable wake up".parse::<Control>(),
            Ok(Control::Disable("wake up".to_string()))
        );
        assert!("snooze soon".parse::<Control>().is_err());
        assert!("enable".parse::<Control>().is_err());
        assert!("dance".parse::<Control>().is_err());
    }
}
