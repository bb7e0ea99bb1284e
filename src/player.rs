//! Local file playback with rodio.
//!
//! The output stream can't leave the thread that opened it, so a dedicated
//! audio thread owns it and the player talks to that thread over a channel.

use std::{fs::File, io::BufReader, path::Path, thread, time::Duration};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, error};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};

use crate::{
    error::{Error, Result},
    media::{MediaPlayer, PlayerState, PlayerStatus},
};

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

enum Command {
    Play(String, Sender<Result<()>>),
    Volume(f32),
    Stop,
    Status(Sender<PlayerStatus>),
}

#[derive(Debug)]
pub struct RodioPlayer {
    commands: Sender<Command>,
}

impl RodioPlayer {
    /// Starts the audio thread. With `repeat` a sound loops until it is stopped.
    ///
    /// # Errors
    /// if the audio thread couldn't be spawned
    pub fn spawn(repeat: bool) -> Result<Self> {
        let (commands, receiver) = unbounded();
        thread::Builder::new()
            .name("rodio-player".to_string())
            .spawn(move || audio_thread(&receiver, repeat))?;
        Ok(Self { commands })
    }

    fn request<T>(&self, command: impl FnOnce(Sender<T>) -> Command) -> Result<T> {
        let (reply, answer) = bounded(1);
        self.send(command(reply))?;
        answer
            .recv_timeout(REPLY_TIMEOUT)
            .map_err(|_| Error::Player("audio thread didn't answer".to_string()))
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::Player("audio thread is gone".to_string()))
    }
}

impl MediaPlayer for RodioPlayer {
    fn play(&self, resource: &str) -> Result<()> {
        self.request(|reply| Command::Play(resource.to_string(), reply))?
    }

    fn set_volume(&self, volume: f32) -> Result<()> {
        self.send(Command::Volume(volume))
    }

    fn stop(&self) -> Result<()> {
        self.send(Command::Stop)
    }

    fn status(&self) -> Result<PlayerStatus> {
        self.request(Command::Status)
    }
}

/// `file://` uris and plain paths, anything else isn't local
fn local_path(resource: &str) -> Option<&Path> {
    match resource.split_once("://") {
        Some(("file", path)) => Some(Path::new(path)),
        Some(_) => None,
        None => Some(Path::new(resource)),
    }
}

fn open(handle: &OutputStreamHandle, resource: &str, repeat: bool) -> Result<Sink> {
    let path = local_path(resource)
        .ok_or_else(|| Error::Player(format!("can only play local files, not {resource}")))?;
    let sound = BufReader::new(File::open(path)?);
    let source = Decoder::new(sound).map_err(|err| Error::Player(err.to_string()))?;
    let sink = Sink::try_new(handle).map_err(|err| Error::Player(err.to_string()))?;
    if repeat {
        sink.append(source.repeat_infinite());
    } else {
        sink.append(source);
    }
    sink.play();
    Ok(sink)
}

fn audio_thread(commands: &Receiver<Command>, repeat: bool) {
    let (_stream, handle) = match OutputStream::try_default() {
        Ok(output) => output,
        Err(err) => {
            error!("couldn't open audio output: {err}");
            for command in commands {
                match command {
                    Command::Play(_, reply) => {
                        let _ = reply.send(Err(Error::Player(format!("no audio output: {err}"))));
                    }
                    Command::Status(reply) => {
                        let _ = reply.send(PlayerStatus::stopped());
                    }
                    Command::Volume(_) | Command::Stop => {}
                }
            }
            return;
        }
    };
    let mut current: Option<(String, Sink)> = None;
    let mut volume = 100.0;
    for command in commands {
        match command {
            Command::Play(resource, reply) => {
                if let Some((_, sink)) = current.take() {
                    sink.stop();
                }
                debug!("playing {resource}");
                let result = open(&handle, &resource, repeat).map(|sink| {
                    sink.set_volume(volume / 100.0);
                    current = Some((resource, sink));
                });
                let _ = reply.send(result);
            }
            Command::Volume(new_volume) => {
                volume = new_volume;
                if let Some((_, sink)) = &current {
                    sink.set_volume(volume / 100.0);
                }
            }
            Command::Stop => {
                if let Some((resource, sink)) = current.take() {
                    debug!("stopped {resource}");
                    sink.stop();
                }
            }
            Command::Status(reply) => {
                let status = match &current {
                    Some((resource, sink)) if !sink.empty() => PlayerStatus {
                        state: Some(if sink.is_paused() {
                            PlayerState::Pause
                        } else {
                            PlayerState::Play
                        }),
                        resource: Some(resource.clone()),
                        volume: Some(volume),
                    },
                    _ => PlayerStatus {
                        volume: Some(volume),
                        ..PlayerStatus::stopped()
                    },
                };
                let _ = reply.send(status);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_local_resources_have_a_path() {
        assert_eq!(local_path("/tmp/ring.mp3"), Some(Path::new("/tmp/ring.mp3")));
        assert_eq!(
            local_path("file:///tmp/ring.mp3"),
            Some(Path::new("/tmp/ring.mp3"))
        );
        assert_eq!(local_path("https://example.com/ring.mp3"), None);
    }
}
