use std::process::Command;

use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// something to do when an alarm goes off, e.g.
/// `{ action = "shell", args = { command = "echo good morning" } }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub action: String,
    #[serde(default)]
    pub args: toml::Table,
}

impl Action {
    #[must_use]
    pub fn new(action: impl Into<String>, args: toml::Table) -> Self {
        Self {
            action: action.into(),
            args,
        }
    }

    fn fail(&self, reason: impl Into<String>) -> Error {
        Error::Action {
            action: self.action.clone(),
            reason: reason.into(),
        }
    }

    fn str_arg(&self, name: &str) -> Result<&str> {
        self.args
            .get(name)
            .and_then(toml::Value::as_str)
            .ok_or_else(|| self.fail(format!("missing `{name}` argument")))
    }
}

pub trait ActionExecutor: Send + Sync {
    /// Runs one action to completion.
    ///
    /// # Errors
    /// whatever made the action fail, the alarm only logs it
    fn execute(&self, action: &Action) -> Result<()>;
}

/// Understands two actions:
/// - `shell`: runs `args.command` with `sh -c` and waits for it
/// - `log`: logs `args.message`
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellExecutor;

impl ActionExecutor for ShellExecutor {
    fn execute(&self, action: &Action) -> Result<()> {
        match action.action.as_str() {
            "shell" => {
                let command = action.str_arg("command")?;
                let status = Command::new("sh")
                    .arg("-c")
                    .arg(command)
                    .status()
                    .map_err(|err| action.fail(err.to_string()))?;
                if status.success() {
                    Ok(())
                } else {
                    Err(action.fail(format!("`{command}` {status}")))
                }
            }
            "log" => {
                info!("{}", action.str_arg("message")?);
                Ok(())
            }
            _ => Err(action.fail("unknown action")),
        }
    }
}

/// Runs every action in order. A failing action is logged and the rest still run.
/// Returns how many failed.
pub fn execute_all(executor: &dyn ActionExecutor, alarm: &str, actions: &[Action]) -> usize {
    actions
        .iter()
        .filter(|action| match executor.execute(action) {
            Ok(()) => false,
            Err(err) => {
                error!("alarm {alarm}: {err}");
                true
            }
        })
        .count()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn shell(command: &str) -> Action {
        let mut args = toml::Table::new();
        args.insert("command".to_string(), command.into());
        Action::new("shell", args)
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl ActionExecutor for Recorder {
        fn execute(&self, action: &Action) -> Result<()> {
            self.0.lock().unwrap().push(action.action.clone());
            if action.action == "boom" {
                Err(action.fail("boom"))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn shell_actions() {
        assert!(ShellExecutor.execute(&shell("true")).is_ok());
        assert!(matches!(
            ShellExecutor.execute(&shell("exit 3")),
            Err(Error::Action { .. })
        ));
    }

    #[test]
    fn missing_arguments_and_unknown_actions_fail() {
        assert!(ShellExecutor
            .execute(&Action::new("shell", toml::Table::new()))
            .is_err());
        assert!(ShellExecutor
            .execute(&Action::new("light.on", toml::Table::new()))
            .is_err());
    }

    #[test]
    fn failures_do_not_stop_the_rest() {
        let recorder = Recorder::default();
        let actions = ["first", "boom", "last"]
            .map(|name| Action::new(name, toml::Table::new()));
        assert_eq!(execute_all(&recorder, "test", &actions), 1);
        assert_eq!(*recorder.0.lock().unwrap(), ["first", "boom", "last"]);
    }

    #[test]
    fn actions_deserialize_from_toml() {
        let action: Action =
            toml::from_str("action = \"log\"\nargs = { message = \"hi\" }").unwrap();
        assert_eq!(action.action, "log");
        assert!(ShellExecutor.execute(&action).is_ok());
        let bare: Action = toml::from_str("action = \"noop\"").unwrap();
        assert!(bare.args.is_empty());
    }
}
