//! The collection of alarms, keyed by name.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use log::{error, info, warn};

use crate::{
    alarm::{Alarm, AlarmContext, AlarmSpec, AlarmState, AlarmStatus},
    error::{Error, Result},
};

pub struct AlarmManager {
    alarms: Mutex<HashMap<String, Arc<Alarm>>>,
    context: AlarmContext,
}

impl AlarmManager {
    #[must_use]
    pub fn new(context: AlarmContext) -> Self {
        Self {
            alarms: Mutex::new(HashMap::new()),
            context,
        }
    }

    /// Builds an alarm without arming it, [`AlarmManager::run`] arms it later.
    /// An alarm with the same name is stopped and replaced.
    ///
    /// # Errors
    /// if the alarm can't be built, in which case nothing is replaced
    pub fn insert(&self, spec: AlarmSpec) -> Result<Arc<Alarm>> {
        let alarm = Alarm::new(spec, self.context.clone())?;
        self.replace(Arc::clone(&alarm));
        Ok(alarm)
    }

    /// Builds and arms an alarm, replacing (and stopping) any alarm with the same name.
    ///
    /// # Errors
    /// if the alarm can't be built or armed, in which case nothing is replaced
    pub fn add(&self, spec: AlarmSpec) -> Result<AlarmStatus> {
        let alarm = Alarm::new(spec, self.context.clone())?;
        alarm.start()?;
        self.replace(Arc::clone(&alarm));
        Ok(alarm.status())
    }

    fn replace(&self, alarm: Arc<Alarm>) {
        let previous = crate::lock(&self.alarms).insert(alarm.name().to_string(), alarm);
        if let Some(previous) = previous {
            info!("overwriting alarm {}", previous.name());
            previous.stop();
        }
    }

    /// # Errors
    /// if there is no such alarm
    pub fn remove(&self, name: &str) -> Result<AlarmStatus> {
        let alarm = crate::lock(&self.alarms)
            .remove(name)
            .ok_or_else(|| Error::NoSuchAlarm(name.to_string()))?;
        alarm.stop();
        Ok(alarm.status())
    }

    /// # Errors
    /// if there is no such alarm
    pub fn get(&self, name: &str) -> Result<Arc<Alarm>> {
        crate::lock(&self.alarms)
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NoSuchAlarm(name.to_string()))
    }

    /// # Errors
    /// if there is no such alarm
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<AlarmStatus> {
        let alarm = self.get(name)?;
        alarm.set_enabled(enabled);
        Ok(alarm.status())
    }

    /// # Errors
    /// if there is no such alarm
    pub fn enable(&self, name: &str) -> Result<AlarmStatus> {
        self.set_enabled(name, true)
    }

    /// # Errors
    /// if there is no such alarm
    pub fn disable(&self, name: &str) -> Result<AlarmStatus> {
        self.set_enabled(name, false)
    }

    /// the alarm that is ringing right now, if any
    #[must_use]
    pub fn current(&self) -> Option<Arc<Alarm>> {
        crate::lock(&self.alarms)
            .values()
            .find(|alarm| alarm.state() == Some(AlarmState::Running))
            .cloned()
    }

    /// # Errors
    /// if no alarm is running
    pub fn dismiss(&self) -> Result<AlarmStatus> {
        let alarm = self.current().ok_or(Error::NoRunningAlarm)?;
        if alarm.dismiss() {
            Ok(alarm.status())
        } else {
            Err(Error::NoRunningAlarm)
        }
    }

    /// # Errors
    /// if no alarm is running
    pub fn snooze(&self, interval: Option<Duration>) -> Result<AlarmStatus> {
        let alarm = self.current().ok_or(Error::NoRunningAlarm)?;
        if alarm.snooze(interval) {
            Ok(alarm.status())
        } else {
            Err(Error::NoRunningAlarm)
        }
    }

    /// every alarm, soonest first, alarms that won't run again last
    #[must_use]
    pub fn alarms(&self) -> Vec<AlarmStatus> {
        let mut statuses: Vec<_> = crate::lock(&self.alarms)
            .values()
            .map(|alarm| alarm.status())
            .collect();
        statuses.sort_by_key(|status| (status.next_run.is_none(), status.next_run));
        statuses
    }

    /// Drops alarms that shut down and whose thread is gone. Returns their names.
    pub fn reap(&self) -> Vec<String> {
        let mut reaped = Vec::new();
        crate::lock(&self.alarms).retain(|name, alarm| {
            let done = alarm.state() == Some(AlarmState::Shutdown) && alarm.is_finished();
            if done {
                info!("removing finished alarm {name}");
                reaped.push(name.clone());
            }
            !done
        });
        reaped
    }

    /// Arms every alarm that isn't armed yet. An alarm that fails to arm is logged and skipped.
    pub fn start_all(&self) {
        let alarms: Vec<_> = crate::lock(&self.alarms).values().cloned().collect();
        for alarm in alarms.iter().filter(|alarm| alarm.state().is_none()) {
            if let Err(err) = alarm.start() {
                error!("couldn't arm alarm {}: {err}", alarm.name());
            }
        }
    }

    pub fn stop_all(&self) {
        for alarm in crate::lock(&self.alarms).values() {
            alarm.stop();
        }
    }

    /// Arms all alarms, then cleans up finished ones until the shutdown signal fires.
    pub fn run(&self) {
        self.start_all();
        info!("alarm manager running");
        while !self.context.shutdown.wait_timeout(self.context.poll_interval) {
            self.reap();
        }
        warn!("alarm manager shutting down");
        self.stop_all();
    }

    pub fn shutdown(&self) {
        self.context.shutdown.trigger();
    }
}
