#![warn(clippy::pedantic, clippy::nursery, clippy::cargo)]
#![deny(clippy::use_self, rust_2018_idioms)]
#![allow(clippy::multiple_crate_versions, clippy::module_name_repetitions)]

//! Alarms for a home automation hub.
//!
//! An [`alarm::Alarm`] fires at times given as seconds from now, a cron expression or an
//! iso timestamp, runs its actions, rings through a [`media::MediaPlayer`] and can be
//! dismissed or snoozed while it rings. [`manager::AlarmManager`] keeps alarms by name.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod action;
pub mod alarm;
pub mod clock;
pub mod communication;
pub mod config;
pub mod error;
pub mod manager;
pub mod media;
pub mod player;
pub mod timer;
pub mod when;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};

/// locks, ignoring poisoning
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
