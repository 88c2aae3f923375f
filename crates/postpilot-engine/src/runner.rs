//! Trigger runner — turns the persisted schedule set into fire events.
//!
//! Ticks on a tokio interval faster than once a minute, so a slot's minute
//! is never missed; `FireTracker` guarantees at most one fire per slot per
//! minute. Each fire is an independent dispatch whose failure cannot abort
//! the loop or affect other slots.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use postpilot_store::ScheduleStore;

use crate::clock::{matches_minute, minute_key};
use crate::dispatch::PostingDispatcher;

/// Per-slot dedup: remembers the last minute each slot fired in.
#[derive(Default)]
pub struct FireTracker {
    last_fired: HashMap<i64, String>,
}

impl FireTracker {
    /// True exactly once per (slot, minute); marks the slot as fired.
    pub fn should_fire(&mut self, schedule_id: i64, minute: &str) -> bool {
        match self.last_fired.get(&schedule_id) {
            Some(last) if last == minute => false,
            _ => {
                self.last_fired.insert(schedule_id, minute.to_string());
                true
            }
        }
    }
}

/// Spawn the runner loop as a background tokio task.
pub fn spawn_runner(
    schedules: ScheduleStore,
    dispatcher: Arc<PostingDispatcher>,
    tick_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("Posting runner started (tick every {tick_secs}s)");
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(tick_secs.max(1)));
        let mut tracker = FireTracker::default();

        loop {
            interval.tick().await;
            let now = Utc::now();
            let minute = minute_key(now);

            let due = match schedules.list() {
                Ok(all) => all,
                Err(e) => {
                    tracing::error!("Runner could not list schedules: {e}");
                    continue;
                }
            };

            for schedule in due {
                if !schedule.enabled || !matches_minute(&schedule.time_str, now) {
                    continue;
                }
                if !tracker.should_fire(schedule.id, &minute) {
                    continue;
                }
                tracing::info!("Schedule #{} fired at {}", schedule.id, schedule.time_str);
                // One bad fire must not take the loop down
                if let Err(e) = dispatcher.on_fire(schedule.id).await {
                    tracing::error!("Fire for schedule #{} failed: {e}", schedule.id);
                }
            }
        }
    })
}
