//! # PostPilot Store
//! All persisted state behind a single SQLite handle: content lifecycle,
//! posting schedules with content bindings, the append-only post log,
//! leads, settings, and the admin registry.
//!
//! Expected conditions (unknown id, duplicate, already taken) come back as
//! `bool`/`Option`; only real SQLite failures are errors.

pub mod admins;
pub mod content;
pub mod db;
pub mod leads;
pub mod schedule;
pub mod settings;
pub mod users;

pub use admins::{AdminRegistry, Authorizer};
pub use content::ContentStore;
pub use db::Database;
pub use leads::LeadStore;
pub use schedule::{ScheduleStore, parse_time};
pub use settings::SettingsStore;
pub use users::UserDirectory;
