//! Scheduler for marketloop workflow triggers.
//!
//! This crate provides:
//!
//! - **Cron Schedules**: parsing and next-fire computation for schedule
//!   triggers
//! - **Schedule Book**: per-workflow next-fire bookkeeping with missed-fire
//!   handling, driving the periodic sweep that enrolls schedule audiences

pub mod error;
pub mod schedule;
pub mod sweep;

pub use error::ScheduleError;
pub use schedule::CronSchedule;
pub use sweep::{MissedFireBehavior, ScheduleBook, ScheduleEntry, fire_due};
