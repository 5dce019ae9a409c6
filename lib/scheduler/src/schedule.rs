//! Cron schedules for schedule-triggered workflows.
//!
//! A [`CronSchedule`] wraps a 5-field cron expression and computes concrete
//! fire instants. Evaluation is in UTC; the timezone field is carried for
//! display and future evaluation support.

use crate::error::ScheduleError;
use chrono::{DateTime, Utc};
use marketloop_automation::TriggerConfig;
use serde::{Deserialize, Serialize};

/// A parsed cron schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronSchedule {
    /// The cron expression.
    pub expression: String,
    /// Timezone for the schedule.
    pub timezone: Option<String>,
}

impl CronSchedule {
    /// Creates a new cron schedule.
    #[must_use]
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            timezone: None,
        }
    }

    /// Sets the timezone.
    #[must_use]
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    /// Extracts the schedule from a workflow trigger, if it is
    /// schedule-typed.
    #[must_use]
    pub fn from_trigger(trigger: &TriggerConfig) -> Option<Self> {
        match trigger {
            TriggerConfig::Schedule { cron, timezone, .. } => Some(Self {
                expression: cron.clone(),
                timezone: timezone.clone(),
            }),
            _ => None,
        }
    }

    /// Validates the cron expression.
    ///
    /// # Errors
    ///
    /// Returns an error if the expression does not parse.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        self.parse().map(|_| ())
    }

    /// Computes the first fire instant strictly after the given time.
    ///
    /// # Errors
    ///
    /// Returns an error if the expression does not parse or never fires
    /// again.
    pub fn next_after(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
        let cron = self.parse()?;
        cron.iter_after(after)
            .next()
            .ok_or_else(|| ScheduleError::NoUpcomingOccurrence {
                expression: self.expression.clone(),
            })
    }

    fn parse(&self) -> Result<croner::Cron, ScheduleError> {
        self.expression
            .parse::<croner::Cron>()
            .map_err(|e| ScheduleError::InvalidCronExpression {
                expression: self.expression.clone(),
                reason: e.to_string(),
            })
    }
}
