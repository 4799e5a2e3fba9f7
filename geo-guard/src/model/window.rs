use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Earliest date a record of the reference data may start on: 1943-01-01.
pub fn historical_minimum() -> NaiveDate {
    NaiveDate::from_ymd_opt(1943, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Inclusive window of admissible start and end dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub min: NaiveDate,
    pub max: NaiveDate,
}

impl Default for DateWindow {
    fn default() -> Self {
        Self::until_today()
    }
}

impl DateWindow {
    pub fn new(min: NaiveDate, max: NaiveDate) -> Self {
        Self { min, max }
    }

    /// `[1943-01-01, today]`, today being the local calendar date.
    pub fn until_today() -> Self {
        Self {
            min: historical_minimum(),
            max: chrono::Local::now().date_naive(),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.min <= date && date <= self.max
    }
}
