//! Trading-day calendar: weekends are never trading days, registered
//! holidays are skipped as well.

use crate::error::{AppError, Result};
use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradingCalendar {
    holidays: BTreeSet<NaiveDate>,
}

impl TradingCalendar {
    /// Monday–Friday calendar without holidays
    pub fn weekdays() -> Self {
        Self::default()
    }

    pub fn with_holidays<I>(holidays: I) -> Self
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        Self {
            holidays: holidays.into_iter().collect(),
        }
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    /// First trading day strictly after `date`
    pub fn next_trading_day(&self, date: NaiveDate) -> Result<NaiveDate> {
        let mut day = date;
        loop {
            day = day
                .succ_opt()
                .ok_or_else(|| AppError::Validation(format!("no trading day after {}", date)))?;
            if self.is_trading_day(day) {
                return Ok(day);
            }
        }
    }

    /// The `count` trading days following `date`, ascending
    pub fn trading_days_after(&self, date: NaiveDate, count: usize) -> Result<Vec<NaiveDate>> {
        let mut days = Vec::with_capacity(count);
        let mut cursor = date;
        for _ in 0..count {
            cursor = self.next_trading_day(cursor)?;
            days.push(cursor);
        }
        Ok(days)
    }
}
