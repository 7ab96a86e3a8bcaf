//! Fetch windows and calendar periods
//!
//! A requested date range is fetched in windows of at most seven days. The
//! [`Segmenter`] produces those windows lazily, in order, with no gaps and no
//! overlaps; the final window is truncated to the end of the range.

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Maximum number of days covered by one window
pub const MAX_WINDOW_DAYS: u64 = 7;

/// Window and period errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WindowError {
    /// Range start is after its end
    #[error("invalid range: start {start} is after end {end}")]
    InvalidRange {
        /// Requested start date
        start: NaiveDate,
        /// Requested end date
        end: NaiveDate,
    },

    /// Period string or value could not be interpreted
    #[error("invalid period '{input}': {reason}")]
    InvalidPeriod {
        /// Offending input
        input: String,
        /// Why it was rejected
        reason: String,
    },
}

/// An inclusive range of calendar days fetched as one unit
///
/// Only [`FetchWindow::new`] and [`FetchWindow::single_day`] build windows, so
/// `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FetchWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl FetchWindow {
    /// Create a window, rejecting `start > end`
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, WindowError> {
        if start > end {
            return Err(WindowError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Window covering exactly one day
    pub fn single_day(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    /// First day (inclusive)
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last day (inclusive)
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of calendar days covered
    pub fn len_days(&self) -> u64 {
        (self.end - self.start).num_days() as u64 + 1
    }

    /// Whether the window covers a single day
    pub fn is_single_day(&self) -> bool {
        self.start == self.end
    }

    /// Whether `day` falls inside the window
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// One single-day window per day, in chronological order
    pub fn days(&self) -> impl Iterator<Item = FetchWindow> {
        let end = self.end;
        self.start
            .iter_days()
            .take_while(move |day| *day <= end)
            .map(FetchWindow::single_day)
    }
}

impl std::fmt::Display for FetchWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Lazy, ordered sequence of windows covering an inclusive date range
#[derive(Debug, Clone)]
pub struct Segmenter {
    next_start: Option<NaiveDate>,
    end: NaiveDate,
}

impl Segmenter {
    /// Segment `[start, end]`; fails when `start > end`
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, WindowError> {
        if start > end {
            return Err(WindowError::InvalidRange { start, end });
        }
        Ok(Self {
            next_start: Some(start),
            end,
        })
    }
}

impl Iterator for Segmenter {
    type Item = FetchWindow;

    fn next(&mut self) -> Option<FetchWindow> {
        let start = self.next_start?;
        let window_end = start
            .checked_add_days(Days::new(MAX_WINDOW_DAYS - 1))
            .map_or(self.end, |day| day.min(self.end));

        self.next_start = window_end.succ_opt().filter(|day| *day <= self.end);

        Some(FetchWindow {
            start,
            end: window_end,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.next_start {
            Some(start) => {
                let days = (self.end - start).num_days() as u64 + 1;
                let windows = days.div_ceil(MAX_WINDOW_DAYS) as usize;
                (windows, Some(windows))
            }
            None => (0, Some(0)),
        }
    }
}

impl ExactSizeIterator for Segmenter {}

/// Granularity of a calendar period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodGranularity {
    /// A calendar month
    Monthly,
    /// A calendar quarter
    Quarterly,
}

/// A calendar month (`2024-12`) or quarter (`2024-Q4`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    granularity: PeriodGranularity,
    year: i32,
    value: u32,
    start: NaiveDate,
    end: NaiveDate,
}

impl Period {
    /// Calendar month, `month` in 1..=12
    pub fn monthly(year: i32, month: u32) -> Result<Self, WindowError> {
        if !(1..=12).contains(&month) {
            return Err(invalid_period(
                format!("{year}-{month:02}"),
                format!("month must be 1-12, got {month}"),
            ));
        }
        let (start, end) = month_bounds(year, month)
            .ok_or_else(|| invalid_period(format!("{year}-{month:02}"), "year out of range"))?;
        Ok(Self {
            granularity: PeriodGranularity::Monthly,
            year,
            value: month,
            start,
            end,
        })
    }

    /// Calendar quarter, `quarter` in 1..=4
    pub fn quarterly(year: i32, quarter: u32) -> Result<Self, WindowError> {
        if !(1..=4).contains(&quarter) {
            return Err(invalid_period(
                format!("{year}-Q{quarter}"),
                format!("quarter must be 1-4, got {quarter}"),
            ));
        }
        let first_month = (quarter - 1) * 3 + 1;
        let start = month_bounds(year, first_month).map(|(start, _)| start);
        let end = month_bounds(year, first_month + 2).map(|(_, end)| end);
        match (start, end) {
            (Some(start), Some(end)) => Ok(Self {
                granularity: PeriodGranularity::Quarterly,
                year,
                value: quarter,
                start,
                end,
            }),
            _ => Err(invalid_period(
                format!("{year}-Q{quarter}"),
                "year out of range",
            )),
        }
    }

    /// Monthly or quarterly
    pub fn granularity(&self) -> PeriodGranularity {
        self.granularity
    }

    /// Calendar year
    pub fn year(&self) -> i32 {
        self.year
    }

    /// Month (1-12) or quarter (1-4)
    pub fn value(&self) -> u32 {
        self.value
    }

    /// First day of the period
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last day of the period
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Windows covering the whole period
    pub fn windows(&self) -> Segmenter {
        Segmenter {
            next_start: Some(self.start),
            end: self.end,
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.granularity {
            PeriodGranularity::Monthly => write!(f, "{}-{:02}", self.year, self.value),
            PeriodGranularity::Quarterly => write!(f, "{}-Q{}", self.year, self.value),
        }
    }
}

impl FromStr for Period {
    type Err = WindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();

        if let Some((year, quarter)) = input.split_once("-Q") {
            let year = parse_year(input, year)?;
            let quarter: u32 = quarter
                .parse()
                .map_err(|_| invalid_period(input, "quarter is not a number"))?;
            return Period::quarterly(year, quarter);
        }

        let (year, month) = input
            .split_once('-')
            .ok_or_else(|| invalid_period(input, "expected YYYY-MM or YYYY-Qn"))?;
        let year = parse_year(input, year)?;
        let month: u32 = month
            .parse()
            .map_err(|_| invalid_period(input, "month is not a number"))?;
        Period::monthly(year, month)
    }
}

fn parse_year(input: &str, year: &str) -> Result<i32, WindowError> {
    if year.len() != 4 {
        return Err(invalid_period(input, "year must have four digits"));
    }
    year.parse()
        .map_err(|_| invalid_period(input, "year is not a number"))
}

fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let end = next_month.pred_opt()?;
    debug_assert_eq!(end.month(), month);
    Some((start, end))
}

fn invalid_period(input: impl Into<String>, reason: impl Into<String>) -> WindowError {
    WindowError::InvalidPeriod {
        input: input.into(),
        reason: reason.into(),
    }
}
