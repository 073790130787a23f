//! Wall-Clock Timestamps for Log Lines

use chrono::{DateTime, Local, TimeZone};

/// `YYYYMMDDHHMMSS`
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Source of the date/time stamp written in front of each reading
pub trait DateTimeSource {
    /// Current date/time as `YYYYMMDDHHMMSS`, `None` when the clock is unavailable
    fn timestamp(&mut self) -> Option<String>;
}

impl<D: DateTimeSource + ?Sized> DateTimeSource for Box<D> {
    fn timestamp(&mut self) -> Option<String> {
        (**self).timestamp()
    }
}

/// Date/time from the system real-time clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDateTime;

impl SystemDateTime {
    /// Format any date/time as a log stamp
    pub fn format<Tz: TimeZone>(at: &DateTime<Tz>) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        at.format(TIMESTAMP_FORMAT).to_string()
    }
}

impl DateTimeSource for SystemDateTime {
    fn timestamp(&mut self) -> Option<String> {
        let now = Local::now();
        // An unset RTC reports the epoch; treat that as unavailable
        if now.timestamp() <= 0 {
            return None;
        }
        Some(Self::format(&now))
    }
}
