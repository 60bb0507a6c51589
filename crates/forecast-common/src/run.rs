//! Model runs (initialization cycles).
//!
//! A run is identified by its initialization date and cycle hour. The
//! textual form `YYYYMMDDHH` (e.g. `2026010300`) is used for directory
//! names, manifest keys and log fields.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CommonError;

/// Hours between consecutive initialization cycles.
pub const CYCLE_HOURS: u32 = 6;

/// Initialization cycle of a 4x-daily model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Cycle {
    /// 00Z run
    Z00,
    /// 06Z run
    Z06,
    /// 12Z run
    Z12,
    /// 18Z run
    Z18,
}

impl Cycle {
    pub fn from_hour(hour: u32) -> Option<Self> {
        match hour {
            0 => Some(Cycle::Z00),
            6 => Some(Cycle::Z06),
            12 => Some(Cycle::Z12),
            18 => Some(Cycle::Z18),
            _ => None,
        }
    }

    pub fn hour(&self) -> u32 {
        match self {
            Cycle::Z00 => 0,
            Cycle::Z06 => 6,
            Cycle::Z12 => 12,
            Cycle::Z18 => 18,
        }
    }

    /// All four daily cycles in chronological order.
    pub fn all() -> &'static [Cycle] {
        &[Cycle::Z00, Cycle::Z06, Cycle::Z12, Cycle::Z18]
    }
}

/// Identifier of one model run: initialization date plus cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId {
    date: NaiveDate,
    cycle: Cycle,
}

impl RunId {
    pub fn new(date: NaiveDate, cycle: Cycle) -> Self {
        Self { date, cycle }
    }

    /// The newest cycle slot whose initialization time is at or before `time`.
    pub fn latest_at_or_before(time: DateTime<Utc>) -> Self {
        let hour = time.hour() / CYCLE_HOURS * CYCLE_HOURS;
        // hour is always one of 0/6/12/18 here
        let cycle = Cycle::from_hour(hour).unwrap_or(Cycle::Z00);
        Self {
            date: time.date_naive(),
            cycle,
        }
    }

    /// The run one cycle earlier.
    pub fn previous(&self) -> Option<Self> {
        let previous_time = self.init_time() - Duration::hours(CYCLE_HOURS as i64);
        Some(Self::latest_at_or_before(previous_time))
    }

    /// Initialization time in UTC.
    pub fn init_time(&self) -> DateTime<Utc> {
        let naive = self
            .date
            .and_hms_opt(self.cycle.hour(), 0, 0)
            .unwrap_or_default();
        Utc.from_utc_datetime(&naive)
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn cycle(&self) -> Cycle {
        self.cycle
    }

    /// Date component as `YYYYMMDD`.
    pub fn date_str(&self) -> String {
        self.date.format("%Y%m%d").to_string()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:02}", self.date.format("%Y%m%d"), self.cycle.hour())
    }
}

impl FromStr for RunId {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 10 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CommonError::InvalidRunId(s.to_string()));
        }

        let date = NaiveDate::parse_from_str(&s[..8], "%Y%m%d")
            .map_err(|_| CommonError::InvalidRunId(s.to_string()))?;
        let hour: u32 = s[8..]
            .parse()
            .map_err(|_| CommonError::InvalidRunId(s.to_string()))?;
        let cycle = Cycle::from_hour(hour).ok_or_else(|| CommonError::InvalidRunId(s.to_string()))?;

        Ok(Self { date, cycle })
    }
}

impl Serialize for RunId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RunId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Publication status of a run on the remote source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Unknown,
    Available,
    Missing,
}

/// A run together with what the resolver learned about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub status: RunStatus,
}

impl Run {
    /// A run whose publication has not been checked yet.
    pub fn unknown(id: RunId) -> Self {
        Self {
            id,
            status: RunStatus::Unknown,
        }
    }

    /// A run confirmed as published.
    pub fn available(id: RunId) -> Self {
        Self {
            id,
            status: RunStatus::Available,
        }
    }

    /// Record whether the run is published. Confirmed runs are immutable, so only an
    /// `Unknown` run changes status.
    pub fn confirm(self, published: bool) -> Self {
        match self.status {
            RunStatus::Unknown => Self {
                id: self.id,
                status: if published {
                    RunStatus::Available
                } else {
                    RunStatus::Missing
                },
            },
            _ => self,
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == RunStatus::Available
    }
}

impl fmt::Display for Run {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.id.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_format_run_id() {
        let id: RunId = "2026010300".parse().unwrap();
        assert_eq!(id.cycle(), Cycle::Z00);
        assert_eq!(id.date_str(), "20260103");
        assert_eq!(id.to_string(), "2026010300");
    }

    #[test]
    fn test_rejects_off_cycle_hours() {
        assert!("2026010303".parse::<RunId>().is_err());
        assert!("20260103".parse::<RunId>().is_err());
        assert!("2026013200".parse::<RunId>().is_err());
    }

    #[test]
    fn test_latest_at_or_before_floors_to_cycle() {
        let t = Utc.with_ymd_and_hms(2026, 1, 3, 17, 59, 59).unwrap();
        assert_eq!(RunId::latest_at_or_before(t).to_string(), "2026010312");

        let t = Utc.with_ymd_and_hms(2026, 1, 3, 18, 0, 0).unwrap();
        assert_eq!(RunId::latest_at_or_before(t).to_string(), "2026010318");
    }

    #[test]
    fn test_previous_crosses_midnight() {
        let id: RunId = "2026010100".parse().unwrap();
        assert_eq!(id.previous().unwrap().to_string(), "2025123118");
    }

    #[test]
    fn test_ordering_follows_init_time() {
        let a: RunId = "2026010218".parse().unwrap();
        let b: RunId = "2026010300".parse().unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_confirmed_run_is_immutable() {
        let id: RunId = "2026010300".parse().unwrap();
        let run = Run::unknown(id).confirm(false);
        assert_eq!(run.status, RunStatus::Missing);
        assert_eq!(run.confirm(true).status, RunStatus::Missing);
    }

    #[test]
    fn test_run_id_serializes_as_string() {
        let id: RunId = "2026010306".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"2026010306\"");
        let back: RunId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
