//! Forecast hours and their processing lifecycle.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CommonError;

/// Offset in hours from a run's initialization time, labelled `fNNN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ForecastHour(u16);

impl ForecastHour {
    pub const fn new(hours: u16) -> Self {
        Self(hours)
    }

    pub fn hours(&self) -> u16 {
        self.0
    }

    /// Three-digit label, e.g. `f006`.
    pub fn label(&self) -> String {
        format!("f{:03}", self.0)
    }

    /// Hours from `start` to `end` inclusive, every `step` hours.
    pub fn range(start: u16, end: u16, step: u16) -> Vec<ForecastHour> {
        if step == 0 || start > end {
            return vec![ForecastHour(start)];
        }
        (start..=end).step_by(step as usize).map(ForecastHour).collect()
    }
}

impl fmt::Display for ForecastHour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{:03}", self.0)
    }
}

impl FromStr for ForecastHour {
    type Err = CommonError;

    /// Accepts `f006`, `006` or `6`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix('f')
            .or_else(|| trimmed.strip_prefix('F'))
            .unwrap_or(trimmed);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CommonError::InvalidForecastHour(s.to_string()));
        }
        digits
            .parse::<u16>()
            .map(ForecastHour)
            .map_err(|_| CommonError::InvalidForecastHour(s.to_string()))
    }
}

impl Serialize for ForecastHour {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ForecastHour {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Why a forecast hour (or one of its fields) did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    NotYetPublished,
    NetworkFailure,
    CorruptFile,
    FieldNotFound,
    RenderFailure,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::NotYetPublished => "not_yet_published",
            FailureReason::NetworkFailure => "network_failure",
            FailureReason::CorruptFile => "corrupt_file",
            FailureReason::FieldNotFound => "field_not_found",
            FailureReason::RenderFailure => "render_failure",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one forecast hour within an invocation.
///
/// `Pending -> Downloading -> Downloaded -> Decoded -> Rendered`, or
/// `Failed(reason)` from any non-terminal state. A download that finds the
/// file not yet published goes back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HourState {
    Pending,
    Downloading,
    Downloaded,
    Decoded,
    Rendered,
    Failed(FailureReason),
}

impl HourState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, HourState::Rendered | HourState::Failed(_))
    }

    /// Move to `next`, rejecting transitions outside the lifecycle.
    pub fn advance(self, next: HourState) -> Result<HourState, CommonError> {
        use HourState::*;

        let legal = match (self, next) {
            (from, Failed(_)) => !from.is_terminal(),
            (Pending, Downloading) => true,
            (Downloading, Downloaded) => true,
            (Downloading, Pending) => true,
            (Downloaded, Decoded) => true,
            (Decoded, Rendered) => true,
            _ => false,
        };

        if legal {
            Ok(next)
        } else {
            Err(CommonError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HourState::Pending => "pending",
            HourState::Downloading => "downloading",
            HourState::Downloaded => "downloaded",
            HourState::Decoded => "decoded",
            HourState::Rendered => "rendered",
            HourState::Failed(_) => "failed",
        }
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            HourState::Failed(reason) => Some(*reason),
            _ => None,
        }
    }
}

impl fmt::Display for HourState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HourState::Failed(reason) => write!(f, "failed({})", reason),
            other => f.write_str(other.name()),
        }
    }
}
