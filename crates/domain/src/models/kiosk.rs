//! Kiosk-facing models: check-in outcomes, announcements, and search results.

use serde::Serialize;
use uuid::Uuid;

use super::graduate::Graduate;

/// Visible state of a scanner kiosk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KioskState {
    Ready,
    Processing,
    Success,
    Error,
}

/// Why a check-in attempt ended the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInReason {
    CheckedIn,
    NotFound,
    AlreadyCheckedIn,
    Failed,
}

impl CheckInReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckedIn => "checked_in",
            Self::NotFound => "not_found",
            Self::AlreadyCheckedIn => "already_checked_in",
            Self::Failed => "failed",
        }
    }

    /// Terminal kiosk state this reason is displayed in.
    pub fn state(&self) -> KioskState {
        match self {
            Self::CheckedIn => KioskState::Success,
            _ => KioskState::Error,
        }
    }
}

/// Text for the kiosk to speak, with voice parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub text: String,
    pub lang: String,
    pub rate: f32,
    pub pitch: f32,
}

/// Result of one accepted check-in attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInOutcome {
    pub state: KioskState,
    pub reason: CheckInReason,
    pub graduate: Option<Graduate>,
    pub announcement: Announcement,
    /// Milliseconds until the kiosk returns to ready.
    pub ready_in_ms: u64,
}

/// Why an attempt was not processed at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// A previous attempt is still processing or showing its outcome.
    Busy,
    /// Same code as the attempt currently shown as a success.
    DuplicateScan,
}

/// What the kiosk did with a scanned or submitted code.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ScanResult {
    Processed(CheckInOutcome),
    Ignored { reason: IgnoreReason },
}

impl ScanResult {
    pub fn outcome(&self) -> Option<&CheckInOutcome> {
        match self {
            Self::Processed(outcome) => Some(outcome),
            Self::Ignored { .. } => None,
        }
    }
}

/// Snapshot of one kiosk session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KioskStatus {
    pub kiosk_id: Uuid,
    pub state: KioskState,
    pub last_scanned: Option<String>,
    pub manual_search: String,
    pub search_result: Option<Graduate>,
    /// Milliseconds until the current outcome clears, when one is shown.
    pub ready_in_ms: Option<u64>,
}

/// Result of a manual lookup.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", content = "graduate", rename_all = "snake_case")]
pub enum SearchOutcome {
    Found(Graduate),
    NoMatch,
    /// A newer query from the same kiosk replaced this one.
    Superseded,
    /// Query shorter than the minimum length; nothing was looked up.
    TooShort,
}
