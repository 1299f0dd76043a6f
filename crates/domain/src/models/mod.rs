//! Domain models for the check-in tracker.

pub mod admin;
pub mod graduate;
pub mod import;
pub mod kiosk;
pub mod stats;

pub use admin::{AdminAccount, AdminSession, LoginRequest, LoginResponse, NewAdminAccount, SessionInfo};
pub use graduate::{AttendanceStatus, Credential, Graduate, NewGraduate};
pub use import::{ImportError, ImportRequest, ImportSummary};
pub use kiosk::{
    Announcement, CheckInOutcome, CheckInReason, IgnoreReason, KioskState, KioskStatus, ScanResult,
    SearchOutcome,
};
pub use stats::{PresentEntry, RosterStats};
