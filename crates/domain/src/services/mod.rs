//! Domain services for the check-in tracker.
//!
//! Services contain business logic that operates on domain models, plus the
//! storage traits the persistence crate implements.

pub mod accounts;
pub mod announcement;
pub mod change_feed;
pub mod check_in;
pub mod roster;
pub mod snapshot;

pub use accounts::{AccountError, AdminAccountStore};
pub use announcement::Phrasebook;
pub use change_feed::{
    ChangeEvent, ChangeFeed, ChangeKind, EventFilter, FeedError, Subscription,
    DEFAULT_FEED_CAPACITY,
};
pub use check_in::{CheckInTimings, KioskRegistry, KioskSession};
pub use roster::{MarkPresentResult, MockRosterStore, RosterError, RosterOrder, RosterStore};
pub use snapshot::{ApplyOutcome, RosterSnapshot, SnapshotCache};
