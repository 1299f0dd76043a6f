//! Roster statistics shown on the dashboard and in the admin console.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::graduate::Graduate;

/// Entry in the recently-checked-in list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentEntry {
    pub id: Uuid,
    pub student_id: String,
    pub fullname: String,
    pub faculty: String,
    pub check_in_at: DateTime<Utc>,
}

/// Aggregate view over one roster snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterStats {
    pub total: usize,
    pub present_count: usize,
    pub pending_count: usize,
    /// Rounded percentage of present entries, 0 for an empty roster.
    pub progress: u8,
    /// Present entries, most recent check-in first.
    pub present_list: Vec<PresentEntry>,
}

impl RosterStats {
    /// Projects a roster snapshot into counts and the recent list.
    ///
    /// Entries sharing a check-in instant keep their snapshot order.
    pub fn from_roster(roster: &[Graduate]) -> Self {
        let mut present_list: Vec<PresentEntry> = roster
            .iter()
            .filter_map(|g| {
                let check_in_at = g.check_in_at.filter(|_| g.is_present())?;
                Some(PresentEntry {
                    id: g.id,
                    student_id: g.student_id.clone(),
                    fullname: g.fullname.clone(),
                    faculty: g.faculty.clone(),
                    check_in_at,
                })
            })
            .collect();

        // sort_by is stable
        present_list.sort_by(|a, b| b.check_in_at.cmp(&a.check_in_at));

        let total = roster.len();
        let present_count = present_list.len();

        Self {
            total,
            present_count,
            pending_count: total - present_count,
            progress: progress_percent(present_count, total),
            present_list,
        }
    }

    /// Caps the recent list without touching the counts.
    pub fn with_recent_limit(mut self, limit: Option<usize>) -> Self {
        if let Some(limit) = limit {
            self.present_list.truncate(limit);
        }
        self
    }
}

fn progress_percent(present: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((present as f64 / total as f64) * 100.0).round() as u8
}
