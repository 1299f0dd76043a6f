//! Graduate (roster entry) domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use shared::validation::{validate_not_blank, validate_student_id};

/// Attendance state of a roster entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Pending,
    Present,
}

impl AttendanceStatus {
    /// Convert to database string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Present => "present",
        }
    }
}

impl std::fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "present" => Ok(Self::Present),
            other => Err(format!("Unknown attendance status: {}", other)),
        }
    }
}

/// One graduate's record in the roster.
///
/// `status == Present` exactly when `check_in_at` is set; both change together
/// in the check-in transition and never revert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Graduate {
    pub id: Uuid,
    pub student_id: String,
    pub fullname: String,
    pub faculty: String,
    pub degree: Option<String>,
    pub status: AttendanceStatus,
    pub check_in_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Graduate {
    /// Builds a pending entry from import data. Used by stores that generate
    /// their own identifiers.
    pub fn pending(id: Uuid, input: NewGraduate, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            student_id: input.student_id,
            fullname: input.fullname,
            faculty: input.faculty,
            degree: input.degree,
            status: AttendanceStatus::Pending,
            check_in_at: None,
            created_at,
        }
    }

    pub fn is_present(&self) -> bool {
        self.status == AttendanceStatus::Present
    }

    /// Returns a copy transitioned to present at the given instant.
    pub fn checked_in(&self, at: DateTime<Utc>) -> Self {
        Self {
            status: AttendanceStatus::Present,
            check_in_at: Some(at),
            ..self.clone()
        }
    }

    /// Whether the attendance invariant holds for this record.
    pub fn is_consistent(&self) -> bool {
        self.is_present() == self.check_in_at.is_some()
    }
}

/// A roster entry to be inserted by bulk import.
#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewGraduate {
    #[validate(custom(function = "validate_student_id"))]
    pub student_id: String,

    #[validate(custom(function = "validate_not_blank"))]
    #[validate(length(max = 200, message = "fullname must be at most 200 characters"))]
    pub fullname: String,

    #[serde(default)]
    #[validate(length(max = 200, message = "faculty must be at most 200 characters"))]
    pub faculty: String,

    #[validate(length(max = 200, message = "degree must be at most 200 characters"))]
    pub degree: Option<String>,
}

/// Printable QR credential for one graduate.
///
/// The QR payload is the student ID itself, so a kiosk decoding the code
/// gets exactly the lookup key.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub id: Uuid,
    pub student_id: String,
    pub fullname: String,
    pub faculty: String,
    pub qr_payload: String,
    pub status: AttendanceStatus,
}

impl From<&Graduate> for Credential {
    fn from(graduate: &Graduate) -> Self {
        Self {
            id: graduate.id,
            student_id: graduate.student_id.clone(),
            fullname: graduate.fullname.clone(),
            faculty: graduate.faculty.clone(),
            qr_payload: graduate.student_id.clone(),
            status: graduate.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_input() -> NewGraduate {
        NewGraduate {
            student_id: "6401234567".to_string(),
            fullname: "สมชาย ใจดี".to_string(),
            faculty: "วิศวกรรมศาสตร์".to_string(),
            degree: Some("วิศวกรรมศาสตรบัณฑิต".to_string()),
        }
    }

    #[test]
    fn test_status_roundtrip_strings() {
        assert_eq!(AttendanceStatus::Pending.as_str(), "pending");
        assert_eq!(AttendanceStatus::Present.to_string(), "present");
        assert_eq!(
            "present".parse::<AttendanceStatus>().unwrap(),
            AttendanceStatus::Present
        );
        assert!("absent".parse::<AttendanceStatus>().is_err());
    }

    #[test]
    fn test_pending_entry_has_no_check_in() {
        let graduate = Graduate::pending(Uuid::new_v4(), sample_input(), Utc::now());
        assert_eq!(graduate.status, AttendanceStatus::Pending);
        assert!(graduate.check_in_at.is_none());
        assert!(graduate.is_consistent());
    }

    #[test]
    fn test_checked_in_sets_status_and_timestamp_together() {
        let graduate = Graduate::pending(Uuid::new_v4(), sample_input(), Utc::now());
        let at = Utc::now();
        let present = graduate.checked_in(at);

        assert!(present.is_present());
        assert_eq!(present.check_in_at, Some(at));
        assert!(present.is_consistent());
        assert_eq!(present.id, graduate.id);
        assert_eq!(present.student_id, graduate.student_id);
    }

    #[test]
    fn test_graduate_serializes_camel_case() {
        let graduate = Graduate::pending(Uuid::nil(), sample_input(), Utc::now());
        let value = serde_json::to_value(&graduate).unwrap();

        assert_eq!(value["studentId"], "6401234567");
        assert_eq!(value["status"], "pending");
        assert!(value["checkInAt"].is_null());
    }

    #[test]
    fn test_new_graduate_validation() {
        assert!(sample_input().validate().is_ok());

        let mut blank_name = sample_input();
        blank_name.fullname = "  ".to_string();
        assert!(blank_name.validate().is_err());

        let mut blank_id = sample_input();
        blank_id.student_id = String::new();
        assert!(blank_id.validate().is_err());
    }

    #[test]
    fn test_new_graduate_deserialize_defaults() {
        let input: NewGraduate =
            serde_json::from_value(json!({"studentId": "1", "fullname": "A"})).unwrap();
        assert_eq!(input.faculty, "");
        assert!(input.degree.is_none());
    }

    #[test]
    fn test_credential_uses_student_id_as_payload() {
        let graduate = Graduate::pending(Uuid::new_v4(), sample_input(), Utc::now());
        let credential = Credential::from(&graduate);
        assert_eq!(credential.qr_payload, "6401234567");
        assert_eq!(credential.fullname, graduate.fullname);
    }
}
