//! Graduate entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{AttendanceStatus, Graduate};
use domain::services::{ChangeEvent, ChangeKind};
use serde::Deserialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the graduates table.
///
/// Also deserializes from the `row_to_json` image carried by change
/// notifications.
#[derive(Debug, Clone, FromRow, Deserialize)]
pub struct GraduateEntity {
    pub id: Uuid,
    pub student_id: String,
    pub fullname: String,
    pub faculty: String,
    pub degree: Option<String>,
    pub status: String,
    pub check_in_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<GraduateEntity> for Graduate {
    fn from(entity: GraduateEntity) -> Self {
        // The status column is CHECK-constrained to the two known values.
        let status = entity.status.parse().unwrap_or(AttendanceStatus::Pending);
        Self {
            id: entity.id,
            student_id: entity.student_id,
            fullname: entity.fullname,
            faculty: entity.faculty,
            degree: entity.degree,
            status,
            check_in_at: entity.check_in_at,
            created_at: entity.created_at,
        }
    }
}

/// Payload published by the graduates table triggers.
#[derive(Debug, Clone, Deserialize)]
pub struct GraduateChangeNotification {
    pub kind: ChangeKind,
    pub record: Option<GraduateEntity>,
}

impl From<GraduateChangeNotification> for ChangeEvent {
    fn from(notification: GraduateChangeNotification) -> Self {
        ChangeEvent::new(notification.kind, notification.record.map(Graduate::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_to_domain() {
        let entity = GraduateEntity {
            id: Uuid::new_v4(),
            student_id: "6401".to_string(),
            fullname: "Ann".to_string(),
            faculty: "Science".to_string(),
            degree: None,
            status: "present".to_string(),
            check_in_at: Some(Utc::now()),
            created_at: Utc::now(),
        };

        let graduate = Graduate::from(entity.clone());
        assert_eq!(graduate.id, entity.id);
        assert_eq!(graduate.status, AttendanceStatus::Present);
        assert!(graduate.is_consistent());
    }

    #[test]
    fn test_parse_row_notification() {
        let payload = r#"{
            "kind": "update",
            "record": {
                "id": "6f1c2f4e-8c53-4c59-9a51-1d1a2b3c4d5e",
                "student_id": "6401234567",
                "fullname": "สมชาย ใจดี",
                "faculty": "วิศวกรรมศาสตร์",
                "degree": null,
                "status": "present",
                "check_in_at": "2024-11-20T09:15:30.123456+00:00",
                "created_at": "2024-11-01T08:00:00+00:00",
                "seq": 42
            }
        }"#;

        let notification: GraduateChangeNotification = serde_json::from_str(payload).unwrap();
        let event = ChangeEvent::from(notification);
        assert_eq!(event.kind, ChangeKind::Update);
        let record = event.record.unwrap();
        assert_eq!(record.student_id, "6401234567");
        assert!(record.is_present());
    }

    #[test]
    fn test_parse_statement_delete_notification() {
        let notification: GraduateChangeNotification =
            serde_json::from_str(r#"{"kind": "delete", "record": null}"#).unwrap();
        let event = ChangeEvent::from(notification);
        assert_eq!(event.kind, ChangeKind::Delete);
        assert!(event.record.is_none());
    }
}
