//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod admin_user;
pub mod graduate;

pub use admin_user::AdminUserEntity;
pub use graduate::{GraduateChangeNotification, GraduateEntity};
