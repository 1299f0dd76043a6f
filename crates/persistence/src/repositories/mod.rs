//! Repository implementations for database operations.

pub mod admin_user;
pub mod graduate;

pub use admin_user::AdminUserRepository;
pub use graduate::GraduateRepository;
