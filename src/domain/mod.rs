//! Domain module
//!
//! Core domain types and business logic.

pub mod department;
pub mod error;
pub mod role;
pub mod segment;
pub mod transition;
pub mod user;

pub use department::DepartmentRecord;
pub use error::DomainError;
pub use role::{RoleType, UnknownRole};
pub use segment::{
    check_segment_batch, check_segment_fits, percentage_of, SegmentInput, SegmentRecord,
};
pub use transition::{plan_deactivation, plan_update, RoleChange, TransitionPlan};
pub use user::{UnknownStatus, UserRecord, UserStatus};
