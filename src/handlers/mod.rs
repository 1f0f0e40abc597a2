//! Command Handlers module
//!
//! Command handlers that orchestrate business operations. Each handler
//! validates its command, runs the domain planning, and applies all writes
//! in a single transaction.

mod auth_handler;
mod commands;
mod deactivate_user_handler;
mod department_handler;
mod segment_handler;
mod update_user_handler;

pub use auth_handler::AuthHandler;
pub use commands::*;
pub use deactivate_user_handler::DeactivateUserHandler;
pub use department_handler::DepartmentHandler;
pub use segment_handler::SegmentHandler;
pub use update_user_handler::UpdateUserHandler;
