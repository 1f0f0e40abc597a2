//! Authentication and authorization.
//!
//! Stateless token issuance and verification, password hashing, the
//! role-to-operation policy table, and per-resource ownership checks.

pub mod authorization;
pub mod password;
pub mod policy;
pub mod token;

pub use authorization::{grants_modify, grants_view, ResourceAuthorization, ResourceKind};
pub use password::{hash_password, verify_password};
pub use policy::{allowed_roles, can_perform, Operation};
pub use token::{Claims, TokenError, TokenService};
