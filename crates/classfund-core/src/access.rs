//! Class-scoped access control.
//!
//! Role resolution happens in exactly one place
//! ([`Database::role_in_class`](crate::db::Database::role_in_class)); the
//! helpers here turn the resolved role into an authorization decision.
//! Handlers call these before any other validation so a forbidden request
//! never touches state.

use crate::error::{Error, Result};
use crate::models::ClassRole;

/// Require any active membership in the class
pub fn ensure_member(role: Option<ClassRole>) -> Result<ClassRole> {
    role.ok_or_else(|| Error::Forbidden("not a member of this class".into()))
}

/// Require owner or treasurer
pub fn ensure_treasurer_like(role: Option<ClassRole>) -> Result<ClassRole> {
    match role {
        Some(r) if r.is_treasurer_like() => Ok(r),
        Some(_) => Err(Error::Forbidden(
            "owner or treasurer role required".into(),
        )),
        None => Err(Error::Forbidden("not a member of this class".into())),
    }
}

/// Require the class owner
pub fn ensure_owner(role: Option<ClassRole>) -> Result<ClassRole> {
    match role {
        Some(ClassRole::Owner) => Ok(ClassRole::Owner),
        Some(_) => Err(Error::Forbidden("owner role required".into())),
        None => Err(Error::Forbidden("not a member of this class".into())),
    }
}
