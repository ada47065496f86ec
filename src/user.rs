//! Users and roles. The manager link is stored as an id reference, never
//! an owning pointer; cycle rejection happens at write time in the
//! service layer with a bounded walk.

use crate::error::ApprovalError;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    #[n(0)]
    Admin,
    #[n(1)]
    Manager,
    #[n(2)]
    Employee,
}

impl Role {
    /// Admins and managers may sit in approval chains and act on expenses.
    pub fn can_approve(self) -> bool {
        matches!(self, Role::Admin | Role::Manager)
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct User {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub company: String,
    #[n(2)]
    pub name: String,
    #[n(3)]
    pub email: String,
    #[n(4)]
    pub role: Role,
    /// Self-referential: the manager is another user of the same company.
    #[n(5)]
    pub manager: Option<String>,
    /// Soft-delete marker; users are never hard-deleted.
    #[n(6)]
    pub is_active: bool,
}

pub(crate) fn validate_name(name: &str) -> Result<(), ApprovalError> {
    let len = name.trim().chars().count();
    if !(2..=50).contains(&len) {
        return Err(ApprovalError::Validation(
            "name must be 2 to 50 characters".into(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_email(email: &str) -> Result<(), ApprovalError> {
    // the full mailbox grammar lives at the (out of scope) edge; this only
    // guards against obviously broken records
    let trimmed = email.trim();
    if trimmed.len() < 3 || !trimmed.contains('@') {
        return Err(ApprovalError::Validation(format!(
            "invalid email address: {trimmed:?}"
        )));
    }
    Ok(())
}

/// Admin-supplied fields for a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub manager: Option<String>,
}

impl NewUser {
    pub fn validate(&self) -> Result<(), ApprovalError> {
        validate_name(&self.name)?;
        validate_email(&self.email)
    }
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Default, Clone)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    /// `Some(None)` clears the manager link.
    pub manager: Option<Option<String>>,
    pub is_active: Option<bool>,
}
