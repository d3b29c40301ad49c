//! Access policy: (principal, operation) -> allow / deny
//!
//! Precedence: superusers are allowed everything; a principal without an
//! employee profile is denied everything; an inactive employee is denied
//! with a distinguishable "account deactivated" reason; otherwise a small
//! department capability table decides. The table is enumerated rather than
//! matched on raw strings at each call site so the rule set stays auditable.
//!
//! Authorization checks never write. Updating `last_login` happens only on
//! the authentication path in the service layer.

use serde::{Deserialize, Serialize};

use crate::error::AccessDenied;
use crate::models::Employee;

/// Operation classes the policy decides over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Read,
    Create,
    Update,
    Delete,
    ClearDebt,
    ManageEmployees,
}

impl Operation {
    /// Read-only operations are "safe": they never change state.
    pub fn is_read_only(self) -> bool {
        matches!(self, Operation::Read)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::Read => "read",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::ClearDebt => "clear_debt",
            Operation::ManageEmployees => "manage_employees",
        };
        f.write_str(name)
    }
}

/// The acting principal behind an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub username: String,
    pub superuser: bool,
}

impl Principal {
    pub fn user(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            superuser: false,
        }
    }

    pub fn superuser(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            superuser: true,
        }
    }
}

/// Departments with distinct capability sets. Free-form department names
/// map onto this enum; anything unrecognized gets read-only access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Department {
    Administration,
    Sales,
    Analytics,
    Other,
}

impl Department {
    /// Case-insensitive match over the known department names, including
    /// their Russian spellings.
    pub fn from_name(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "администрация" | "administration" | "руководство" => Department::Administration,
            "продажи" | "sales" | "торговый отдел" => Department::Sales,
            "аналитика" | "analytics" | "отдел анализа" => Department::Analytics,
            _ => Department::Other,
        }
    }

    /// Capability table: administration does everything, sales everything
    /// but delete, analytics and unrecognized departments read only.
    pub fn allows(self, operation: Operation) -> bool {
        match self {
            Department::Administration => true,
            Department::Sales => operation != Operation::Delete,
            Department::Analytics | Department::Other => operation.is_read_only(),
        }
    }
}

/// Decide whether `principal` may perform `operation`.
///
/// `employee` is the profile resolved for the principal, if any. Pure: the
/// caller owns the lookup and any side effects.
pub fn authorize(
    principal: &Principal,
    employee: Option<&Employee>,
    operation: Operation,
) -> Result<(), AccessDenied> {
    if principal.superuser {
        return Ok(());
    }

    let employee = employee.ok_or_else(|| AccessDenied::NoProfile {
        username: principal.username.clone(),
    })?;

    if !employee.is_active {
        return Err(AccessDenied::AccountDeactivated {
            username: principal.username.clone(),
        });
    }

    let department = Department::from_name(&employee.department);
    if department.allows(operation) {
        Ok(())
    } else {
        Err(AccessDenied::InsufficientDepartment {
            department: employee.department.clone(),
            operation,
        })
    }
}
