//! Employee records and DTOs
//!
//! Employees are the acting principals behind write operations. The access
//! policy consumes the `department` and `is_active` fields; `last_login` is
//! touched only on the authentication path.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted employee record, one per user principal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub department: String,
    pub position: String,
    pub is_active: bool,
    pub hire_date: NaiveDate,
    pub last_login: Option<DateTime<Utc>>,
}

/// Input for registering an employee (admin-only operation)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEmployee {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub department: String,
    pub position: String,
}
