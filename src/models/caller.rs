use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Rider,
    Driver,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Rider => "rider",
            Role::Driver => "driver",
            Role::Admin => "admin",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rider" => Ok(Role::Rider),
            "driver" => Ok(Role::Driver),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// Authenticated caller, extracted once by the request façade and passed
/// explicitly into service operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: Uuid,
    pub role: Role,
}

impl CallerIdentity {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn rider(user_id: Uuid) -> Self {
        Self::new(user_id, Role::Rider)
    }

    pub fn driver(user_id: Uuid) -> Self {
        Self::new(user_id, Role::Driver)
    }

    pub fn require(&self, role: Role) -> Result<()> {
        if self.role != role {
            return Err(AppError::Forbidden(format!("{} role required", role)));
        }
        Ok(())
    }
}
