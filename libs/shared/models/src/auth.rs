use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Doctor,
    Nurse,
    Technician,
    Receptionist,
    Accountant,
    Patient,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Admin,
        Role::Doctor,
        Role::Nurse,
        Role::Technician,
        Role::Receptionist,
        Role::Accountant,
        Role::Patient,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Nurse => "nurse",
            Role::Technician => "technician",
            Role::Receptionist => "receptionist",
            Role::Accountant => "accountant",
            Role::Patient => "patient",
        }
    }

    /// Roles backed by a staff record.
    pub fn is_staff(&self) -> bool {
        !matches!(self, Role::Admin | Role::Patient)
    }

    pub fn can(&self, capability: Capability) -> bool {
        capability.allowed_roles().contains(self)
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Patient
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| format!("unknown role: {}", s))
    }
}

/// Operations gated by role. Reads that only need a signed-in user carry no capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ManagePatients,
    DeletePatients,
    ManageStaff,
    ManageClinics,
    ManageAppointments,
    DeleteAppointments,
    ManageInvoices,
    ViewRevenueReports,
}

impl Capability {
    pub fn allowed_roles(&self) -> &'static [Role] {
        match self {
            Capability::ManagePatients | Capability::ManageAppointments => {
                &[Role::Admin, Role::Receptionist, Role::Doctor, Role::Nurse]
            }
            Capability::DeletePatients
            | Capability::ManageStaff
            | Capability::ManageClinics
            | Capability::DeleteAppointments => &[Role::Admin],
            Capability::ManageInvoices => &[Role::Admin, Role::Accountant, Role::Receptionist],
            Capability::ViewRevenueReports => &[Role::Admin, Role::Accountant],
        }
    }
}

/// Stored account. The hash never leaves the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The caller resolved by the authentication middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
}

impl AuthUser {
    pub fn authorize(&self, allowed_roles: &[Role]) -> Result<(), AppError> {
        if allowed_roles.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "You do not have permission to access this resource".to_string(),
            ))
        }
    }

    pub fn require(&self, capability: Capability) -> Result<(), AppError> {
        self.authorize(capability.allowed_roles())
    }
}

impl From<&User> for AuthUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
            is_active: user.is_active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Serialize)]
pub struct AuthPayload {
    pub user: User,
    pub token: String,
}
