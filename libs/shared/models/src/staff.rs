use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StaffRole {
    Doctor,
    Technician,
    Receptionist,
    Cashier,
    Admin,
    Patient,
}

/// Role-specific account data, joined to the shared auth record by `auth_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StaffMember {
    Doctor {
        id: Uuid,
        auth_id: Uuid,
        name: String,
        specialty_id: Uuid,
        #[serde(default)]
        years_experience: Option<u32>,
    },
    Technician {
        id: Uuid,
        auth_id: Uuid,
        name: String,
        #[serde(default)]
        specialty_id: Option<Uuid>,
    },
    Receptionist {
        id: Uuid,
        auth_id: Uuid,
        name: String,
    },
    Cashier {
        id: Uuid,
        auth_id: Uuid,
        name: String,
    },
    Admin {
        id: Uuid,
        auth_id: Uuid,
        name: String,
    },
    Patient {
        id: Uuid,
        auth_id: Uuid,
        name: String,
    },
}

impl StaffMember {
    pub fn id(&self) -> Uuid {
        match self {
            StaffMember::Doctor { id, .. }
            | StaffMember::Technician { id, .. }
            | StaffMember::Receptionist { id, .. }
            | StaffMember::Cashier { id, .. }
            | StaffMember::Admin { id, .. }
            | StaffMember::Patient { id, .. } => *id,
        }
    }

    pub fn role(&self) -> StaffRole {
        match self {
            StaffMember::Doctor { .. } => StaffRole::Doctor,
            StaffMember::Technician { .. } => StaffRole::Technician,
            StaffMember::Receptionist { .. } => StaffRole::Receptionist,
            StaffMember::Cashier { .. } => StaffRole::Cashier,
            StaffMember::Admin { .. } => StaffRole::Admin,
            StaffMember::Patient { .. } => StaffRole::Patient,
        }
    }

    pub fn specialty_id(&self) -> Option<Uuid> {
        match self {
            StaffMember::Doctor { specialty_id, .. } => Some(*specialty_id),
            StaffMember::Technician { specialty_id, .. } => *specialty_id,
            _ => None,
        }
    }
}
