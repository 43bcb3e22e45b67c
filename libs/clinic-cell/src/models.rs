use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::{StaffMember, StaffRole};

// ==============================================================================
// CATALOG REFERENCE DATA
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClinicRoom {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub specialty_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Specialty {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub specialty_id: Uuid,
    pub duration_minutes: u32,
    pub requires_doctor: bool,
    #[serde(default)]
    pub requires_technician: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booth {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub room_id: Uuid,
    pub is_active: bool,
}

/// Join record between a booth and a service it can perform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct BoothService {
    pub booth_id: Uuid,
    pub service_id: Uuid,
}

/// What the scheduler needs to know about a service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceProfile {
    pub id: Uuid,
    pub name: String,
    pub specialty_id: Uuid,
    pub duration_minutes: u32,
    pub requires_doctor: bool,
    pub requires_technician: bool,
    pub compatible_booth_ids: Vec<Uuid>,
}

/// A booth together with the services it is linked to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoothProfile {
    pub booth: Booth,
    pub specialty_id: Uuid,
    pub compatible_service_ids: Vec<Uuid>,
}

// ==============================================================================
// STAFFING
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StaffAvailability {
    pub staff_id: Uuid,
    pub role: StaffRole,
    pub specialty_id: Option<Uuid>,
    pub is_available: bool,
    pub shift_start: Option<DateTime<Utc>>,
    pub shift_end: Option<DateTime<Utc>>,
}

impl StaffAvailability {
    /// Available and, when a shift is set, inside it.
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        if !self.is_available {
            return false;
        }
        let after_start = self.shift_start.map_or(true, |start| start <= at);
        let before_end = self.shift_end.map_or(true, |end| at < end);
        after_start && before_end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffSeed {
    pub member: StaffMember,
    #[serde(default = "default_available")]
    pub is_available: bool,
    #[serde(default)]
    pub shift_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub shift_end: Option<DateTime<Utc>>,
}

fn default_available() -> bool {
    true
}

/// JSON seed loaded at startup to populate reference data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClinicSeed {
    #[serde(default)]
    pub specialties: Vec<Specialty>,
    #[serde(default)]
    pub rooms: Vec<ClinicRoom>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub booths: Vec<Booth>,
    #[serde(default)]
    pub booth_services: Vec<BoothService>,
    #[serde(default)]
    pub staff: Vec<StaffSeed>,
}
