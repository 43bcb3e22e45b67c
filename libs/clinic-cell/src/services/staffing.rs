use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_models::{FlowError, StaffMember, StaffRole};

use crate::models::{StaffAvailability, StaffSeed};

/// Read-only lookups of doctor and technician availability.
#[async_trait]
pub trait StaffingAdapter: Send + Sync {
    async fn get_doctor_availability(&self, doctor_id: Uuid) -> Result<StaffAvailability, FlowError>;

    async fn get_technician_availability(
        &self,
        technician_id: Uuid,
    ) -> Result<StaffAvailability, FlowError>;

    /// Staff of `role` on shift at `at`, restricted to `specialty_id` when given.
    async fn find_available(
        &self,
        role: StaffRole,
        specialty_id: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> Result<Vec<StaffAvailability>, FlowError>;
}

struct StaffRecord {
    member: StaffMember,
    is_available: bool,
    shift_start: Option<DateTime<Utc>>,
    shift_end: Option<DateTime<Utc>>,
}

impl StaffRecord {
    fn availability(&self) -> StaffAvailability {
        StaffAvailability {
            staff_id: self.member.id(),
            role: self.member.role(),
            specialty_id: self.member.specialty_id(),
            is_available: self.is_available,
            shift_start: self.shift_start,
            shift_end: self.shift_end,
        }
    }
}

pub struct InMemoryStaffing {
    staff: RwLock<HashMap<Uuid, StaffRecord>>,
}

impl InMemoryStaffing {
    pub fn new() -> Self {
        Self {
            staff: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_seed(seed: &[StaffSeed]) -> Self {
        let staff = seed
            .iter()
            .map(|s| {
                (
                    s.member.id(),
                    StaffRecord {
                        member: s.member.clone(),
                        is_available: s.is_available,
                        shift_start: s.shift_start,
                        shift_end: s.shift_end,
                    },
                )
            })
            .collect::<HashMap<_, _>>();
        debug!("Staffing seeded with {} members", staff.len());
        Self {
            staff: RwLock::new(staff),
        }
    }

    pub async fn register(&self, member: StaffMember) {
        let record = StaffRecord {
            member,
            is_available: true,
            shift_start: None,
            shift_end: None,
        };
        self.staff.write().await.insert(record.member.id(), record);
    }

    pub async fn set_available(&self, staff_id: Uuid, is_available: bool) -> Result<(), FlowError> {
        let mut staff = self.staff.write().await;
        let record = staff
            .get_mut(&staff_id)
            .ok_or_else(|| FlowError::not_found("staff member", staff_id))?;
        record.is_available = is_available;
        Ok(())
    }

    pub async fn set_shift(
        &self,
        staff_id: Uuid,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<(), FlowError> {
        let mut staff = self.staff.write().await;
        let record = staff
            .get_mut(&staff_id)
            .ok_or_else(|| FlowError::not_found("staff member", staff_id))?;
        record.shift_start = start;
        record.shift_end = end;
        Ok(())
    }

    async fn availability_for(
        &self,
        staff_id: Uuid,
        role: StaffRole,
        entity: &'static str,
    ) -> Result<StaffAvailability, FlowError> {
        let staff = self.staff.read().await;
        staff
            .get(&staff_id)
            .filter(|record| record.member.role() == role)
            .map(StaffRecord::availability)
            .ok_or_else(|| FlowError::not_found(entity, staff_id))
    }
}

impl Default for InMemoryStaffing {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StaffingAdapter for InMemoryStaffing {
    async fn get_doctor_availability(&self, doctor_id: Uuid) -> Result<StaffAvailability, FlowError> {
        self.availability_for(doctor_id, StaffRole::Doctor, "doctor").await
    }

    async fn get_technician_availability(
        &self,
        technician_id: Uuid,
    ) -> Result<StaffAvailability, FlowError> {
        self.availability_for(technician_id, StaffRole::Technician, "technician")
            .await
    }

    async fn find_available(
        &self,
        role: StaffRole,
        specialty_id: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> Result<Vec<StaffAvailability>, FlowError> {
        let staff = self.staff.read().await;
        let mut found: Vec<StaffAvailability> = staff
            .values()
            .filter(|record| record.member.role() == role)
            .map(StaffRecord::availability)
            .filter(|availability| availability.covers(at))
            .filter(|availability| match (specialty_id, availability.specialty_id) {
                (Some(wanted), Some(own)) => wanted == own,
                // Technicians without a specialty float between rooms.
                (Some(_), None) => role == StaffRole::Technician,
                (None, _) => true,
            })
            .collect();
        found.sort_by_key(|a| a.staff_id);
        Ok(found)
    }
}
