use std::sync::Arc;
use uuid::Uuid;

use clinic_cell::{Booth, ClinicRoom, InMemoryCatalog, InMemoryStaffing, Service, Specialty};
use shared_config::AppConfig;
use shared_models::StaffMember;

/// Config with fast no-show handling, for tests that exercise the monitor.
pub struct TestConfig {
    pub skip_threshold: u32,
    pub no_show_grace_seconds: u64,
    pub sequential_services: bool,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            skip_threshold: 3,
            no_show_grace_seconds: 0,
            sequential_services: false,
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            skip_threshold: self.skip_threshold,
            no_show_grace_seconds: self.no_show_grace_seconds,
            no_show_sweep_interval_seconds: 1,
            sequential_services: self.sequential_services,
            ..AppConfig::default()
        }
    }
}

/// One specialty, one room, one booth offering a technician service (ECG) and
/// a doctor service (consultation), staffed by one technician and one doctor.
pub struct ClinicFixture {
    pub catalog: Arc<InMemoryCatalog>,
    pub staffing: Arc<InMemoryStaffing>,
    pub specialty_id: Uuid,
    pub room_id: Uuid,
    pub booth_id: Uuid,
    pub ecg_service_id: Uuid,
    pub consult_service_id: Uuid,
    pub technician_id: Uuid,
    pub doctor_id: Uuid,
}

impl ClinicFixture {
    pub async fn new() -> Self {
        let catalog = Arc::new(InMemoryCatalog::new());
        let staffing = Arc::new(InMemoryStaffing::new());

        let specialty_id = Uuid::new_v4();
        let room_id = Uuid::new_v4();
        let booth_id = Uuid::new_v4();
        let ecg_service_id = Uuid::new_v4();
        let consult_service_id = Uuid::new_v4();
        let technician_id = Uuid::new_v4();
        let doctor_id = Uuid::new_v4();

        catalog
            .add_specialty(Specialty {
                id: specialty_id,
                name: "Cardiology".to_string(),
            })
            .await;
        catalog
            .add_room(ClinicRoom {
                id: room_id,
                code: "R-101".to_string(),
                name: "Cardiology room".to_string(),
                specialty_id,
            })
            .await;
        catalog
            .add_service(Service {
                id: ecg_service_id,
                code: "ECG".to_string(),
                name: "Electrocardiogram".to_string(),
                specialty_id,
                duration_minutes: 15,
                requires_doctor: false,
                requires_technician: true,
            })
            .await;
        catalog
            .add_service(Service {
                id: consult_service_id,
                code: "CONSULT".to_string(),
                name: "Cardiology consultation".to_string(),
                specialty_id,
                duration_minutes: 20,
                requires_doctor: true,
                requires_technician: false,
            })
            .await;
        catalog
            .add_booth(
                Booth {
                    id: booth_id,
                    code: "B-1".to_string(),
                    name: "Booth 1".to_string(),
                    room_id,
                    is_active: true,
                },
                &[ecg_service_id, consult_service_id],
            )
            .await;

        staffing
            .register(StaffMember::Technician {
                id: technician_id,
                auth_id: Uuid::new_v4(),
                name: "Tech Hoa".to_string(),
                specialty_id: Some(specialty_id),
            })
            .await;
        staffing
            .register(StaffMember::Doctor {
                id: doctor_id,
                auth_id: Uuid::new_v4(),
                name: "Dr. Khanh".to_string(),
                specialty_id,
                years_experience: Some(12),
            })
            .await;

        Self {
            catalog,
            staffing,
            specialty_id,
            room_id,
            booth_id,
            ecg_service_id,
            consult_service_id,
            technician_id,
            doctor_id,
        }
    }

    /// Adds another active booth in the same room offering `service_ids`.
    pub async fn add_booth(&self, code: &str, service_ids: &[Uuid]) -> Uuid {
        let booth_id = Uuid::new_v4();
        self.catalog
            .add_booth(
                Booth {
                    id: booth_id,
                    code: code.to_string(),
                    name: format!("Booth {}", code),
                    room_id: self.room_id,
                    is_active: true,
                },
                service_ids,
            )
            .await;
        booth_id
    }

    pub async fn add_technician(&self, name: &str) -> Uuid {
        let technician_id = Uuid::new_v4();
        self.staffing
            .register(StaffMember::Technician {
                id: technician_id,
                auth_id: Uuid::new_v4(),
                name: name.to_string(),
                specialty_id: Some(self.specialty_id),
            })
            .await;
        technician_id
    }
}
