use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_models::FlowError;

use crate::models::{
    Booth, BoothProfile, BoothService, ClinicRoom, ClinicSeed, Service, ServiceProfile, Specialty,
};

/// Read-only lookups of services, specialties and booths.
#[async_trait]
pub trait CatalogAdapter: Send + Sync {
    async fn get_service(&self, service_id: Uuid) -> Result<ServiceProfile, FlowError>;

    async fn get_specialty(&self, specialty_id: Uuid) -> Result<Specialty, FlowError>;

    async fn get_booth(&self, booth_id: Uuid) -> Result<BoothProfile, FlowError>;
}

#[derive(Default)]
struct CatalogTables {
    specialties: HashMap<Uuid, Specialty>,
    rooms: HashMap<Uuid, ClinicRoom>,
    services: HashMap<Uuid, Service>,
    booths: HashMap<Uuid, Booth>,
    links: Vec<BoothService>,
}

/// Catalog held in memory, populated from a [`ClinicSeed`] or by the `add_*` methods.
pub struct InMemoryCatalog {
    tables: RwLock<CatalogTables>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(CatalogTables::default()),
        }
    }

    pub fn from_seed(seed: &ClinicSeed) -> Self {
        let tables = CatalogTables {
            specialties: seed.specialties.iter().map(|s| (s.id, s.clone())).collect(),
            rooms: seed.rooms.iter().map(|r| (r.id, r.clone())).collect(),
            services: seed.services.iter().map(|s| (s.id, s.clone())).collect(),
            booths: seed.booths.iter().map(|b| (b.id, b.clone())).collect(),
            links: seed.booth_services.clone(),
        };
        debug!(
            "Catalog seeded with {} services and {} booths",
            tables.services.len(),
            tables.booths.len()
        );
        Self {
            tables: RwLock::new(tables),
        }
    }

    pub async fn add_specialty(&self, specialty: Specialty) {
        self.tables.write().await.specialties.insert(specialty.id, specialty);
    }

    pub async fn add_room(&self, room: ClinicRoom) {
        self.tables.write().await.rooms.insert(room.id, room);
    }

    pub async fn add_service(&self, service: Service) {
        self.tables.write().await.services.insert(service.id, service);
    }

    pub async fn add_booth(&self, booth: Booth, service_ids: &[Uuid]) {
        let mut tables = self.tables.write().await;
        for service_id in service_ids {
            let link = BoothService {
                booth_id: booth.id,
                service_id: *service_id,
            };
            if !tables.links.contains(&link) {
                tables.links.push(link);
            }
        }
        tables.booths.insert(booth.id, booth);
    }

    pub async fn set_booth_active(&self, booth_id: Uuid, is_active: bool) -> Result<(), FlowError> {
        let mut tables = self.tables.write().await;
        let booth = tables
            .booths
            .get_mut(&booth_id)
            .ok_or_else(|| FlowError::not_found("booth", booth_id))?;
        booth.is_active = is_active;
        Ok(())
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogAdapter for InMemoryCatalog {
    async fn get_service(&self, service_id: Uuid) -> Result<ServiceProfile, FlowError> {
        let tables = self.tables.read().await;
        let service = tables
            .services
            .get(&service_id)
            .ok_or_else(|| FlowError::not_found("service", service_id))?;

        let compatible_booth_ids = tables
            .links
            .iter()
            .filter(|link| link.service_id == service_id)
            .filter(|link| tables.booths.get(&link.booth_id).is_some_and(|b| b.is_active))
            .map(|link| link.booth_id)
            .collect();

        Ok(ServiceProfile {
            id: service.id,
            name: service.name.clone(),
            specialty_id: service.specialty_id,
            duration_minutes: service.duration_minutes,
            requires_doctor: service.requires_doctor,
            requires_technician: service.requires_technician,
            compatible_booth_ids,
        })
    }

    async fn get_specialty(&self, specialty_id: Uuid) -> Result<Specialty, FlowError> {
        let tables = self.tables.read().await;
        tables
            .specialties
            .get(&specialty_id)
            .cloned()
            .ok_or_else(|| FlowError::not_found("specialty", specialty_id))
    }

    async fn get_booth(&self, booth_id: Uuid) -> Result<BoothProfile, FlowError> {
        let tables = self.tables.read().await;
        let booth = tables
            .booths
            .get(&booth_id)
            .ok_or_else(|| FlowError::not_found("booth", booth_id))?;
        let room = tables
            .rooms
            .get(&booth.room_id)
            .ok_or_else(|| FlowError::not_found("clinic room", booth.room_id))?;

        Ok(BoothProfile {
            booth: booth.clone(),
            specialty_id: room.specialty_id,
            compatible_service_ids: tables
                .links
                .iter()
                .filter(|link| link.booth_id == booth_id)
                .map(|link| link.service_id)
                .collect(),
        })
    }
}
