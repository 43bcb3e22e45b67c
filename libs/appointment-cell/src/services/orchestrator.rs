// libs/appointment-cell/src/services/orchestrator.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use clinic_cell::{CatalogAdapter, ServiceProfile, StaffingAdapter};
use service_queue_cell::{
    NewPrescription, PriorityCalculator, QueueCallDispatcher, QueueEvent, QueueEventBus,
    QueueEventReceiver, ServiceQueueEngine, ServiceRequest, ServiceStatus,
};
use shared_models::FlowError;

use crate::models::{Appointment, AppointmentStatus, AppointmentView, CreateAppointmentRequest};
use crate::services::lifecycle::AppointmentLifecycleService;

/// Entry point for booking. Turns an appointment into a prescription with one
/// queue task per requested service, and cascades cancellation to those tasks.
pub struct AppointmentOrchestrator {
    catalog: Arc<dyn CatalogAdapter>,
    staffing: Arc<dyn StaffingAdapter>,
    engine: Arc<ServiceQueueEngine>,
    dispatcher: Arc<QueueCallDispatcher>,
    events: Arc<QueueEventBus>,
    lifecycle: AppointmentLifecycleService,
    appointments: RwLock<HashMap<Uuid, Appointment>>,
}

impl AppointmentOrchestrator {
    pub fn new(
        catalog: Arc<dyn CatalogAdapter>,
        staffing: Arc<dyn StaffingAdapter>,
        engine: Arc<ServiceQueueEngine>,
        dispatcher: Arc<QueueCallDispatcher>,
        events: Arc<QueueEventBus>,
    ) -> Self {
        Self {
            catalog,
            staffing,
            engine,
            dispatcher,
            events,
            lifecycle: AppointmentLifecycleService::new(),
            appointments: RwLock::new(HashMap::new()),
        }
    }

    /// Validates the request, creates the prescription and enqueues one task
    /// per service (orders 1..n). Tasks start NOT_STARTED until check-in.
    #[instrument(skip(self, request), fields(patient = %request.patient_profile_id))]
    pub async fn create_appointment(
        &self,
        request: CreateAppointmentRequest,
    ) -> Result<AppointmentView, FlowError> {
        let profiles = self.validate_request(&request).await?;

        let appointment_id = Uuid::new_v4();
        let priority = PriorityCalculator::band_for(request.priority_profile.as_ref());

        let prescription = self
            .engine
            .create_prescription(NewPrescription {
                patient_profile_id: request.patient_profile_id,
                appointment_id: Some(appointment_id),
                doctor_id: request.doctor_id,
                priority,
            })
            .await?;

        let requests = profiles
            .iter()
            .enumerate()
            .map(|(index, profile)| {
                ServiceRequest::from_profile(profile, index as u32 + 1, request.doctor_id)
            })
            .collect();
        let tasks = self.engine.enqueue(prescription.id, requests).await?;

        let now = Utc::now();
        let appointment = Appointment {
            id: appointment_id,
            patient_profile_id: request.patient_profile_id,
            specialty_id: request.specialty_id,
            doctor_id: request.doctor_id,
            service_ids: request.service_ids,
            scheduled_date: request.scheduled_date,
            prescription_id: prescription.id,
            prescription_code: prescription.code.clone(),
            task_ids: tasks.iter().map(|t| t.id).collect(),
            priority,
            attributes: request.attributes,
            cancelled_at: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        };

        self.appointments
            .write()
            .await
            .insert(appointment_id, appointment.clone());

        info!(
            "Appointment {} created with prescription {} ({} task(s), {:?} priority)",
            appointment_id,
            prescription.code,
            tasks.len(),
            priority
        );

        let status = self.lifecycle.derive_status(&appointment, &tasks);
        Ok(AppointmentView {
            appointment,
            status,
            tasks,
        })
    }

    /// Patient arrived and registration is settled: admit every task and
    /// release what the sequencing policy allows into the queue.
    #[instrument(skip(self))]
    pub async fn check_in(&self, appointment_id: Uuid) -> Result<AppointmentView, FlowError> {
        let mut appointments = self.appointments.write().await;
        let appointment = appointments
            .get_mut(&appointment_id)
            .ok_or_else(|| FlowError::not_found("appointment", appointment_id))?;

        let tasks = self.engine.list_tasks(appointment.prescription_id).await?;
        self.lifecycle
            .validate_check_in(self.lifecycle.derive_status(appointment, &tasks))?;

        for task in tasks.iter().filter(|t| t.status == ServiceStatus::NotStarted) {
            self.engine.admit(task.id).await?;
        }
        let released = self.engine.advance(appointment.prescription_id).await?;
        appointment.updated_at = Utc::now();

        info!(
            "Appointment {} checked in, {} task(s) released to the queue",
            appointment_id,
            released.len()
        );

        let appointment = appointment.clone();
        drop(appointments);
        self.view(appointment).await
    }

    pub async fn get_appointment(&self, appointment_id: Uuid) -> Result<AppointmentView, FlowError> {
        let appointment = self
            .appointments
            .read()
            .await
            .get(&appointment_id)
            .cloned()
            .ok_or_else(|| FlowError::not_found("appointment", appointment_id))?;

        self.view(appointment).await
    }

    pub async fn list_patient_appointments(
        &self,
        patient_profile_id: Uuid,
    ) -> Result<Vec<AppointmentView>, FlowError> {
        let mut appointments: Vec<Appointment> = self
            .appointments
            .read()
            .await
            .values()
            .filter(|a| a.patient_profile_id == patient_profile_id)
            .cloned()
            .collect();
        appointments.sort_by_key(|a| (a.scheduled_date, a.created_at));

        let mut views = Vec::with_capacity(appointments.len());
        for appointment in appointments {
            views.push(self.view(appointment).await?);
        }
        Ok(views)
    }

    /// Opens the event channel for a live appointment. The channel is released
    /// once the appointment reads COMPLETED or CANCELLED.
    pub async fn subscribe(&self, appointment_id: Uuid) -> Result<QueueEventReceiver, FlowError> {
        let view = self.get_appointment(appointment_id).await?;
        if view.status.is_terminal() {
            return Err(FlowError::state(view.status, view.status));
        }
        Ok(self.events.create_channel(appointment_id).await)
    }

    /// Marks the appointment cancelled and cascades to every task that can
    /// still be cancelled. Seats held by those tasks are released.
    #[instrument(skip(self))]
    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        reason: &str,
    ) -> Result<AppointmentView, FlowError> {
        let prescription_id = {
            let mut appointments = self.appointments.write().await;
            let appointment = appointments
                .get_mut(&appointment_id)
                .ok_or_else(|| FlowError::not_found("appointment", appointment_id))?;

            if appointment.cancelled_at.is_some() {
                warn!("Appointment {} is already cancelled", appointment_id);
                return Err(FlowError::state(
                    AppointmentStatus::Cancelled,
                    AppointmentStatus::Cancelled,
                ));
            }
            let tasks = self.engine.list_tasks(appointment.prescription_id).await?;
            self.lifecycle
                .validate_cancellation(self.lifecycle.derive_status(appointment, &tasks))?;

            let now = Utc::now();
            appointment.cancelled_at = Some(now);
            appointment.cancellation_reason = Some(reason.to_string());
            appointment.updated_at = now;
            appointment.prescription_id
        };

        let cancelled = self
            .dispatcher
            .cancel_prescription(prescription_id, reason)
            .await?;

        self.events
            .publish(QueueEvent::AppointmentCancelled {
                appointment_id,
                reason: reason.to_string(),
            })
            .await;

        info!(
            "Appointment {} cancelled, {} task(s) cancelled: {}",
            appointment_id,
            cancelled.len(),
            reason
        );

        self.get_appointment(appointment_id).await
    }

    async fn view(&self, appointment: Appointment) -> Result<AppointmentView, FlowError> {
        let tasks = self.engine.list_tasks(appointment.prescription_id).await?;
        let status = self.lifecycle.derive_status(&appointment, &tasks);
        if status.is_terminal() {
            self.events.remove_channel(appointment.id).await;
        }
        Ok(AppointmentView {
            appointment,
            status,
            tasks,
        })
    }

    /// Resolves every requested service in the catalog. Unknown references are
    /// input errors here, not missing resources.
    async fn validate_request(
        &self,
        request: &CreateAppointmentRequest,
    ) -> Result<Vec<ServiceProfile>, FlowError> {
        if request.service_ids.is_empty() {
            return Err(FlowError::ValidationError(
                "An appointment needs at least one service".to_string(),
            ));
        }

        self.catalog
            .get_specialty(request.specialty_id)
            .await
            .map_err(|e| as_validation(e, "specialty"))?;

        let mut profiles = Vec::with_capacity(request.service_ids.len());
        for service_id in &request.service_ids {
            let profile = self
                .catalog
                .get_service(*service_id)
                .await
                .map_err(|e| as_validation(e, "service"))?;

            if profile.specialty_id != request.specialty_id {
                warn!(
                    "Service {} belongs to specialty {}, not {}",
                    service_id, profile.specialty_id, request.specialty_id
                );
                return Err(FlowError::ValidationError(format!(
                    "Service {} is not offered by specialty {}",
                    service_id, request.specialty_id
                )));
            }
            profiles.push(profile);
        }

        if let Some(doctor_id) = request.doctor_id {
            let doctor = self
                .staffing
                .get_doctor_availability(doctor_id)
                .await
                .map_err(|e| as_validation(e, "doctor"))?;

            if doctor.specialty_id.is_some_and(|s| s != request.specialty_id) {
                return Err(FlowError::ValidationError(format!(
                    "Doctor {} does not practice specialty {}",
                    doctor_id, request.specialty_id
                )));
            }
        }

        debug!("Appointment request resolved to {} service(s)", profiles.len());
        Ok(profiles)
    }
}

fn as_validation(err: FlowError, entity: &str) -> FlowError {
    match err {
        FlowError::NotFoundError { id, .. } => {
            FlowError::ValidationError(format!("Unknown {} id: {}", entity, id))
        }
        other => other,
    }
}
