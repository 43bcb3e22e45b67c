use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use clinic_cell::CatalogAdapter;
use shared_models::FlowError;
use work_session_cell::{Reservation, ReservationRequest, WorkSessionScheduler};

use crate::models::{
    Assignment, CallOutcome, PrescriptionService, QueueEvent, QueueFilter, QueuePolicy,
    QueueSnapshot, ServiceStatus, TaskTransition,
};
use crate::services::{engine::ServiceQueueEngine, events::QueueEventBus};

impl From<&Reservation> for Assignment {
    fn from(reservation: &Reservation) -> Self {
        Self {
            booth_id: reservation.booth_id,
            work_session_id: reservation.session_id,
            doctor_id: reservation.doctor_id,
            technician_id: reservation.technician_id,
        }
    }
}

/// Ties queue decisions to booth capacity. Calls for one booth run one at a
/// time; a call claims a task only after its booth seat is reserved, and gives
/// the seat back if the claim loses.
pub struct QueueCallDispatcher {
    engine: Arc<ServiceQueueEngine>,
    scheduler: Arc<WorkSessionScheduler>,
    catalog: Arc<dyn CatalogAdapter>,
    events: Arc<QueueEventBus>,
    policy: QueuePolicy,
    booth_locks: RwLock<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl QueueCallDispatcher {
    pub fn new(
        engine: Arc<ServiceQueueEngine>,
        scheduler: Arc<WorkSessionScheduler>,
        catalog: Arc<dyn CatalogAdapter>,
        events: Arc<QueueEventBus>,
    ) -> Self {
        let policy = engine.policy().clone();
        Self {
            engine,
            scheduler,
            catalog,
            events,
            policy,
            booth_locks: RwLock::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &QueuePolicy {
        &self.policy
    }

    /// Claims the best eligible task for the booth, or reports an empty queue.
    #[instrument(skip(self))]
    pub async fn call_next(&self, booth_id: Uuid) -> Result<CallOutcome, FlowError> {
        let booth = self.catalog.get_booth(booth_id).await?;
        if !booth.booth.is_active {
            return Err(FlowError::CapacityError(format!(
                "Booth {} is inactive",
                booth.booth.code
            )));
        }

        let lock = self.booth_lock(booth_id).await;
        let _guard = lock.lock().await;

        let filter = QueueFilter {
            specialty_id: Some(booth.specialty_id),
            service_ids: Some(booth.compatible_service_ids.clone()),
            booth_id: Some(booth_id),
        };

        // A capacity failure moves on to the next candidate. Only lost claims
        // count against `max_claim_attempts`.
        let mut tried: Vec<Uuid> = Vec::new();
        let mut capacity_failure: Option<String> = None;
        let mut lost_claims = 0;

        while lost_claims < self.policy.max_claim_attempts {
            let candidate = self
                .engine
                .peek(&filter, tried.len() + 1)
                .await
                .into_iter()
                .find(|task| !tried.contains(&task.id));

            let Some(task) = candidate else {
                return match capacity_failure {
                    Some(reason) => Err(FlowError::CapacityError(reason)),
                    None => {
                        debug!("Queue empty for booth {}", booth.booth.code);
                        Ok(CallOutcome::QueueEmpty)
                    }
                };
            };
            tried.push(task.id);

            let reservation = match self
                .scheduler
                .reserve(reservation_request(&task, vec![booth_id]))
                .await
            {
                Ok(reservation) => reservation,
                Err(FlowError::CapacityError(reason)) => {
                    debug!("Task {} cannot be staffed at booth {}: {}", task.id, booth_id, reason);
                    capacity_failure = Some(reason);
                    continue;
                }
                Err(e) => return Err(e),
            };

            match self
                .engine
                .claim(task.id, task.status, Assignment::from(&reservation))
                .await
            {
                Ok(claimed) => {
                    info!(
                        "Task {} called to booth {} (candidate {}, call #{})",
                        claimed.id, booth.booth.code, tried.len(), claimed.call_count
                    );
                    self.events
                        .publish(QueueEvent::TaskCalled {
                            task_id: claimed.id,
                            appointment_id: claimed.appointment_id,
                            booth_id,
                            call_count: claimed.call_count,
                        })
                        .await;
                    return Ok(CallOutcome::Called {
                        task: claimed,
                        assignment: Assignment::from(&reservation),
                    });
                }
                Err(e) => {
                    // Lost the task (claimed elsewhere or cancelled); hand the seat back.
                    self.scheduler
                        .release(reservation.session_id, task.id)
                        .await?;
                    if e.is_retryable() {
                        debug!("Claim on task {} lost: {}", task.id, e);
                        lost_claims += 1;
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        warn!(
            "Gave up calling for booth {} after {} lost claim(s)",
            booth.booth.code, lost_claims
        );
        Err(FlowError::CapacityError(format!(
            "No task could be claimed for booth {} after {} lost claim(s)",
            booth.booth.code, lost_claims
        )))
    }

    /// Puts a delayed task back on a booth, reserving its seat first.
    #[instrument(skip(self))]
    pub async fn recall(&self, task_id: Uuid, booth_id: Uuid) -> Result<PrescriptionService, FlowError> {
        let task = self.engine.get_task(task_id).await?;
        if task.status != ServiceStatus::Delayed {
            return Err(FlowError::state(task.status, ServiceStatus::Preparing));
        }
        let booth = self.catalog.get_booth(booth_id).await?;
        if !booth.compatible_service_ids.contains(&task.service_id) {
            return Err(FlowError::ValidationError(format!(
                "Booth {} does not offer service {}",
                booth.booth.code, task.service_id
            )));
        }

        let lock = self.booth_lock(booth_id).await;
        let _guard = lock.lock().await;

        let reservation = self
            .scheduler
            .reserve(reservation_request(&task, vec![booth_id]))
            .await?;
        match self.engine.recall(task_id, Assignment::from(&reservation)).await {
            Ok(recalled) => {
                info!("Delayed task {} recalled to booth {}", task_id, booth.booth.code);
                self.events
                    .publish(QueueEvent::TaskCalled {
                        task_id,
                        appointment_id: recalled.appointment_id,
                        booth_id,
                        call_count: recalled.call_count,
                    })
                    .await;
                Ok(recalled)
            }
            Err(e) => {
                self.scheduler.release(reservation.session_id, task_id).await?;
                Err(e)
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn start(&self, task_id: Uuid) -> Result<PrescriptionService, FlowError> {
        let task = self.engine.get_task(task_id).await?;
        if task.status == ServiceStatus::Preparing {
            if let Some(session_id) = task.work_session_id {
                self.scheduler.ensure_held(session_id, task_id).await?;
            }
        }
        let started = self.engine.start(task_id).await?;
        info!("Task {} started", task_id);
        Ok(started)
    }

    #[instrument(skip(self))]
    pub async fn skip(&self, task_id: Uuid) -> Result<PrescriptionService, FlowError> {
        let transition = self.engine.skip(task_id).await?;
        Ok(self.after_skip(transition).await)
    }

    #[instrument(skip(self, results))]
    pub async fn complete(
        &self,
        task_id: Uuid,
        results: Option<String>,
    ) -> Result<PrescriptionService, FlowError> {
        let transition = self.engine.complete(task_id, results).await?;
        self.release_seat(&transition).await;
        let task = transition.task;

        info!("Task {} completed", task_id);
        self.events
            .publish(QueueEvent::ServiceCompleted {
                task_id,
                appointment_id: task.appointment_id,
                service_id: task.service_id,
                results: task.results.clone(),
            })
            .await;
        if let (Some(appointment_id), Some(doctor_id)) = (task.appointment_id, task.doctor_id) {
            self.events
                .publish(QueueEvent::MedicalRecordNeeded {
                    appointment_id,
                    doctor_id,
                })
                .await;
        }

        self.engine.advance(task.prescription_id).await?;
        Ok(task)
    }

    #[instrument(skip(self))]
    pub async fn await_result(&self, task_id: Uuid) -> Result<PrescriptionService, FlowError> {
        let transition = self.engine.await_result(task_id).await?;
        self.release_seat(&transition).await;
        Ok(transition.task)
    }

    pub async fn mark_returning(&self, task_id: Uuid) -> Result<PrescriptionService, FlowError> {
        self.engine.mark_returning(task_id).await
    }

    #[instrument(skip(self))]
    pub async fn delay(&self, task_id: Uuid) -> Result<PrescriptionService, FlowError> {
        let transition = self.engine.delay(task_id).await?;
        self.release_seat(&transition).await;
        info!("Task {} delayed", task_id);
        Ok(transition.task)
    }

    /// Cancels immediately; any booth seat the task held is released afterwards.
    #[instrument(skip(self))]
    pub async fn cancel(&self, task_id: Uuid, reason: &str) -> Result<PrescriptionService, FlowError> {
        let transition = self.engine.cancel(task_id, reason).await?;
        self.after_cancel(&transition, reason).await;
        self.engine.advance(transition.task.prescription_id).await?;
        Ok(transition.task)
    }

    #[instrument(skip(self))]
    pub async fn cancel_prescription(
        &self,
        prescription_id: Uuid,
        reason: &str,
    ) -> Result<Vec<PrescriptionService>, FlowError> {
        let transitions = self.engine.cancel_prescription(prescription_id, reason).await?;
        let mut cancelled = Vec::with_capacity(transitions.len());
        for transition in transitions {
            self.after_cancel(&transition, reason).await;
            cancelled.push(transition.task);
        }
        Ok(cancelled)
    }

    /// Skips every task left in PREPARING past the grace period. Failures are logged, never raised.
    pub async fn sweep_no_shows(&self) -> Vec<Uuid> {
        let grace = Duration::seconds(self.policy.no_show_grace_seconds as i64);
        let mut skipped = Vec::new();

        for task_id in self.engine.overdue_preparing(grace).await {
            match self.engine.expire_no_show(task_id, grace).await {
                Ok(Some(transition)) => {
                    self.after_skip(transition).await;
                    skipped.push(task_id);
                }
                Ok(None) => debug!("Task {} moved on before its no-show sweep", task_id),
                Err(e) => warn!("No-show skip of task {} failed: {}", task_id, e),
            }
        }

        if !skipped.is_empty() {
            info!("Skipped {} no-show task(s)", skipped.len());
        }
        skipped
    }

    pub async fn snapshot_for_booth(&self, booth_id: Uuid) -> Result<QueueSnapshot, FlowError> {
        let booth = self.catalog.get_booth(booth_id).await?;
        let filter = QueueFilter {
            specialty_id: Some(booth.specialty_id),
            service_ids: Some(booth.compatible_service_ids),
            booth_id: Some(booth_id),
        };
        Ok(self.engine.snapshot(&filter).await)
    }

    pub async fn snapshot_for_specialty(&self, specialty_id: Uuid) -> QueueSnapshot {
        self.engine
            .snapshot(&QueueFilter::for_specialty(specialty_id))
            .await
    }

    // Private helper methods

    async fn after_skip(&self, transition: TaskTransition) -> PrescriptionService {
        self.release_seat(&transition).await;
        let task = transition.task;

        if task.status == ServiceStatus::Delayed {
            warn!(
                "Task {} delayed after {} skip(s); waiting for an operator",
                task.id, task.skip_count
            );
        }
        self.events
            .publish(QueueEvent::TaskSkipped {
                task_id: task.id,
                appointment_id: task.appointment_id,
                skip_count: task.skip_count,
                status: task.status,
            })
            .await;
        task
    }

    async fn after_cancel(&self, transition: &TaskTransition, reason: &str) {
        self.release_seat(transition).await;
        self.events
            .publish(QueueEvent::TaskCancelled {
                task_id: transition.task.id,
                appointment_id: transition.task.appointment_id,
                reason: reason.to_string(),
            })
            .await;
    }

    async fn release_seat(&self, transition: &TaskTransition) {
        if let Some(session_id) = transition.released_session {
            if let Err(e) = self.scheduler.release(session_id, transition.task.id).await {
                warn!(
                    "Failed to release session {} for task {}: {}",
                    session_id, transition.task.id, e
                );
            }
        }
    }

    async fn booth_lock(&self, booth_id: Uuid) -> Arc<Mutex<()>> {
        if let Some(lock) = self.booth_locks.read().await.get(&booth_id) {
            return Arc::clone(lock);
        }
        let mut locks = self.booth_locks.write().await;
        Arc::clone(locks.entry(booth_id).or_default())
    }
}

fn reservation_request(task: &PrescriptionService, booth_ids: Vec<Uuid>) -> ReservationRequest {
    ReservationRequest {
        task_id: task.id,
        booth_ids,
        specialty_id: task.specialty_id,
        requires_doctor: task.requires_doctor,
        requires_technician: task.requires_technician,
        preferred_doctor_id: task.preferred_doctor_id,
        duration_minutes: task.duration_minutes,
    }
}
