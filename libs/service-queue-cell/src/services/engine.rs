use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_models::FlowError;

use crate::models::{
    Assignment, NewPrescription, Prescription, PrescriptionService, QueueEntry, QueueFilter,
    QueuePolicy, QueueSnapshot, ServiceRequest, ServiceStatus, TaskTransition,
};

type TaskCell = Arc<Mutex<PrescriptionService>>;

/// Owns prescriptions and their tasks. Every task sits behind its own lock, so
/// a transition is a compare-and-set on that task alone; queue partitions are
/// keyed by specialty.
pub struct ServiceQueueEngine {
    policy: QueuePolicy,
    tasks: RwLock<HashMap<Uuid, TaskCell>>,
    prescriptions: RwLock<HashMap<Uuid, Prescription>>,
    codes: RwLock<HashMap<String, Uuid>>,
    partitions: RwLock<HashMap<Uuid, Vec<Uuid>>>,
    advance_lock: Mutex<()>,
    sequence: AtomicU64,
}

impl ServiceQueueEngine {
    pub fn new(policy: QueuePolicy) -> Self {
        Self {
            policy,
            tasks: RwLock::new(HashMap::new()),
            prescriptions: RwLock::new(HashMap::new()),
            codes: RwLock::new(HashMap::new()),
            partitions: RwLock::new(HashMap::new()),
            advance_lock: Mutex::new(()),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> &QueuePolicy {
        &self.policy
    }

    pub async fn create_prescription(&self, new: NewPrescription) -> Result<Prescription, FlowError> {
        let mut codes = self.codes.write().await;
        let code = loop {
            let candidate = prescription_code();
            if !codes.contains_key(&candidate) {
                break candidate;
            }
        };

        let prescription = Prescription {
            id: Uuid::new_v4(),
            code: code.clone(),
            patient_profile_id: new.patient_profile_id,
            appointment_id: new.appointment_id,
            doctor_id: new.doctor_id,
            priority: new.priority,
            task_ids: Vec::new(),
            cancelled_at: None,
            cancellation_reason: None,
            created_at: Utc::now(),
        };
        codes.insert(code, prescription.id);
        drop(codes);

        self.prescriptions
            .write()
            .await
            .insert(prescription.id, prescription.clone());

        info!(
            "Prescription {} ({}) created for patient profile {}",
            prescription.code, prescription.id, prescription.patient_profile_id
        );
        Ok(prescription)
    }

    /// Adds tasks to a prescription in ascending `order`. Orders must be unique within the prescription.
    pub async fn enqueue(
        &self,
        prescription_id: Uuid,
        mut requests: Vec<ServiceRequest>,
    ) -> Result<Vec<PrescriptionService>, FlowError> {
        if requests.is_empty() {
            return Err(FlowError::ValidationError(
                "At least one service is required".to_string(),
            ));
        }

        let mut prescriptions = self.prescriptions.write().await;
        let prescription = prescriptions
            .get_mut(&prescription_id)
            .ok_or_else(|| FlowError::not_found("prescription", prescription_id))?;
        if prescription.cancelled_at.is_some() {
            return Err(FlowError::ValidationError(format!(
                "Prescription {} is cancelled",
                prescription.code
            )));
        }

        let mut tasks = self.tasks.write().await;
        let mut ordered: Vec<(u32, Uuid)> = Vec::with_capacity(prescription.task_ids.len() + requests.len());
        for task_id in &prescription.task_ids {
            if let Some(cell) = tasks.get(task_id) {
                ordered.push((cell.lock().await.order, *task_id));
            }
        }
        let mut used: Vec<u32> = ordered.iter().map(|(order, _)| *order).collect();
        for request in &requests {
            if used.contains(&request.order) {
                return Err(FlowError::ValidationError(format!(
                    "Order {} is used twice in prescription {}",
                    request.order, prescription.code
                )));
            }
            used.push(request.order);
        }

        requests.sort_by_key(|r| r.order);
        let now = Utc::now();
        let mut partitions = self.partitions.write().await;
        let mut created = Vec::with_capacity(requests.len());

        for request in requests {
            let task = PrescriptionService {
                id: Uuid::new_v4(),
                prescription_id,
                appointment_id: prescription.appointment_id,
                service_id: request.service_id,
                specialty_id: request.specialty_id,
                order: request.order,
                status: ServiceStatus::NotStarted,
                priority: prescription.priority,
                duration_minutes: request.duration_minutes,
                requires_doctor: request.requires_doctor,
                requires_technician: request.requires_technician,
                preferred_doctor_id: request.preferred_doctor_id,
                doctor_id: None,
                technician_id: None,
                booth_id: None,
                work_session_id: None,
                call_count: 0,
                skip_count: 0,
                results: None,
                cancellation_reason: None,
                queued_at: None,
                called_at: None,
                started_at: None,
                completed_at: None,
                sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
                created_at: now,
                updated_at: now,
            };

            partitions.entry(task.specialty_id).or_default().push(task.id);
            tasks.insert(task.id, Arc::new(Mutex::new(task.clone())));
            ordered.push((task.order, task.id));
            created.push(task);
        }

        ordered.sort_by_key(|(order, _)| *order);
        prescription.task_ids = ordered.into_iter().map(|(_, id)| id).collect();

        info!(
            "Enqueued {} task(s) on prescription {}",
            created.len(),
            prescription.code
        );
        Ok(created)
    }

    /// NOT_STARTED -> PENDING once the patient is registered for the service.
    pub async fn admit(&self, task_id: Uuid) -> Result<PrescriptionService, FlowError> {
        self.update(task_id, |task, _| {
            ensure_edge(task, ServiceStatus::Pending)?;
            Ok(ServiceStatus::Pending)
        })
        .await
        .map(|t| t.task)
    }

    /// PENDING -> WAITING; the task joins the back of its band.
    pub async fn release_to_queue(&self, task_id: Uuid) -> Result<PrescriptionService, FlowError> {
        self.update(task_id, |task, now| {
            ensure_edge(task, ServiceStatus::Waiting)?;
            task.queued_at = Some(now);
            Ok(ServiceStatus::Waiting)
        })
        .await
        .map(|t| t.task)
    }

    /// Calls a waiting or skipped task without reserving a booth.
    pub async fn call(&self, task_id: Uuid) -> Result<PrescriptionService, FlowError> {
        self.enter_preparing(task_id, None, &[ServiceStatus::Waiting, ServiceStatus::Skipped], None)
            .await
    }

    /// Calls the task only if it is still in `expected`; a mismatch is a `ConflictError`.
    pub async fn claim(
        &self,
        task_id: Uuid,
        expected: ServiceStatus,
        assignment: Assignment,
    ) -> Result<PrescriptionService, FlowError> {
        self.enter_preparing(
            task_id,
            Some(expected),
            &[ServiceStatus::Waiting, ServiceStatus::Skipped],
            Some(assignment),
        )
        .await
    }

    /// Operator requeue of a delayed task straight onto a booth.
    pub async fn recall(
        &self,
        task_id: Uuid,
        assignment: Assignment,
    ) -> Result<PrescriptionService, FlowError> {
        self.enter_preparing(
            task_id,
            Some(ServiceStatus::Delayed),
            &[ServiceStatus::Delayed],
            Some(assignment),
        )
        .await
    }

    pub async fn skip(&self, task_id: Uuid) -> Result<TaskTransition, FlowError> {
        let threshold = self.policy.skip_threshold;
        self.update(task_id, move |task, now| apply_skip(task, threshold, now))
            .await
    }

    /// Skips the task only if it is still waiting for the patient after `grace`.
    pub async fn expire_no_show(
        &self,
        task_id: Uuid,
        grace: Duration,
    ) -> Result<Option<TaskTransition>, FlowError> {
        let cell = self.cell(task_id).await?;
        let mut task = cell.lock().await;
        let now = Utc::now();

        let overdue = task.status == ServiceStatus::Preparing
            && task.called_at.map_or(false, |called| called + grace <= now);
        if !overdue {
            return Ok(None);
        }

        let previous = task.status;
        let released_session = task.work_session_id;
        let target = apply_skip(&mut *task, self.policy.skip_threshold, now)?;
        task.status = target;
        task.updated_at = now;
        info!("Task {} did not show up, now {:?}", task_id, target);

        Ok(Some(TaskTransition {
            task: task.clone(),
            previous,
            released_session,
        }))
    }

    pub async fn start(&self, task_id: Uuid) -> Result<PrescriptionService, FlowError> {
        self.update(task_id, |task, now| {
            ensure_edge(task, ServiceStatus::Serving)?;
            if task.work_session_id.is_none() {
                return Err(FlowError::CapacityError(format!(
                    "Task {} has no booth allocated",
                    task.id
                )));
            }
            task.started_at.get_or_insert(now);
            Ok(ServiceStatus::Serving)
        })
        .await
        .map(|t| t.task)
    }

    /// SERVING -> WAITING_RESULT. The booth is handed back while results are pending.
    pub async fn await_result(&self, task_id: Uuid) -> Result<TaskTransition, FlowError> {
        self.update(task_id, |task, _| {
            ensure_edge(task, ServiceStatus::WaitingResult)?;
            Ok(ServiceStatus::WaitingResult)
        })
        .await
    }

    pub async fn mark_returning(&self, task_id: Uuid) -> Result<PrescriptionService, FlowError> {
        self.update(task_id, |task, _| {
            ensure_edge(task, ServiceStatus::Returning)?;
            Ok(ServiceStatus::Returning)
        })
        .await
        .map(|t| t.task)
    }

    pub async fn complete(
        &self,
        task_id: Uuid,
        results: Option<String>,
    ) -> Result<TaskTransition, FlowError> {
        let transition = self
            .update(task_id, move |task, now| {
                ensure_edge(task, ServiceStatus::Completed)?;
                task.completed_at = Some(now);
                if results.is_some() {
                    task.results = results;
                }
                Ok(ServiceStatus::Completed)
            })
            .await?;

        self.retire(&transition.task).await;
        Ok(transition)
    }

    /// PREPARING -> DELAYED on operator request; the patient is parked until recalled.
    pub async fn delay(&self, task_id: Uuid) -> Result<TaskTransition, FlowError> {
        self.update(task_id, |task, _| {
            if task.status != ServiceStatus::Preparing {
                return Err(FlowError::state(task.status, ServiceStatus::Delayed));
            }
            clear_assignment(task);
            Ok(ServiceStatus::Delayed)
        })
        .await
    }

    pub async fn cancel(&self, task_id: Uuid, reason: &str) -> Result<TaskTransition, FlowError> {
        let transition = self
            .update(task_id, |task, _| {
                ensure_edge(task, ServiceStatus::Cancelled)?;
                task.cancellation_reason = Some(reason.to_string());
                Ok(ServiceStatus::Cancelled)
            })
            .await?;

        self.retire(&transition.task).await;
        Ok(transition)
    }

    /// Cancels every task that can still be cancelled. Tasks awaiting results are left to finish.
    pub async fn cancel_prescription(
        &self,
        prescription_id: Uuid,
        reason: &str,
    ) -> Result<Vec<TaskTransition>, FlowError> {
        let task_ids = {
            let mut prescriptions = self.prescriptions.write().await;
            let prescription = prescriptions
                .get_mut(&prescription_id)
                .ok_or_else(|| FlowError::not_found("prescription", prescription_id))?;
            if prescription.cancelled_at.is_none() {
                prescription.cancelled_at = Some(Utc::now());
                prescription.cancellation_reason = Some(reason.to_string());
            }
            prescription.task_ids.clone()
        };

        let mut cancelled = Vec::new();
        for task_id in task_ids {
            match self.cancel(task_id, reason).await {
                Ok(transition) => cancelled.push(transition),
                Err(FlowError::StateError { from, .. }) => {
                    debug!("Task {} left as {} during cancellation", task_id, from);
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            "Prescription {} cancelled ({} task(s)): {}",
            prescription_id,
            cancelled.len(),
            reason
        );
        Ok(cancelled)
    }

    /// Moves pending tasks of the prescription into the queue. In sequential
    /// mode only the lowest-order pending task goes, and only once nothing else
    /// of the prescription is in flight.
    pub async fn advance(&self, prescription_id: Uuid) -> Result<Vec<PrescriptionService>, FlowError> {
        let _guard = self.advance_lock.lock().await;

        let prescription = self.get_prescription(prescription_id).await?;
        if prescription.cancelled_at.is_some() {
            return Ok(Vec::new());
        }

        let tasks = self.collect(&prescription.task_ids, |_| true).await;
        let pending: Vec<Uuid> = if self.policy.sequential_services {
            if tasks.iter().any(|t| t.status.is_in_flight()) {
                return Ok(Vec::new());
            }
            tasks
                .iter()
                .filter(|t| t.status == ServiceStatus::Pending)
                .min_by_key(|t| t.order)
                .map(|t| t.id)
                .into_iter()
                .collect()
        } else {
            tasks
                .iter()
                .filter(|t| t.status == ServiceStatus::Pending)
                .map(|t| t.id)
                .collect()
        };

        let mut released = Vec::with_capacity(pending.len());
        for task_id in pending {
            released.push(self.release_to_queue(task_id).await?);
        }
        if !released.is_empty() {
            debug!(
                "Released {} task(s) of prescription {} to the queue",
                released.len(),
                prescription.code
            );
        }
        Ok(released)
    }

    pub async fn get_task(&self, task_id: Uuid) -> Result<PrescriptionService, FlowError> {
        let cell = self.cell(task_id).await?;
        let task = cell.lock().await;
        Ok(task.clone())
    }

    pub async fn get_prescription(&self, prescription_id: Uuid) -> Result<Prescription, FlowError> {
        self.prescriptions
            .read()
            .await
            .get(&prescription_id)
            .cloned()
            .ok_or_else(|| FlowError::not_found("prescription", prescription_id))
    }

    pub async fn get_prescription_by_code(&self, code: &str) -> Result<Prescription, FlowError> {
        let prescription_id = self
            .codes
            .read()
            .await
            .get(&code.to_uppercase())
            .copied()
            .ok_or_else(|| FlowError::not_found("prescription", code))?;
        self.get_prescription(prescription_id).await
    }

    /// Tasks of a prescription in ascending `order`.
    pub async fn list_tasks(&self, prescription_id: Uuid) -> Result<Vec<PrescriptionService>, FlowError> {
        let prescription = self.get_prescription(prescription_id).await?;
        let mut tasks = self.collect(&prescription.task_ids, |_| true).await;
        tasks.sort_by_key(|t| t.order);
        Ok(tasks)
    }

    /// The best `limit` callable tasks for the filter, best first.
    pub async fn peek(&self, filter: &QueueFilter, limit: usize) -> Vec<PrescriptionService> {
        let ids = self.partition_ids(filter).await;
        let mut eligible = self
            .collect(&ids, |t| t.status.is_callable() && filter.matches_service(t))
            .await;
        eligible.sort_by_key(|t| t.queue_rank());
        eligible.truncate(limit);
        eligible
    }

    pub async fn snapshot(&self, filter: &QueueFilter) -> QueueSnapshot {
        let ids = self.partition_ids(filter).await;
        let tasks = self
            .collect(&ids, |t| {
                t.status.is_callable()
                    || t.status == ServiceStatus::Delayed
                    || (t.status.holds_session()
                        && filter.booth_id.map_or(true, |booth| t.booth_id == Some(booth)))
            })
            .await;

        let mut waiting: Vec<&PrescriptionService> = tasks
            .iter()
            .filter(|t| t.status.is_callable() && filter.matches_service(t))
            .collect();
        waiting.sort_by_key(|t| t.queue_rank());

        let mut ahead_minutes = 0;
        let waiting = waiting
            .into_iter()
            .enumerate()
            .map(|(index, task)| {
                let entry = QueueEntry {
                    position: index + 1,
                    task_id: task.id,
                    prescription_id: task.prescription_id,
                    service_id: task.service_id,
                    status: task.status,
                    priority: task.priority,
                    order: task.order,
                    skip_count: task.skip_count,
                    estimated_wait_minutes: ahead_minutes,
                };
                ahead_minutes += task.duration_minutes;
                entry
            })
            .collect();

        let mut in_service: Vec<PrescriptionService> = tasks
            .iter()
            .filter(|t| t.status.holds_session())
            .cloned()
            .collect();
        in_service.sort_by_key(|t| t.called_at);

        let mut delayed: Vec<PrescriptionService> = tasks
            .iter()
            .filter(|t| t.status == ServiceStatus::Delayed && filter.matches_service(t))
            .cloned()
            .collect();
        delayed.sort_by_key(|t| t.updated_at);

        QueueSnapshot {
            generated_at: Utc::now(),
            waiting,
            in_service,
            delayed,
        }
    }

    /// Tasks called at least `grace` ago that never started.
    pub async fn overdue_preparing(&self, grace: Duration) -> Vec<Uuid> {
        let ids = self.partition_ids(&QueueFilter::default()).await;
        let cutoff = Utc::now() - grace;
        self.collect(&ids, |t| {
            t.status == ServiceStatus::Preparing && t.called_at.map_or(false, |at| at <= cutoff)
        })
        .await
        .into_iter()
        .map(|t| t.id)
        .collect()
    }

    // Private helper methods

    async fn cell(&self, task_id: Uuid) -> Result<TaskCell, FlowError> {
        self.tasks
            .read()
            .await
            .get(&task_id)
            .cloned()
            .ok_or_else(|| FlowError::not_found("task", task_id))
    }

    /// Runs `apply` under the task lock. `apply` validates, mutates and names the target status.
    async fn update<F>(&self, task_id: Uuid, apply: F) -> Result<TaskTransition, FlowError>
    where
        F: FnOnce(&mut PrescriptionService, DateTime<Utc>) -> Result<ServiceStatus, FlowError>,
    {
        let cell = self.cell(task_id).await?;
        let mut task = cell.lock().await;
        let previous = task.status;
        let released_session = if previous.holds_session() {
            task.work_session_id
        } else {
            None
        };

        let now = Utc::now();
        let target = apply(&mut *task, now)?;
        task.status = target;
        task.updated_at = now;
        debug!("Task {} {:?} -> {:?}", task_id, previous, target);

        Ok(TaskTransition {
            task: task.clone(),
            previous,
            released_session: if target.holds_session() {
                None
            } else {
                released_session
            },
        })
    }

    async fn enter_preparing(
        &self,
        task_id: Uuid,
        expected: Option<ServiceStatus>,
        sources: &[ServiceStatus],
        assignment: Option<Assignment>,
    ) -> Result<PrescriptionService, FlowError> {
        self.update(task_id, |task, now| {
            if let Some(expected) = expected {
                if task.status != expected {
                    return Err(FlowError::ConflictError(format!(
                        "Task {} is {:?}, expected {:?}",
                        task.id, task.status, expected
                    )));
                }
            }
            if !sources.contains(&task.status) {
                return Err(FlowError::state(task.status, ServiceStatus::Preparing));
            }
            ensure_edge(task, ServiceStatus::Preparing)?;

            task.call_count += 1;
            task.called_at = Some(now);
            if let Some(assignment) = assignment {
                task.booth_id = Some(assignment.booth_id);
                task.work_session_id = Some(assignment.work_session_id);
                task.doctor_id = assignment.doctor_id;
                task.technician_id = assignment.technician_id;
            }
            Ok(ServiceStatus::Preparing)
        })
        .await
        .map(|t| t.task)
    }

    async fn partition_ids(&self, filter: &QueueFilter) -> Vec<Uuid> {
        let partitions = self.partitions.read().await;
        match filter.specialty_id {
            Some(specialty_id) => partitions.get(&specialty_id).cloned().unwrap_or_default(),
            None => partitions.values().flatten().copied().collect(),
        }
    }

    async fn collect<P>(&self, ids: &[Uuid], keep: P) -> Vec<PrescriptionService>
    where
        P: Fn(&PrescriptionService) -> bool,
    {
        let cells: Vec<TaskCell> = {
            let tasks = self.tasks.read().await;
            ids.iter().filter_map(|id| tasks.get(id).cloned()).collect()
        };

        let mut kept = Vec::with_capacity(cells.len());
        for cell in cells {
            let task = cell.lock().await;
            if keep(&*task) {
                kept.push(task.clone());
            }
        }
        kept
    }

    /// Drops a finished task from its queue partition. It stays readable by id.
    async fn retire(&self, task: &PrescriptionService) {
        let mut partitions = self.partitions.write().await;
        if let Some(ids) = partitions.get_mut(&task.specialty_id) {
            ids.retain(|id| *id != task.id);
        } else {
            warn!("Task {} had no queue partition", task.id);
        }
    }
}

fn ensure_edge(task: &PrescriptionService, target: ServiceStatus) -> Result<(), FlowError> {
    if task.status.can_transition_to(&target) {
        Ok(())
    } else {
        Err(FlowError::state(task.status, target))
    }
}

fn apply_skip(
    task: &mut PrescriptionService,
    threshold: u32,
    now: DateTime<Utc>,
) -> Result<ServiceStatus, FlowError> {
    ensure_edge(task, ServiceStatus::Skipped)?;

    task.skip_count += 1;
    clear_assignment(task);
    if task.skip_count > threshold {
        return Ok(ServiceStatus::Delayed);
    }

    // SKIPPED -> WAITING: rejoins the queue behind the tail of its band.
    task.queued_at = Some(now);
    Ok(ServiceStatus::Waiting)
}

fn clear_assignment(task: &mut PrescriptionService) {
    task.booth_id = None;
    task.work_session_id = None;
    task.doctor_id = None;
    task.technician_id = None;
}

fn prescription_code() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("RX-{}", hex[..8].to_uppercase())
}
