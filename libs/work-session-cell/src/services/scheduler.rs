use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use clinic_cell::{CatalogAdapter, StaffAvailability, StaffingAdapter};
use shared_models::{FlowError, StaffRole};

use crate::models::{
    windows_overlap, OpenSessionRequest, Reservation, ReservationRequest, SchedulerPolicy,
    WorkSession, WorkSessionStatus,
};

const STAFF_PICK_ATTEMPTS: usize = 3;

#[derive(Default)]
struct BoothLedger {
    sessions: Vec<WorkSession>,
}

impl BoothLedger {
    fn session_mut(&mut self, session_id: Uuid) -> Option<&mut WorkSession> {
        self.sessions.iter_mut().find(|s| s.id == session_id)
    }

    fn activate_due(&mut self, now: DateTime<Utc>) {
        for session in self.sessions.iter_mut() {
            if session.status == WorkSessionStatus::Scheduled && session.start_time <= now {
                session.status = WorkSessionStatus::Active;
                session.updated_at = now;
            }
        }
    }

    fn live_sessions(&self) -> impl Iterator<Item = &WorkSession> {
        self.sessions.iter().filter(|s| !s.status.is_closed())
    }
}

#[derive(Debug, Clone, Copy)]
struct StaffBooking {
    session_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

/// Owns booth reservations. Writes to one booth are serialized by that
/// booth's ledger lock; different booths never contend. The staff calendar
/// lock is only ever taken while holding at most one ledger lock.
pub struct WorkSessionScheduler {
    catalog: Arc<dyn CatalogAdapter>,
    staffing: Arc<dyn StaffingAdapter>,
    policy: SchedulerPolicy,
    booths: RwLock<HashMap<Uuid, Arc<Mutex<BoothLedger>>>>,
    session_booths: RwLock<HashMap<Uuid, Uuid>>,
    staff_calendar: Mutex<HashMap<Uuid, Vec<StaffBooking>>>,
}

impl WorkSessionScheduler {
    pub fn new(
        catalog: Arc<dyn CatalogAdapter>,
        staffing: Arc<dyn StaffingAdapter>,
        policy: SchedulerPolicy,
    ) -> Self {
        Self {
            catalog,
            staffing,
            policy,
            booths: RwLock::new(HashMap::new()),
            session_booths: RwLock::new(HashMap::new()),
            staff_calendar: Mutex::new(HashMap::new()),
        }
    }

    /// Schedule a session explicitly (admin roster). Rejects overlap on the booth or for the staff.
    pub async fn open_session(&self, request: OpenSessionRequest) -> Result<WorkSession, FlowError> {
        if request.end_time <= request.start_time {
            return Err(FlowError::ValidationError(
                "Work session must end after it starts".to_string(),
            ));
        }
        if request.doctor_id.is_none() && request.technician_id.is_none() {
            return Err(FlowError::ValidationError(
                "Work session needs a doctor or a technician".to_string(),
            ));
        }

        let booth = self.catalog.get_booth(request.booth_id).await?;
        if !booth.booth.is_active {
            return Err(FlowError::ValidationError(format!(
                "Booth {} is inactive",
                booth.booth.code
            )));
        }
        if let Some(doctor_id) = request.doctor_id {
            self.staffing.get_doctor_availability(doctor_id).await?;
        }
        if let Some(technician_id) = request.technician_id {
            self.staffing.get_technician_availability(technician_id).await?;
        }

        let ledger = self.ledger(request.booth_id).await;
        let mut ledger = ledger.lock().await;

        let now = Utc::now();
        let session = WorkSession {
            id: Uuid::new_v4(),
            booth_id: request.booth_id,
            doctor_id: request.doctor_id,
            technician_id: request.technician_id,
            start_time: request.start_time,
            end_time: request.end_time,
            next_available_at: request.start_time,
            status: if request.start_time <= now {
                WorkSessionStatus::Active
            } else {
                WorkSessionStatus::Scheduled
            },
            active_task_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        self.insert_session(&mut ledger, session.clone()).await?;
        info!(
            "Work session {} opened on booth {} ({} - {})",
            session.id, session.booth_id, session.start_time, session.end_time
        );
        Ok(session)
    }

    /// Find a staffed session able to take the task now, opening one when staff allow.
    pub async fn reserve(&self, request: ReservationRequest) -> Result<Reservation, FlowError> {
        if request.booth_ids.is_empty() {
            return Err(FlowError::CapacityError(format!(
                "No compatible booth for task {}",
                request.task_id
            )));
        }

        let duration = request.duration();

        for booth_id in &request.booth_ids {
            let ledger = self.ledger(*booth_id).await;
            let mut ledger = ledger.lock().await;
            let now = Utc::now();
            ledger.activate_due(now);

            let candidate = ledger.sessions.iter_mut().find(|session| {
                session.status == WorkSessionStatus::Active
                    && session.covers(now)
                    && session.is_staff_free()
                    && staff_matches(session, &request)
                    && session.next_available_at.max(now) + duration <= session.end_time
            });

            if let Some(session) = candidate {
                let reserved_from = session.next_available_at.max(now);
                let reserved_until = reserved_from + duration;
                session.next_available_at = reserved_until;
                session.active_task_ids.push(request.task_id);
                session.updated_at = now;

                debug!(
                    "Task {} reserved on session {} until {}",
                    request.task_id, session.id, reserved_until
                );
                return Ok(Reservation {
                    session_id: session.id,
                    booth_id: session.booth_id,
                    task_id: request.task_id,
                    doctor_id: session.doctor_id,
                    technician_id: session.technician_id,
                    reserved_from,
                    reserved_until,
                    opened_session: false,
                });
            }
        }

        for booth_id in &request.booth_ids {
            if let Some(reservation) = self.open_on_demand(*booth_id, &request).await? {
                return Ok(reservation);
            }
        }

        warn!("No booth or staff available for task {}", request.task_id);
        Err(FlowError::CapacityError(format!(
            "No staffed booth available for task {}",
            request.task_id
        )))
    }

    /// Frees the staff for the next call. Reserved time is not refunded.
    pub async fn release(&self, session_id: Uuid, task_id: Uuid) -> Result<(), FlowError> {
        let ledger = self.ledger_for_session(session_id).await?;
        let mut ledger = ledger.lock().await;
        let session = ledger
            .session_mut(session_id)
            .ok_or_else(|| FlowError::not_found("work session", session_id))?;

        let before = session.active_task_ids.len();
        session.active_task_ids.retain(|id| *id != task_id);
        if session.active_task_ids.len() < before {
            session.updated_at = Utc::now();
            debug!("Task {} released from session {}", task_id, session_id);
        } else {
            debug!("Task {} held nothing on session {}", task_id, session_id);
        }
        Ok(())
    }

    /// Fails with `CapacityError` unless the task still holds a usable seat on the session.
    pub async fn ensure_held(&self, session_id: Uuid, task_id: Uuid) -> Result<(), FlowError> {
        let session = self.get_session(session_id).await?;
        if session.status.is_closed() || !session.active_task_ids.contains(&task_id) {
            return Err(FlowError::CapacityError(format!(
                "Task {} has no live allocation on session {}",
                task_id, session_id
            )));
        }
        Ok(())
    }

    pub async fn close_session(&self, session_id: Uuid) -> Result<WorkSession, FlowError> {
        let ledger = self.ledger_for_session(session_id).await?;
        let mut ledger = ledger.lock().await;
        let session = ledger
            .session_mut(session_id)
            .ok_or_else(|| FlowError::not_found("work session", session_id))?;

        if !session.status.can_transition_to(&WorkSessionStatus::Closed) {
            return Err(FlowError::state(session.status, WorkSessionStatus::Closed));
        }
        if !session.is_staff_free() {
            warn!(
                "Refusing to close session {} with {} task(s) in hand",
                session_id,
                session.active_task_ids.len()
            );
            return Err(FlowError::state(session.status, WorkSessionStatus::Closed));
        }

        session.status = WorkSessionStatus::Closed;
        session.updated_at = Utc::now();
        let closed = session.clone();

        let mut calendar = self.staff_calendar.lock().await;
        for staff_id in closed.staff_ids() {
            if let Some(bookings) = calendar.get_mut(&staff_id) {
                bookings.retain(|b| b.session_id != session_id);
            }
        }

        info!("Work session {} closed", session_id);
        Ok(closed)
    }

    pub async fn activate_session(&self, session_id: Uuid) -> Result<WorkSession, FlowError> {
        self.transition(session_id, WorkSessionStatus::Active).await
    }

    pub async fn pause_session(&self, session_id: Uuid) -> Result<WorkSession, FlowError> {
        self.transition(session_id, WorkSessionStatus::Paused).await
    }

    pub async fn resume_session(&self, session_id: Uuid) -> Result<WorkSession, FlowError> {
        self.transition(session_id, WorkSessionStatus::Active).await
    }

    pub async fn get_session(&self, session_id: Uuid) -> Result<WorkSession, FlowError> {
        let ledger = self.ledger_for_session(session_id).await?;
        let ledger = ledger.lock().await;
        ledger
            .sessions
            .iter()
            .find(|s| s.id == session_id)
            .cloned()
            .ok_or_else(|| FlowError::not_found("work session", session_id))
    }

    pub async fn list_sessions(&self, booth_id: Uuid) -> Vec<WorkSession> {
        let ledger = {
            let booths = self.booths.read().await;
            match booths.get(&booth_id) {
                Some(ledger) => Arc::clone(ledger),
                None => return Vec::new(),
            }
        };
        let mut sessions = ledger.lock().await.sessions.clone();
        sessions.sort_by_key(|s| s.start_time);
        sessions
    }

    // Private helper methods

    async fn transition(
        &self,
        session_id: Uuid,
        target: WorkSessionStatus,
    ) -> Result<WorkSession, FlowError> {
        let ledger = self.ledger_for_session(session_id).await?;
        let mut ledger = ledger.lock().await;
        let session = ledger
            .session_mut(session_id)
            .ok_or_else(|| FlowError::not_found("work session", session_id))?;

        if !session.status.can_transition_to(&target) {
            return Err(FlowError::state(session.status, target));
        }
        debug!("Session {} {:?} -> {:?}", session_id, session.status, target);
        session.status = target;
        session.updated_at = Utc::now();
        Ok(session.clone())
    }

    async fn open_on_demand(
        &self,
        booth_id: Uuid,
        request: &ReservationRequest,
    ) -> Result<Option<Reservation>, FlowError> {
        let booth = self.catalog.get_booth(booth_id).await?;
        if !booth.booth.is_active {
            return Ok(None);
        }

        let duration = request.duration();
        let mut passed_over: Vec<Uuid> = Vec::new();

        for _ in 0..STAFF_PICK_ATTEMPTS {
            let now = Utc::now();
            let doctor = if request.requires_doctor {
                match self.pick_doctor(request, now, &passed_over).await? {
                    Some(doctor) => Some(doctor),
                    None => return Ok(None),
                }
            } else {
                None
            };
            // A booth without a doctor is still staffed by a technician.
            let technician = if request.requires_technician || doctor.is_none() {
                match self
                    .pick_staff(
                        StaffRole::Technician,
                        Some(request.specialty_id),
                        now,
                        &passed_over,
                    )
                    .await?
                {
                    Some(technician) => Some(technician),
                    None => return Ok(None),
                }
            } else {
                None
            };

            let picked: Vec<Uuid> = doctor
                .iter()
                .chain(technician.iter())
                .map(|s| s.staff_id)
                .collect();

            match self
                .open_with(booth_id, doctor, technician, request, now, duration)
                .await
            {
                // Staff got booked by a concurrent reservation; pick someone else.
                Err(FlowError::ConflictError(reason)) => {
                    debug!("On-demand session for booth {} retried: {}", booth_id, reason);
                    passed_over.extend(picked);
                }
                other => return other,
            }
        }

        Ok(None)
    }

    async fn open_with(
        &self,
        booth_id: Uuid,
        doctor: Option<StaffAvailability>,
        technician: Option<StaffAvailability>,
        request: &ReservationRequest,
        now: DateTime<Utc>,
        duration: Duration,
    ) -> Result<Option<Reservation>, FlowError> {
        let ledger = self.ledger(booth_id).await;
        let mut ledger = ledger.lock().await;
        ledger.activate_due(now);

        // Any live session already covering now keeps the booth (paused or busy).
        if ledger.live_sessions().any(|s| s.covers(now)) {
            return Ok(None);
        }

        let mut end = now + Duration::minutes(self.policy.default_session_minutes);
        if let Some(next_start) = ledger
            .live_sessions()
            .filter(|s| s.start_time > now)
            .map(|s| s.start_time)
            .min()
        {
            end = end.min(next_start);
        }
        for staff in doctor.iter().chain(technician.iter()) {
            if let Some(shift_end) = staff.shift_end {
                end = end.min(shift_end);
            }
        }
        if now + duration > end {
            return Ok(None);
        }

        let session = WorkSession {
            id: Uuid::new_v4(),
            booth_id,
            doctor_id: doctor.as_ref().map(|d| d.staff_id),
            technician_id: technician.as_ref().map(|t| t.staff_id),
            start_time: now,
            end_time: end,
            next_available_at: now + duration,
            status: WorkSessionStatus::Active,
            active_task_ids: vec![request.task_id],
            created_at: now,
            updated_at: now,
        };

        self.insert_session(&mut ledger, session.clone()).await?;

        info!(
            "Opened work session {} on booth {} for task {}",
            session.id, booth_id, request.task_id
        );
        Ok(Some(Reservation {
            session_id: session.id,
            booth_id,
            task_id: request.task_id,
            doctor_id: session.doctor_id,
            technician_id: session.technician_id,
            reserved_from: now,
            reserved_until: now + duration,
            opened_session: true,
        }))
    }

    async fn pick_doctor(
        &self,
        request: &ReservationRequest,
        now: DateTime<Utc>,
        passed_over: &[Uuid],
    ) -> Result<Option<StaffAvailability>, FlowError> {
        if let Some(doctor_id) = request.preferred_doctor_id {
            let availability = self.staffing.get_doctor_availability(doctor_id).await?;
            if availability.covers(now)
                && !passed_over.contains(&doctor_id)
                && self.is_unbooked(doctor_id, now).await
            {
                return Ok(Some(availability));
            }
            return Ok(None);
        }
        self.pick_staff(StaffRole::Doctor, Some(request.specialty_id), now, passed_over)
            .await
    }

    async fn pick_staff(
        &self,
        role: StaffRole,
        specialty_id: Option<Uuid>,
        now: DateTime<Utc>,
        passed_over: &[Uuid],
    ) -> Result<Option<StaffAvailability>, FlowError> {
        let candidates = self.staffing.find_available(role, specialty_id, now).await?;
        for candidate in candidates {
            if passed_over.contains(&candidate.staff_id) {
                continue;
            }
            if self.is_unbooked(candidate.staff_id, now).await {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    async fn is_unbooked(&self, staff_id: Uuid, at: DateTime<Utc>) -> bool {
        let calendar = self.staff_calendar.lock().await;
        calendar
            .get(&staff_id)
            .map_or(true, |bookings| !bookings.iter().any(|b| b.start <= at && at < b.end))
    }

    /// Caller holds the booth's ledger lock.
    async fn insert_session(
        &self,
        ledger: &mut BoothLedger,
        session: WorkSession,
    ) -> Result<(), FlowError> {
        if let Some(existing) = ledger
            .live_sessions()
            .find(|s| s.overlaps(session.start_time, session.end_time))
        {
            return Err(FlowError::ConflictError(format!(
                "Booth {} already has session {} from {} to {}",
                session.booth_id, existing.id, existing.start_time, existing.end_time
            )));
        }

        let mut calendar = self.staff_calendar.lock().await;
        for staff_id in session.staff_ids() {
            let clash = calendar.get(&staff_id).and_then(|bookings| {
                bookings
                    .iter()
                    .find(|b| windows_overlap(b.start, b.end, session.start_time, session.end_time))
            });
            if let Some(clash) = clash {
                return Err(FlowError::ConflictError(format!(
                    "Staff {} is already booked on session {}",
                    staff_id, clash.session_id
                )));
            }
        }
        for staff_id in session.staff_ids() {
            calendar.entry(staff_id).or_default().push(StaffBooking {
                session_id: session.id,
                start: session.start_time,
                end: session.end_time,
            });
        }
        drop(calendar);

        self.session_booths
            .write()
            .await
            .insert(session.id, session.booth_id);
        ledger.sessions.push(session);
        Ok(())
    }

    async fn ledger(&self, booth_id: Uuid) -> Arc<Mutex<BoothLedger>> {
        if let Some(ledger) = self.booths.read().await.get(&booth_id) {
            return Arc::clone(ledger);
        }
        let mut booths = self.booths.write().await;
        Arc::clone(booths.entry(booth_id).or_default())
    }

    async fn ledger_for_session(&self, session_id: Uuid) -> Result<Arc<Mutex<BoothLedger>>, FlowError> {
        let booth_id = self
            .session_booths
            .read()
            .await
            .get(&session_id)
            .copied()
            .ok_or_else(|| FlowError::not_found("work session", session_id))?;
        Ok(self.ledger(booth_id).await)
    }
}

fn staff_matches(session: &WorkSession, request: &ReservationRequest) -> bool {
    if request.requires_doctor {
        match (session.doctor_id, request.preferred_doctor_id) {
            (None, _) => return false,
            (Some(doctor), Some(preferred)) if doctor != preferred => return false,
            _ => {}
        }
    }
    if request.requires_technician && session.technician_id.is_none() {
        return false;
    }
    true
}
