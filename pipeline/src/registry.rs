//! SPDX-License-Identifier: GPL-3.0-or-later

//! The session registry: id map plus ip map guarded by two locks acquired in
//! the fixed order sessions -> ip_map, admission control for ACTIVE
//! sessions, and the background reaper that evicts stale sessions.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use log::{info, warn};
use serde_json::{json, Value};

use crate::config::SharedConfig;
use crate::error::ErrorCode;
use crate::extract::PoseExtractor;
use crate::frame::FrameData;
use crate::pipeline::PipelineProcessor;
use crate::response::{AnalysisOutcome, ApiError, ManagementCode, SummaryResponse};
use crate::session::{AnalyzingState, ClientInfo, SessionData, SessionId, SessionStatus};
use crate::summary::build_summary;
use crate::trace::TraceWriter;

type SharedSession = Arc<Mutex<SessionData>>;

struct SessionTable {
    map: HashMap<SessionId, SharedSession>,
    active_count: usize,
}

pub struct SessionRegistry {
    config: SharedConfig,
    processor: PipelineProcessor,
    sessions: Mutex<SessionTable>,
    ip_map: Mutex<HashMap<IpAddr, SessionId>>,
}

enum CleanupAction {
    Remove,
    ForceEnd,
}

impl SessionRegistry {
    pub fn new(
        config: SharedConfig,
        extractor: Arc<dyn PoseExtractor>,
        trace_writer: Arc<TraceWriter>,
    ) -> Self {
        SessionRegistry {
            config,
            processor: PipelineProcessor::new(extractor, trace_writer),
            sessions: Mutex::new(SessionTable {
                map: HashMap::new(),
                active_count: 0,
            }),
            ip_map: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    /// Registers a new session unless the client's IP already owns a live
    /// one; the conflict error carries the existing session id.
    pub fn register(
        &self,
        exercise_name: &str,
        client: ClientInfo,
    ) -> Result<(ManagementCode, SessionId), ApiError> {
        let config = self.config.current();
        let exercise = crate::exercise::ExerciseType::parse(exercise_name)?;
        if !config
            .settings
            .session
            .supported_exercises
            .iter()
            .any(|name| name.eq_ignore_ascii_case(exercise_name.trim()))
        {
            return Err(ErrorCode::ExerciseTypeDoesNotExist.into());
        }

        let mut table = self.sessions.lock().expect("sessions lock poisoned");
        let mut ip_map = self.ip_map.lock().expect("ip map lock poisoned");

        if let Some(existing_id) = ip_map.get(&client.ip) {
            if let Some(entry) = table.map.get(existing_id) {
                let status = entry.lock().expect("session lock poisoned").session_status;
                // ENDED sessions no longer block their IP.
                if status != SessionStatus::Ended {
                    return Err(ApiError::with_session_id(
                        status.to_conflict_error(),
                        existing_id.to_string(),
                    ));
                }
            }
        }

        let session_id = SessionId::generate();
        let ip = client.ip;
        let session = SessionData::new(session_id.clone(), client, exercise);
        table
            .map
            .insert(session_id.clone(), Arc::new(Mutex::new(session)));
        ip_map.insert(ip, session_id.clone());

        info!("session {session_id} registered for {ip} ({exercise_name})");
        Ok((ManagementCode::ClientRegisteredSuccessfully, session_id))
    }

    /// Removes a session that never started.
    pub fn unregister(&self, session_id: &str) -> Result<ManagementCode, ApiError> {
        let session_id = SessionId::parse(session_id)?;
        let mut table = self.sessions.lock().expect("sessions lock poisoned");

        let entry = table
            .map
            .get(&session_id)
            .cloned()
            .ok_or(ErrorCode::ClientIsNotRegistered)?;
        let ip = {
            let session = entry.lock().expect("session lock poisoned");
            if session.session_status != SessionStatus::Registered {
                return Err(session.session_status.to_conflict_error().into());
            }
            session.client_info.ip
        };

        table.map.remove(&session_id);
        self.ip_map
            .lock()
            .expect("ip map lock poisoned")
            .remove(&ip);
        info!("session {session_id} unregistered");
        Ok(ManagementCode::ClientSessionIsUnregistered)
    }

    /// REGISTERED -> ACTIVE, subject to the concurrent-client limit.
    pub fn start(
        &self,
        session_id: &str,
        extended_evaluation: bool,
    ) -> Result<ManagementCode, ApiError> {
        let config = self.config.current();
        let session_id = SessionId::parse(session_id)?;
        let mut table = self.sessions.lock().expect("sessions lock poisoned");

        let entry = table
            .map
            .get(&session_id)
            .cloned()
            .ok_or(ErrorCode::ClientIsNotRegistered)?;
        let mut session = entry.lock().expect("session lock poisoned");
        if session.session_status != SessionStatus::Registered {
            return Err(session.session_status.to_conflict_error().into());
        }
        if table.active_count >= config.settings.session.maximum_clients {
            warn!(
                "admission refused for {session_id}: {} active of {} allowed",
                table.active_count, config.settings.session.maximum_clients
            );
            return Err(ErrorCode::MaxClientReached.into());
        }

        session.session_status = SessionStatus::Active;
        session.analyzing_state = AnalyzingState::Init;
        session.extended_evaluation = extended_evaluation;
        session.times.started = Some(Utc::now());
        session.touch();
        table.active_count += 1;
        self.processor.start(&config, &mut session);

        info!("session {session_id} started");
        Ok(ManagementCode::ClientSessionIsActive)
    }

    /// ACTIVE -> PAUSED.
    pub fn pause(&self, session_id: &str) -> Result<ManagementCode, ApiError> {
        let config = self.config.current();
        let session_id = SessionId::parse(session_id)?;
        let mut table = self.sessions.lock().expect("sessions lock poisoned");

        let entry = table
            .map
            .get(&session_id)
            .cloned()
            .ok_or(ErrorCode::ClientIsNotRegistered)?;
        let mut session = entry.lock().expect("session lock poisoned");
        match session.session_status {
            SessionStatus::Active => {}
            SessionStatus::Paused => return Err(ErrorCode::ClientIsAlreadyPaused.into()),
            other => return Err(other.to_conflict_error().into()),
        }

        session.session_status = SessionStatus::Paused;
        session.times.paused = Some(Utc::now());
        table.active_count = table.active_count.saturating_sub(1);
        self.processor.pause(&config, &mut session);

        info!("session {session_id} paused");
        Ok(ManagementCode::ClientSessionIsPaused)
    }

    /// PAUSED -> ACTIVE, re-running admission control.
    pub fn resume(&self, session_id: &str) -> Result<ManagementCode, ApiError> {
        let config = self.config.current();
        let session_id = SessionId::parse(session_id)?;
        let mut table = self.sessions.lock().expect("sessions lock poisoned");

        let entry = table
            .map
            .get(&session_id)
            .cloned()
            .ok_or(ErrorCode::ClientIsNotRegistered)?;
        let mut session = entry.lock().expect("session lock poisoned");
        match session.session_status {
            SessionStatus::Paused => {}
            SessionStatus::Active => return Err(ErrorCode::ClientIsAlreadyActive.into()),
            other => return Err(other.to_conflict_error().into()),
        }
        if table.active_count >= config.settings.session.maximum_clients {
            return Err(ErrorCode::MaxClientReached.into());
        }

        session.session_status = SessionStatus::Active;
        session.touch();
        table.active_count += 1;
        self.processor.resume(&config, &mut session);

        info!("session {session_id} resumed");
        Ok(ManagementCode::ClientSessionIsResumed)
    }

    /// ACTIVE or PAUSED -> ENDED. The IP mapping is released so the client
    /// can register again while the ended session ages out.
    pub fn end(&self, session_id: &str) -> Result<ManagementCode, ApiError> {
        let config = self.config.current();
        let session_id = SessionId::parse(session_id)?;
        let mut table = self.sessions.lock().expect("sessions lock poisoned");

        let entry = table
            .map
            .get(&session_id)
            .cloned()
            .ok_or(ErrorCode::ClientIsNotRegistered)?;
        let mut session = entry.lock().expect("session lock poisoned");
        let was_active = match session.session_status {
            SessionStatus::Active => true,
            SessionStatus::Paused => false,
            other => return Err(other.to_conflict_error().into()),
        };

        session.session_status = SessionStatus::Ended;
        session.times.ended = Some(Utc::now());
        if was_active {
            table.active_count = table.active_count.saturating_sub(1);
        }
        self.processor.end(&config, &mut session);
        session.analyzing_state = AnalyzingState::Done;

        let ip = session.client_info.ip;
        drop(session);
        self.ip_map
            .lock()
            .expect("ip map lock poisoned")
            .remove(&ip);

        info!("session {session_id} ended");
        Ok(ManagementCode::ClientSessionIsEnded)
    }

    /// Current lifecycle status as a management code.
    pub fn status(&self, session_id: &str) -> Result<ManagementCode, ApiError> {
        let session_id = SessionId::parse(session_id)?;
        let table = self.sessions.lock().expect("sessions lock poisoned");
        let Some(entry) = table.map.get(&session_id) else {
            return Ok(ManagementCode::ClientSessionIsNotInSystem);
        };
        let status = entry.lock().expect("session lock poisoned").session_status;
        Ok(match status {
            SessionStatus::Registered => ManagementCode::ClientSessionIsRegistered,
            SessionStatus::Active => ManagementCode::ClientSessionIsActive,
            SessionStatus::Paused => ManagementCode::ClientSessionIsPaused,
            SessionStatus::Ended => ManagementCode::ClientSessionIsEnded,
            SessionStatus::NotInSystem => ManagementCode::ClientSessionIsNotInSystem,
        })
    }

    /// Runs one frame through the pipeline. The per-session lock is held for
    /// the full duration, serializing frames within a session while other
    /// sessions proceed in parallel.
    pub fn analyze_frame(
        &self,
        session_id: &str,
        frame: FrameData,
    ) -> Result<AnalysisOutcome, ApiError> {
        let config = self.config.current();
        let session_id = SessionId::parse(session_id)?;

        let entry = {
            let table = self.sessions.lock().expect("sessions lock poisoned");
            table.map.get(&session_id).cloned()
        }
        .ok_or(ErrorCode::ClientIsNotActive)?;

        let mut session = entry.lock().expect("session lock poisoned");
        if session.session_status != SessionStatus::Active {
            return Err(ErrorCode::ClientIsNotActive.into());
        }
        session.touch();

        self.processor
            .analyze_frame(&config, &mut session, &frame)
            .map_err(ApiError::from)
    }

    /// Summary of an ended session.
    pub fn summary(&self, session_id: &str) -> Result<SummaryResponse, ApiError> {
        let config = self.config.current();
        let session_id = SessionId::parse(session_id)?;

        let entry = {
            let table = self.sessions.lock().expect("sessions lock poisoned");
            table.map.get(&session_id).cloned()
        }
        .ok_or(ErrorCode::ClientIsNotRegistered)?;

        let session = entry.lock().expect("session lock poisoned");
        if session.session_status != SessionStatus::Ended {
            return Err(ErrorCode::ClientIsNotEnded.into());
        }
        Ok(build_summary(&config.settings.summary, &session))
    }

    pub fn refresh_configurations(&self) -> Result<(), ApiError> {
        self.config.refresh().map_err(ApiError::from)
    }

    /// One reaper sweep. REGISTERED sessions that never started and ENDED
    /// sessions past retention are removed; overdue ACTIVE and PAUSED
    /// sessions are forced to ENDED so their summary stays retrievable.
    /// Returns (removed, force_ended).
    pub fn cleanup_pass(&self) -> (usize, usize) {
        let config = self.config.current();
        let tasks = &config.settings.tasks;
        let now = Utc::now();
        let minutes = |m: u64| chrono::Duration::minutes(m as i64);

        let snapshot: Vec<(SessionId, SharedSession)> = {
            let table = self.sessions.lock().expect("sessions lock poisoned");
            table
                .map
                .iter()
                .map(|(id, entry)| (id.clone(), entry.clone()))
                .collect()
        };

        let mut decisions = Vec::new();
        for (id, entry) in snapshot {
            let session = entry.lock().expect("session lock poisoned");
            let action = match session.session_status {
                SessionStatus::Registered => session
                    .times
                    .registered
                    .filter(|&t| now - t >= minutes(tasks.max_registration_minutes))
                    .map(|_| CleanupAction::Remove),
                SessionStatus::Active => session
                    .times
                    .last_activity
                    .filter(|&t| now - t >= minutes(tasks.max_inactive_minutes))
                    .map(|_| CleanupAction::ForceEnd),
                SessionStatus::Paused => session
                    .times
                    .paused
                    .filter(|&t| now - t >= minutes(tasks.max_pause_minutes))
                    .map(|_| CleanupAction::ForceEnd),
                SessionStatus::Ended => session
                    .times
                    .ended
                    .filter(|&t| now - t >= minutes(tasks.max_ended_retention))
                    .map(|_| CleanupAction::Remove),
                SessionStatus::NotInSystem => None,
            };
            if let Some(action) = action {
                decisions.push((id, action));
            }
        }

        let mut removed = 0usize;
        let mut force_ended = 0usize;
        for (id, action) in decisions {
            match action {
                CleanupAction::Remove => {
                    let mut table = self.sessions.lock().expect("sessions lock poisoned");
                    if let Some(entry) = table.map.remove(&id) {
                        let ip = entry.lock().expect("session lock poisoned").client_info.ip;
                        self.ip_map
                            .lock()
                            .expect("ip map lock poisoned")
                            .remove(&ip);
                        removed += 1;
                        info!("cleanup removed stale session {id}");
                    }
                }
                CleanupAction::ForceEnd => {
                    let mut table = self.sessions.lock().expect("sessions lock poisoned");
                    let Some(entry) = table.map.get(&id).cloned() else {
                        continue;
                    };
                    let mut session = entry.lock().expect("session lock poisoned");
                    let was_active = session.session_status == SessionStatus::Active;
                    if !was_active && session.session_status != SessionStatus::Paused {
                        continue; // State changed since the snapshot.
                    }
                    session.session_status = SessionStatus::Ended;
                    session.times.ended = Some(now);
                    if was_active {
                        table.active_count = table.active_count.saturating_sub(1);
                    }
                    self.processor.end(&config, &mut session);
                    session.analyzing_state = AnalyzingState::Done;
                    let ip = session.client_info.ip;
                    drop(session);
                    self.ip_map
                        .lock()
                        .expect("ip map lock poisoned")
                        .remove(&ip);
                    force_ended += 1;
                    info!("cleanup forced session {id} to ENDED");
                }
            }
        }
        (removed, force_ended)
    }

    /// Spawns the reaper and the periodic configuration refresh. Both are
    /// daemon-style threads that live for the process lifetime.
    pub fn spawn_background_tasks(self: &Arc<Self>) {
        let registry = Arc::clone(self);
        thread::Builder::new()
            .name("session-cleanup".to_string())
            .spawn(move || loop {
                let interval = registry
                    .config
                    .current()
                    .settings
                    .tasks
                    .cleanup_interval_minutes;
                thread::sleep(Duration::from_secs(interval * 60));
                let (removed, force_ended) = registry.cleanup_pass();
                if removed + force_ended > 0 {
                    info!("cleanup pass: removed {removed}, force ended {force_ended}");
                }
            })
            .expect("failed to spawn cleanup thread");

        let registry = Arc::clone(self);
        thread::Builder::new()
            .name("config-refresh".to_string())
            .spawn(move || loop {
                let interval = registry
                    .config
                    .current()
                    .settings
                    .tasks
                    .retrieve_configuration_minutes;
                thread::sleep(Duration::from_secs(interval * 60));
                if let Err(err) = registry.config.refresh() {
                    warn!("periodic configuration refresh failed: {err:?}");
                }
            })
            .expect("failed to spawn config refresh thread");
    }

    /// Internal state snapshot for the telemetry route.
    pub fn debug_state(&self) -> Value {
        let config = self.config.current();
        let table = self.sessions.lock().expect("sessions lock poisoned");
        let ip_map = self.ip_map.lock().expect("ip map lock poisoned");

        let mut counters = HashMap::from([
            ("registered_sessions", 0u32),
            ("active_sessions", 0u32),
            ("paused_sessions", 0u32),
            ("ended_sessions", 0u32),
        ]);
        let mut sessions = serde_json::Map::new();
        for (id, entry) in &table.map {
            let session = entry.lock().expect("session lock poisoned");
            let key = match session.session_status {
                SessionStatus::Registered => "registered_sessions",
                SessionStatus::Active => "active_sessions",
                SessionStatus::Paused => "paused_sessions",
                SessionStatus::Ended => "ended_sessions",
                SessionStatus::NotInSystem => continue,
            };
            *counters.get_mut(key).expect("counter key") += 1;
            sessions.insert(
                id.to_string(),
                json!({
                    "status": session.session_status.name(),
                    "exercise_type": session.exercise_type.name(),
                    "extended_evaluation": session.extended_evaluation,
                    "analyzing_state": session.analyzing_state.name(),
                    "last_activity": session.times.last_activity,
                    "rep_count": session.history.rep_count(),
                }),
            );
        }

        json!({
            "supported_exercises": config.settings.session.supported_exercises,
            "maximum_clients": config.settings.session.maximum_clients,
            "counters": counters,
            "total_sessions": table.map.len(),
            "ip_map": ip_map
                .iter()
                .map(|(ip, id)| (ip.to_string(), id.to_string()))
                .collect::<HashMap<_, _>>(),
            "sessions": sessions,
            "cleanup_interval_minutes": config.settings.tasks.cleanup_interval_minutes,
            "max_registration_minutes": config.settings.tasks.max_registration_minutes,
            "max_inactive_minutes": config.settings.tasks.max_inactive_minutes,
            "max_pause_minutes": config.settings.tasks.max_pause_minutes,
            "max_ended_retention": config.settings.tasks.max_ended_retention,
        })
    }
}
