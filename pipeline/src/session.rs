//! SPDX-License-Identifier: GPL-3.0-or-later

//! Session identity and per-session state. The lifecycle state machine is
//! REGISTERED -> ACTIVE <-> PAUSED -> ENDED; the analyzing sub-state drives
//! which slice of the pipeline a frame runs through.

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::exercise::ExerciseType;
use crate::history::HistoryData;
use crate::trace::FrameTrace;

/// Opaque unique session identifier. Generated randomly; collisions are
/// negligible.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        SessionId(Uuid::new_v4().to_string())
    }

    /// Validates a client-provided id string.
    pub fn parse(raw: &str) -> Result<Self, ErrorCode> {
        Uuid::parse_str(raw.trim())
            .map(|u| SessionId(u.to_string()))
            .map_err(|_| ErrorCode::InvalidSessionId)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a session. NOT_IN_SYSTEM is a search result, never a
/// stored status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Registered,
    Active,
    Paused,
    Ended,
    NotInSystem,
}

impl SessionStatus {
    pub fn name(self) -> &'static str {
        match self {
            SessionStatus::Registered => "REGISTERED",
            SessionStatus::Active => "ACTIVE",
            SessionStatus::Paused => "PAUSED",
            SessionStatus::Ended => "ENDED",
            SessionStatus::NotInSystem => "NOT_IN_SYSTEM",
        }
    }

    /// Error a client gets when its existing session blocks an operation.
    pub fn to_conflict_error(self) -> ErrorCode {
        match self {
            SessionStatus::Registered => ErrorCode::ClientIsAlreadyRegistered,
            SessionStatus::Active => ErrorCode::ClientIsAlreadyActive,
            SessionStatus::Paused => ErrorCode::ClientIsAlreadyPaused,
            SessionStatus::Ended => ErrorCode::ClientIsAlreadyEnded,
            SessionStatus::NotInSystem => ErrorCode::ClientIsNotRegistered,
        }
    }
}

/// Analyzing sub-state of an active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalyzingState {
    Init,
    Ready,
    Active,
    Done,
    Failure,
}

impl AnalyzingState {
    pub fn name(self) -> &'static str {
        match self {
            AnalyzingState::Init => "INIT",
            AnalyzingState::Ready => "READY",
            AnalyzingState::Active => "ACTIVE",
            AnalyzingState::Done => "DONE",
            AnalyzingState::Failure => "FAILURE",
        }
    }
}

/// Who opened the session.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub ip: IpAddr,
    pub user_agent: String,
}

/// Lifecycle timestamps, each stamped once per transition.
#[derive(Debug, Clone, Default)]
pub struct SessionTimes {
    pub registered: Option<DateTime<Utc>>,
    pub started: Option<DateTime<Utc>>,
    pub paused: Option<DateTime<Utc>>,
    pub ended: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Everything the server holds for one session. Owned behind a per-session
/// mutex; the pipeline orchestrator takes it mutably for the whole duration
/// of a frame, which serializes the stages per session.
#[derive(Debug)]
pub struct SessionData {
    pub session_id: SessionId,
    pub client_info: ClientInfo,
    pub exercise_type: ExerciseType,
    pub times: SessionTimes,
    pub extended_evaluation: bool,
    pub session_status: SessionStatus,
    pub analyzing_state: AnalyzingState,
    pub history: HistoryData,
    pub last_frame_trace: Option<FrameTrace>,
}

impl SessionData {
    pub fn new(session_id: SessionId, client_info: ClientInfo, exercise_type: ExerciseType) -> Self {
        SessionData {
            session_id,
            client_info,
            exercise_type,
            times: SessionTimes {
                registered: Some(Utc::now()),
                ..SessionTimes::default()
            },
            extended_evaluation: false,
            session_status: SessionStatus::Registered,
            analyzing_state: AnalyzingState::Init,
            history: HistoryData::new(),
            last_frame_trace: None,
        }
    }

    pub fn touch(&mut self) {
        self.times.last_activity = Some(Utc::now());
    }

    pub fn begin_frame_trace(&mut self, frame_id: u64) {
        self.last_frame_trace = Some(FrameTrace::new(self.session_id.to_string(), frame_id));
    }

    pub fn trace_event(&mut self, stage: &'static str, success: bool, detail: impl Into<String>) {
        if let Some(trace) = self.last_frame_trace.as_mut() {
            trace.add_event(stage, success, detail);
        }
    }
}
