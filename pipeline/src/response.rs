//! SPDX-License-Identifier: GPL-3.0-or-later

//! Client-visible response codes and payload fragments. The HTTP layer wraps
//! these into the message envelope; nothing here knows about transport.

use serde::Serialize;
use serde_json::Value;

use crate::detect::DetectedErrorCode;
use crate::error::ErrorCode;
use crate::feedback::FeedbackCode;
use crate::history::Repetition;

/// Session-management outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u16)]
pub enum ManagementCode {
    ClientRegisteredSuccessfully = 1,
    ClientSessionIsRegistered = 2,
    ClientSessionIsActive = 3,
    ClientSessionIsPaused = 4,
    ClientSessionIsResumed = 5,
    ClientSessionIsEnded = 6,
    ClientSessionIsUnregistered = 7,
    ClientSessionIsNotInSystem = 8,
    ServerIsBeingShutdown = 9,
    ConfigurationUpdatedSuccessfully = 10,
}

impl ManagementCode {
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn description(self) -> &'static str {
        use ManagementCode::*;
        match self {
            ClientRegisteredSuccessfully => "The client was registered successfully.",
            ClientSessionIsRegistered => "The client's session is registered.",
            ClientSessionIsActive => "The client's session is active.",
            ClientSessionIsPaused => "The client's session is paused.",
            ClientSessionIsResumed => "The client's session is resumed.",
            ClientSessionIsEnded => "The client's session is ended.",
            ClientSessionIsUnregistered => "The client's session is unregistered.",
            ClientSessionIsNotInSystem => "The client's session is not in the system.",
            ServerIsBeingShutdown => "The server is being shutdown.",
            ConfigurationUpdatedSuccessfully => "The configuration was updated successfully.",
        }
    }
}

/// Calibration progress codes for the INIT and READY analyzing states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u16)]
pub enum CalibrationCode {
    UserVisibilityIsValid = 1,
    UserVisibilityIsUnderChecking = 2,
    UserPositioningIsValid = 3,
    UserPositioningIsUnderChecking = 4,
}

impl CalibrationCode {
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn description(self) -> &'static str {
        use CalibrationCode::*;
        match self {
            UserVisibilityIsValid => "Initial frame visibility checking is valid.",
            UserVisibilityIsUnderChecking => "Initial frame visibility checking is in process.",
            UserPositioningIsValid => "Initial frame positioning checking is valid.",
            UserPositioningIsUnderChecking => "Initial frame positioning checking is in process.",
        }
    }
}

/// What one `analyze_frame` call produced: calibration progress while the
/// session warms up, a feedback code once the full pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisOutcome {
    Calibration(CalibrationCode),
    Feedback(FeedbackCode),
}

/// The end-of-session summary payload.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryResponse {
    pub session_id: String,
    pub exercise_type: String,
    pub session_duration_seconds: f64,
    pub number_of_reps: u32,
    pub average_rep_duration_seconds: f64,
    pub overall_grade: f64,
    pub rep_breakdown: Vec<Repetition>,
    pub aggregated_errors: Vec<AggregatedError>,
    pub recommendations: Vec<String>,
}

/// One entry of the aggregated error table, keyed by the detected error's
/// wire name.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedError {
    pub error: &'static str,
    pub count: u32,
}

impl AggregatedError {
    pub fn new(error: DetectedErrorCode, count: u32) -> Self {
        AggregatedError {
            error: error.name(),
            count,
        }
    }
}

/// A management failure plus optional extra info for the error envelope
/// (for example the session id of an already-registered client).
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub code: ErrorCode,
    pub extra_info: Option<Value>,
}

impl ApiError {
    pub fn with_session_id(code: ErrorCode, session_id: String) -> Self {
        ApiError {
            code,
            extra_info: Some(serde_json::json!({ "session_id": session_id })),
        }
    }
}

impl From<ErrorCode> for ApiError {
    fn from(code: ErrorCode) -> Self {
        ApiError {
            code,
            extra_info: None,
        }
    }
}
