//! SPDX-License-Identifier: GPL-3.0-or-later

use serde::Serialize;
use thiserror::Error;

/// Server-level error codes. Every pipeline stage and management operation
/// returns one of these on failure; the HTTP layer serializes the numeric
/// code plus description into the error envelope.
///
/// The discriminants are part of the wire contract and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Error)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration and request validation.
    #[error("Configuration file does not exist.")]
    ConfigurationFileDoesNotExist = 100,
    #[error("Error parsing the configuration JSON file.")]
    ConfigFileParseError = 101,
    #[error("The key sent does not exist in the configuration file.")]
    ConfigParamDoesNotExist = 102,
    #[error("The JSON payload in the request is invalid.")]
    InvalidJsonPayloadInRequest = 103,
    #[error("The request does not contain an exercise type.")]
    MissingExerciseTypeInRequest = 104,
    #[error("The request does not contain a session id.")]
    MissingSessionIdInRequest = 105,
    #[error("The request does not contain session id, frame id and content.")]
    MissingFrameDataInRequest = 106,
    #[error("The provided IP is invalid.")]
    ClientIpIsInvalid = 107,
    #[error("The provided client agent is invalid.")]
    ClientAgentIsInvalid = 108,
    #[error("An internal server error has occurred.")]
    InternalServerError = 109,
    #[error("The recieved frame failed to be decoded.")]
    FrameDecodingFailed = 110,
    #[error("The provided password for termination is incorrect.")]
    TerminationIncorrectPassword = 111,

    // Session management.
    #[error("The provided exercise type is not supported in the system")]
    ExerciseTypeDoesNotExist = 200,
    #[error("The maximum of concurrent clients has reached.")]
    MaxClientReached = 201,
    #[error("The provided session ID is invalid.")]
    InvalidSessionId = 202,
    #[error("The client is not registered to the system.")]
    ClientIsNotRegistered = 203,
    #[error("The client is already registered to the system.")]
    ClientIsAlreadyRegistered = 204,
    #[error("The client is not in an active session.")]
    ClientIsNotActive = 205,
    #[error("The client is already in an active session.")]
    ClientIsAlreadyActive = 206,
    #[error("The client is not in a paused session.")]
    ClientIsNotPaused = 207,
    #[error("The client is already in a paused session.")]
    ClientIsAlreadyPaused = 208,
    #[error("The client is not in an ended session.")]
    ClientIsNotEnded = 209,
    #[error("The client is already in an ended session.")]
    ClientIsAlreadyEnded = 210,
    #[error("The initial validation process of the frame failed.")]
    FrameInitialValidationFailed = 211,
    #[error("Recieved a frame for analysis when the session is already done.")]
    TryingToAnalyzeFrameWhenDone = 212,
    #[error("Recieved a frame for analysis when the session has already failed.")]
    TryingToAnalyzeFrameWhenFailed = 213,
    #[error("The session should be aborted due to reaching maximum number of bad frames.")]
    SessionShouldAbort = 214,
    #[error("The client is not registered in the system.")]
    ClientNotInSystem = 215,
    #[error("The parameter of extended evaluation is not valid.")]
    InvalidExtendedEvaluationParam = 216,

    // Pose extraction.
    #[error("Frame analysis failed")]
    FrameAnalysisError = 300,

    // Joint analyzer.
    #[error("Joint calculation has failed.")]
    JointCalculationError = 400,
    #[error("Too many invalid angles in the provided frame")]
    TooManyInvalidAngles = 401,
    #[error("The angles dictionary is empty.")]
    AnglesDictionaryIsEmpty = 402,

    // History manager.
    #[error("Tried to set exercise start time which already set.")]
    ExerciseStartTimeAlreadySet = 500,
    #[error("Tried to set exercise end time which already set.")]
    ExerciseEndTimeAlreadySet = 501,
    #[error("Internal HistoryManager error")]
    HistoryManagerInternalError = 502,
    #[error("Tried to end the current rep, while it is None")]
    TriedToEndANoneRep = 503,
    #[error("Tried to start a new rep, while there is an active one")]
    TriedToStartRepWhileHaveOne = 504,
    #[error("The provided frame id does not exist in the frames list.")]
    CantFindFrameInFramesWindow = 505,
    #[error("The last valid frame is None (does not exist).")]
    LastValidFrameIsNone = 506,

    // Pose quality gate.
    #[error("No person detected in received frame")]
    NoPersonDetectedInFrame = 600,
    #[error("Only partial body is in frame")]
    PartialBodyInFrame = 601,
    #[error("The person in frame is too far")]
    TooFarInFrame = 602,
    #[error("The frame is unstable")]
    UnstableInFrame = 603,

    // Error detector.
    #[error("Mapping from angle to error code not found.")]
    ErrorDetectorMappingNotFound = 700,
    #[error("Error in ErrorDetector configuration.")]
    ErrorDetectorConfigError = 701,

    // Phase detector.
    #[error("Error with the phase thresholds configuration file.")]
    PhaseThresholdsConfigFileError = 800,
    #[error("No valid frame data found in session for phase detection.")]
    NoValidFrameDataInSession = 801,
    #[error("The phase could not be determined for the provided frame.")]
    PhaseUndeterminedInFrame = 802,
    #[error("The detected phase in the provided frame is None.")]
    PhaseIsNoneInFrame = 803,

    // Summary builder.
    #[error("Failed to create session summary")]
    SummaryManagerCreateError = 900,

    // Position side detector.
    #[error("Failed to detect position side from landmarks.")]
    PositionSideDetectionError = 1000,
    #[error("The detected position side is not suitable for the exercise type.")]
    WrongExercisePosition = 1001,
    #[error("The position side could not be determined.")]
    PositionSideDoesNotExist = 1002,
}

impl ErrorCode {
    /// Numeric wire code.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Human readable description, identical to the `Display` output.
    pub fn description(self) -> String {
        self.to_string()
    }

    /// Critical errors abort startup or terminate request handling; they are
    /// never part of the normal calibration/feedback flow.
    pub fn is_critical(self) -> bool {
        matches!(
            self,
            ErrorCode::ConfigurationFileDoesNotExist
                | ErrorCode::ConfigFileParseError
                | ErrorCode::ConfigParamDoesNotExist
                | ErrorCode::InternalServerError
                | ErrorCode::PhaseThresholdsConfigFileError
                | ErrorCode::ErrorDetectorConfigError
                | ErrorCode::TerminationIncorrectPassword
        )
    }

    /// Quality-domain signals are surfaced as calibration/feedback codes
    /// during INIT and READY, never logged as server faults.
    pub fn is_quality_signal(self) -> bool {
        matches!(
            self,
            ErrorCode::NoPersonDetectedInFrame
                | ErrorCode::PartialBodyInFrame
                | ErrorCode::TooFarInFrame
                | ErrorCode::UnstableInFrame
                | ErrorCode::WrongExercisePosition
                | ErrorCode::PositionSideDoesNotExist
        )
    }
}
