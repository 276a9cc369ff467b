//! SPDX-License-Identifier: GPL-3.0-or-later

//! The per-frame orchestrator. Dispatches a frame through the stage chain
//! that matches the session's analyzing state and is the only writer to
//! history; detectors see the session read-only. All stages for one frame
//! run synchronously under the session lock held by the caller.

use std::sync::Arc;

use log::{debug, warn};

use crate::config::ConfigSet;
use crate::detect;
use crate::error::ErrorCode;
use crate::extract::PoseExtractor;
use crate::feedback::{self, FeedbackCode};
use crate::frame::FrameData;
use crate::history::HistoryWriter;
use crate::joints;
use crate::landmarks::PoseLandmarks;
use crate::phase;
use crate::quality::{self, PoseQuality};
use crate::response::{AnalysisOutcome, CalibrationCode};
use crate::session::{AnalyzingState, SessionData};
use crate::side;
use crate::trace::TraceWriter;

pub struct PipelineProcessor {
    extractor: Arc<dyn PoseExtractor>,
    trace_writer: Arc<TraceWriter>,
}

impl PipelineProcessor {
    pub fn new(extractor: Arc<dyn PoseExtractor>, trace_writer: Arc<TraceWriter>) -> Self {
        PipelineProcessor {
            extractor,
            trace_writer,
        }
    }

    /// Stamps the exercise start when the session transitions to ACTIVE.
    pub fn start(&self, config: &ConfigSet, session: &mut SessionData) {
        let mut writer = HistoryWriter::new(&mut session.history, &config.settings.history);
        if let Err(code) = writer.mark_exercise_start() {
            warn!("start for {}: {code}", session.session_id);
        }
    }

    pub fn pause(&self, config: &ConfigSet, session: &mut SessionData) {
        let mut writer = HistoryWriter::new(&mut session.history, &config.settings.history);
        if let Err(code) = writer.pause_session() {
            warn!("pause for {}: {code}", session.session_id);
        }
    }

    pub fn resume(&self, config: &ConfigSet, session: &mut SessionData) {
        let mut writer = HistoryWriter::new(&mut session.history, &config.settings.history);
        if let Err(code) = writer.resume_session() {
            warn!("resume for {}: {code}", session.session_id);
        }
    }

    /// Stamps the exercise end and finalizes open phase and rep records.
    pub fn end(&self, config: &ConfigSet, session: &mut SessionData) {
        let mut writer = HistoryWriter::new(&mut session.history, &config.settings.history);
        if let Err(code) = writer.mark_exercise_end() {
            warn!("end for {}: {code}", session.session_id);
        }
    }

    /// Runs one frame through the pipeline slice selected by the analyzing
    /// state. The caller holds the per-session lock.
    pub fn analyze_frame(
        &self,
        config: &ConfigSet,
        session: &mut SessionData,
        frame: &FrameData,
    ) -> Result<AnalysisOutcome, ErrorCode> {
        frame
            .validate()
            .map_err(|_| ErrorCode::FrameInitialValidationFailed)?;

        session.begin_frame_trace(frame.frame_id);
        let result = match session.analyzing_state {
            AnalyzingState::Init => self.analyze_init(config, session, frame),
            AnalyzingState::Ready => self.analyze_ready(config, session, frame),
            AnalyzingState::Active => self.analyze_active(config, session, frame),
            AnalyzingState::Done => Err(ErrorCode::TryingToAnalyzeFrameWhenDone),
            AnalyzingState::Failure => Err(ErrorCode::TryingToAnalyzeFrameWhenFailed),
        };

        if let Some(trace) = session.last_frame_trace.as_ref() {
            self.trace_writer.write(trace);
        }
        result
    }

    fn extract(
        &self,
        session: &mut SessionData,
        frame: &FrameData,
    ) -> Result<PoseLandmarks, ErrorCode> {
        match self.extractor.extract(frame) {
            Ok(landmarks) => {
                session.trace_event("PoseExtractor", true, "33x4 matrix");
                Ok(landmarks)
            }
            Err(code) => {
                session.trace_event("PoseExtractor", false, code.description());
                Err(code)
            }
        }
    }

    /// INIT: only visibility matters. A streak of OK frames moves the
    /// session to READY.
    fn analyze_init(
        &self,
        config: &ConfigSet,
        session: &mut SessionData,
        frame: &FrameData,
    ) -> Result<AnalysisOutcome, ErrorCode> {
        let landmarks = self.extract(session, frame)?;
        let exercise = session.exercise_type;

        let side_result = side::detect_and_validate(
            &config.settings.position_side,
            &landmarks,
            exercise,
        );
        let side_error = match side_result {
            Ok(side) if side.is_unknown() => Some(ErrorCode::PositionSideDoesNotExist),
            Ok(side) => {
                HistoryWriter::new(&mut session.history, &config.settings.history)
                    .set_position_side(side);
                None
            }
            Err(code) => Some(code),
        };
        session.trace_event(
            "PositionSideDetector",
            side_error.is_none(),
            session.history.position_side().name(),
        );

        let pose_quality = quality::evaluate_landmarks(
            &config.settings.pose,
            exercise,
            session.history.position_side(),
            session.extended_evaluation,
            &landmarks,
            session.history.last_valid_frame().map(|f| &f.landmarks),
        );
        session.trace_event("PoseQualityGate", true, pose_quality.name());

        let mut writer = HistoryWriter::new(&mut session.history, &config.settings.history);
        if side_error.is_some() || pose_quality != PoseQuality::Ok {
            writer.reset_consecutive_ok_streak();
            let code = pose_quality
                .to_error_code()
                .or(side_error)
                .unwrap_or(ErrorCode::PositionSideDoesNotExist);
            return Err(code);
        }

        writer.increment_consecutive_ok_streak();
        if session.history.consecutive_ok_frames()
            >= config.settings.session.num_of_min_init_ok_frames
        {
            HistoryWriter::new(&mut session.history, &config.settings.history)
                .set_camera_stable();
            session.analyzing_state = AnalyzingState::Ready;
            debug!("session {} calibrated, visibility valid", session.session_id);
            Ok(AnalysisOutcome::Calibration(
                CalibrationCode::UserVisibilityIsValid,
            ))
        } else {
            Ok(AnalysisOutcome::Calibration(
                CalibrationCode::UserVisibilityIsUnderChecking,
            ))
        }
    }

    /// READY: visibility plus a streak of frames matching the exercise's
    /// initial phase. Completion stores the initial phase and the side, and
    /// moves the session to ACTIVE.
    fn analyze_ready(
        &self,
        config: &ConfigSet,
        session: &mut SessionData,
        frame: &FrameData,
    ) -> Result<AnalysisOutcome, ErrorCode> {
        let landmarks = self.extract(session, frame)?;
        let exercise = session.exercise_type;

        let side_result = side::detect_and_validate(
            &config.settings.position_side,
            &landmarks,
            exercise,
        );
        let (detected_side, side_error) = match side_result {
            Ok(side) if side.is_unknown() => (side, Some(ErrorCode::PositionSideDoesNotExist)),
            Ok(side) => (side, None),
            Err(code) => (session.history.position_side(), Some(code)),
        };
        session.trace_event(
            "PositionSideDetector",
            side_error.is_none(),
            detected_side.name(),
        );

        let pose_quality = quality::evaluate_landmarks(
            &config.settings.pose,
            exercise,
            session.history.position_side(),
            session.extended_evaluation,
            &landmarks,
            session.history.last_valid_frame().map(|f| &f.landmarks),
        );
        session.trace_event("PoseQualityGate", true, pose_quality.name());

        if side_error.is_some() || pose_quality != PoseQuality::Ok {
            HistoryWriter::new(&mut session.history, &config.settings.history)
                .reset_initial_phase_counter();
            let code = pose_quality
                .to_error_code()
                .or(side_error)
                .unwrap_or(ErrorCode::PositionSideDoesNotExist);
            return Err(code);
        }

        let joints = joints::calculate_joints(
            &config.settings.joints,
            exercise,
            &landmarks,
            session.extended_evaluation,
        )
        .inspect_err(|code| {
            session.trace_event("JointAnalyzer", false, code.description());
        })?;
        session.trace_event("JointAnalyzer", true, format!("{} joints", joints.len()));

        let matches = phase::ensure_initial_phase_correct(
            config,
            exercise,
            session.history.position_side(),
            &joints,
        )?;
        session.trace_event("PhaseDetector", true, format!("initial match: {matches}"));

        let mut writer = HistoryWriter::new(&mut session.history, &config.settings.history);
        if matches {
            writer.increment_initial_phase_counter();
        } else {
            writer.reset_initial_phase_counter();
        }

        if session.history.initial_phase_counter()
            >= config.settings.session.num_of_min_init_correct_phase_frames
        {
            let phases = config.phases_for(exercise)?;
            let mut writer =
                HistoryWriter::new(&mut session.history, &config.settings.history);
            writer.set_initial_phase(phases);
            writer.set_position_side(detected_side);
            session.analyzing_state = AnalyzingState::Active;
            debug!("session {} positioned, entering ACTIVE", session.session_id);
            Ok(AnalysisOutcome::Calibration(
                CalibrationCode::UserPositioningIsValid,
            ))
        } else {
            Ok(AnalysisOutcome::Calibration(
                CalibrationCode::UserPositioningIsUnderChecking,
            ))
        }
    }

    /// ACTIVE: the full chain. Quality gate, joints, history record, phase,
    /// error detection, feedback selection with cooldown bookkeeping.
    fn analyze_active(
        &self,
        config: &ConfigSet,
        session: &mut SessionData,
        frame: &FrameData,
    ) -> Result<AnalysisOutcome, ErrorCode> {
        let landmarks = self.extract(session, frame)?;
        let exercise = session.exercise_type;

        let pose_quality = quality::evaluate_landmarks(
            &config.settings.pose,
            exercise,
            session.history.position_side(),
            session.extended_evaluation,
            &landmarks,
            session.history.last_valid_frame().map(|f| &f.landmarks),
        );
        session.trace_event("PoseQualityGate", true, pose_quality.name());

        if pose_quality != PoseQuality::Ok {
            let mut writer =
                HistoryWriter::new(&mut session.history, &config.settings.history);
            writer.record_invalid_frame(frame.frame_id, pose_quality);
            session.trace_event("HistoryWriter", true, "recorded invalid frame");

            let should_abort = {
                let writer =
                    HistoryWriter::new(&mut session.history, &config.settings.history);
                writer.should_abort_session()
            };
            if should_abort {
                session.trace_event("HistoryWriter", true, "abort threshold reached");
                return Err(ErrorCode::SessionShouldAbort);
            }

            let code = self.select_feedback_for_frame(config, session);
            return Ok(AnalysisOutcome::Feedback(code));
        }

        let joints = joints::calculate_joints(
            &config.settings.joints,
            exercise,
            &landmarks,
            session.extended_evaluation,
        )
        .inspect_err(|code| {
            session.trace_event("JointAnalyzer", false, code.description());
        })?;
        session.trace_event("JointAnalyzer", true, format!("{} joints", joints.len()));

        HistoryWriter::new(&mut session.history, &config.settings.history)
            .record_valid_frame(frame.frame_id, &landmarks, &joints);
        session.trace_event("HistoryWriter", true, "recorded valid frame");

        let detected_phase = phase::determine_phase(config, exercise, &session.history)
            .inspect_err(|code| {
                session.trace_event("PhaseDetector", false, code.description());
            })?;
        session.trace_event("PhaseDetector", true, detected_phase.name());

        let phases = config.phases_for(exercise)?;
        HistoryWriter::new(&mut session.history, &config.settings.history)
            .record_phase_transition(phases, detected_phase, frame.frame_id, &joints);

        let detected_error = detect::detect_errors(config, exercise, &session.history)
            .inspect_err(|code| {
                session.trace_event("ErrorDetector", false, code.description());
            })?;
        session.trace_event("ErrorDetector", true, detected_error.name());

        {
            let mut writer =
                HistoryWriter::new(&mut session.history, &config.settings.history);
            if let Err(code) = writer.add_frame_error(detected_error, frame.frame_id) {
                warn!("frame {} vanished from window: {code}", frame.frame_id);
            }
            if detected_error.is_biomechanical() {
                writer.add_error_to_current_rep(detected_error);
            }
        }

        let code = self.select_feedback_for_frame(config, session);
        session.trace_event("FeedbackFormatter", true, format!("{code:?}"));
        Ok(AnalysisOutcome::Feedback(code))
    }

    /// Advances the cooldown counter, runs the selector, and on an actual
    /// emission resets the counter and remembers the code on the current
    /// rep. SILENT and VALID leave the counter growing.
    fn select_feedback_for_frame(
        &self,
        config: &ConfigSet,
        session: &mut SessionData,
    ) -> FeedbackCode {
        HistoryWriter::new(&mut session.history, &config.settings.history)
            .increment_frames_since_last_feedback();
        let code = feedback::select_feedback(&config.settings.feedback, &session.history);
        if !matches!(code, FeedbackCode::Silent | FeedbackCode::Valid) {
            let mut writer = HistoryWriter::new(&mut session.history, &config.settings.history);
            writer.reset_frames_since_last_feedback();
            writer.record_feedback_notified(code);
        }
        code
    }
}
