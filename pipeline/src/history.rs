//! SPDX-License-Identifier: GPL-3.0-or-later

//! Per-session temporal state. [`HistoryData`] is a passive store with read
//! accessors; every mutation goes through [`HistoryWriter`], which the
//! pipeline orchestrator constructs for the duration of one frame. Detectors
//! only ever see `&HistoryData`.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use log::warn;
use serde::Serialize;

use crate::config::{ExercisePhases, HistorySettings};
use crate::detect::DetectedErrorCode;
use crate::error::ErrorCode;
use crate::exercise::{Phase, PositionSide};
use crate::feedback::FeedbackCode;
use crate::joints::CalculatedJoints;
use crate::landmarks::PoseLandmarks;
use crate::quality::PoseQuality;

/// A valid frame accepted into the rolling window.
#[derive(Debug, Clone)]
pub struct FrameRecord {
    pub frame_id: u64,
    pub timestamp: DateTime<Utc>,
    pub landmarks: PoseLandmarks,
    pub joints: CalculatedJoints,
    pub errors: Vec<DetectedErrorCode>,
}

/// An invalid frame kept in the bounded bad-frames log.
#[derive(Debug, Clone)]
pub struct BadFrameRecord {
    pub frame_id: u64,
    pub timestamp: DateTime<Utc>,
    pub reason: PoseQuality,
}

/// An observed movement-phase change.
#[derive(Debug, Clone)]
pub struct TransitionRecord {
    pub phase_from: Phase,
    pub phase_to: Phase,
    pub timestamp: DateTime<Utc>,
    pub frame_id: u64,
    pub joints: CalculatedJoints,
}

/// A finished stay in one phase. `frame_end` is absent when the session
/// closed while the phase was still open.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseDurationRecord {
    pub phase: Phase,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
    pub frame_start: u64,
    pub frame_end: Option<u64>,
}

/// One completed repetition.
#[derive(Debug, Clone, Serialize)]
pub struct Repetition {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
    pub is_correct: bool,
    pub errors: Vec<DetectedErrorCode>,
}

/// The repetition currently in progress.
#[derive(Debug, Clone)]
pub struct CurrentRep {
    pub start_time: DateTime<Utc>,
    pub has_error: bool,
    pub errors: Vec<DetectedErrorCode>,
    pub notified: HashSet<FeedbackCode>,
}

/// Rolling per-session state. Created eagerly with the session, mutated only
/// through [`HistoryWriter`].
#[derive(Debug, Clone)]
pub struct HistoryData {
    frames: VecDeque<FrameRecord>,
    last_valid_frame: Option<FrameRecord>,
    consecutive_ok_frames: u32,

    phase_state: Option<Phase>,
    phase_transitions: Vec<TransitionRecord>,
    phase_durations: Vec<PhaseDurationRecord>,
    current_transition_index: usize,

    bad_frame_counters: HashMap<PoseQuality, u32>,
    bad_frame_streaks: HashMap<PoseQuality, u32>,
    bad_frames_log: VecDeque<BadFrameRecord>,
    frames_since_last_valid: u32,

    initial_phase_counter: u32,

    error_counters: HashMap<DetectedErrorCode, u32>,
    error_streaks: HashMap<DetectedErrorCode, u32>,

    rep_count: u32,
    repetitions: Vec<Repetition>,
    current_rep: Option<CurrentRep>,

    exercise_start_time: Option<DateTime<Utc>>,
    exercise_end_time: Option<DateTime<Utc>>,
    pause_session_timestamp: Option<DateTime<Utc>>,
    pauses_durations: f64,
    exercise_final_duration: Option<f64>,

    frames_since_last_feedback: u32,
    low_motion_streak: u32,
    is_camera_stable: bool,
    position_side: PositionSide,
}

impl Default for HistoryData {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryData {
    pub fn new() -> Self {
        let zero_qualities = PoseQuality::INVALID_KINDS
            .iter()
            .map(|&kind| (kind, 0))
            .collect::<HashMap<_, _>>();
        HistoryData {
            frames: VecDeque::new(),
            last_valid_frame: None,
            consecutive_ok_frames: 0,
            phase_state: None,
            phase_transitions: Vec::new(),
            phase_durations: Vec::new(),
            current_transition_index: 0,
            bad_frame_counters: zero_qualities.clone(),
            bad_frame_streaks: zero_qualities,
            bad_frames_log: VecDeque::new(),
            frames_since_last_valid: 0,
            initial_phase_counter: 0,
            error_counters: HashMap::new(),
            error_streaks: HashMap::new(),
            rep_count: 0,
            repetitions: Vec::new(),
            current_rep: None,
            exercise_start_time: None,
            exercise_end_time: None,
            pause_session_timestamp: None,
            pauses_durations: 0.0,
            exercise_final_duration: None,
            // Saturated means "never notified": the first eligible feedback
            // is not held back by the cooldown.
            frames_since_last_feedback: u32::MAX,
            low_motion_streak: 0,
            is_camera_stable: true,
            position_side: PositionSide::Unknown,
        }
    }

    /// The session state is OK when the newest frame was valid and the
    /// camera has not been flagged unstable.
    pub fn is_state_ok(&self) -> bool {
        self.frames_since_last_valid == 0 && self.is_camera_stable
    }

    /// Whether `last_valid_frame` is also the newest recorded frame. During
    /// recovery the window can hold newer frames that have not yet been
    /// promoted to `last_valid_frame`.
    pub fn is_last_frame_actually_valid(&self) -> bool {
        match (&self.last_valid_frame, self.frames.back()) {
            (Some(valid), Some(newest)) => valid.frame_id == newest.frame_id,
            _ => false,
        }
    }

    pub fn last_valid_frame(&self) -> Option<&FrameRecord> {
        self.last_valid_frame.as_ref()
    }

    pub fn frames(&self) -> &VecDeque<FrameRecord> {
        &self.frames
    }

    pub fn bad_frames_log(&self) -> &VecDeque<BadFrameRecord> {
        &self.bad_frames_log
    }

    pub fn consecutive_ok_frames(&self) -> u32 {
        self.consecutive_ok_frames
    }

    pub fn phase_state(&self) -> Option<Phase> {
        self.phase_state
    }

    pub fn phase_transitions(&self) -> &[TransitionRecord] {
        &self.phase_transitions
    }

    pub fn phase_durations(&self) -> &[PhaseDurationRecord] {
        &self.phase_durations
    }

    pub fn current_transition_index(&self) -> usize {
        self.current_transition_index
    }

    pub fn frames_since_last_valid(&self) -> u32 {
        self.frames_since_last_valid
    }

    pub fn bad_frame_counters(&self) -> &HashMap<PoseQuality, u32> {
        &self.bad_frame_counters
    }

    pub fn bad_frame_streaks(&self) -> &HashMap<PoseQuality, u32> {
        &self.bad_frame_streaks
    }

    pub fn initial_phase_counter(&self) -> u32 {
        self.initial_phase_counter
    }

    pub fn error_counters(&self) -> &HashMap<DetectedErrorCode, u32> {
        &self.error_counters
    }

    pub fn error_streaks(&self) -> &HashMap<DetectedErrorCode, u32> {
        &self.error_streaks
    }

    pub fn rep_count(&self) -> u32 {
        self.rep_count
    }

    pub fn repetitions(&self) -> &[Repetition] {
        &self.repetitions
    }

    pub fn current_rep(&self) -> Option<&CurrentRep> {
        self.current_rep.as_ref()
    }

    pub fn frames_since_last_feedback(&self) -> u32 {
        self.frames_since_last_feedback
    }

    pub fn low_motion_streak(&self) -> u32 {
        self.low_motion_streak
    }

    pub fn is_camera_stable(&self) -> bool {
        self.is_camera_stable
    }

    pub fn position_side(&self) -> PositionSide {
        self.position_side
    }

    pub fn exercise_start_time(&self) -> Option<DateTime<Utc>> {
        self.exercise_start_time
    }

    pub fn exercise_end_time(&self) -> Option<DateTime<Utc>> {
        self.exercise_end_time
    }

    pub fn pause_session_timestamp(&self) -> Option<DateTime<Utc>> {
        self.pause_session_timestamp
    }

    pub fn pauses_durations(&self) -> f64 {
        self.pauses_durations
    }

    pub fn exercise_final_duration(&self) -> Option<f64> {
        self.exercise_final_duration
    }
}

/// The single mutation entry point for history. Constructed by the pipeline
/// orchestrator per frame or per lifecycle call; everything else reads.
pub struct HistoryWriter<'a> {
    history: &'a mut HistoryData,
    settings: &'a HistorySettings,
}

impl<'a> HistoryWriter<'a> {
    pub fn new(history: &'a mut HistoryData, settings: &'a HistorySettings) -> Self {
        HistoryWriter { history, settings }
    }

    /// Records an accepted frame. The frame always enters the rolling window
    /// and always clears `frames_since_last_valid`; promotion to
    /// `last_valid_frame` and the reset of bad-frame bookkeeping wait until
    /// the OK streak reaches the recovery threshold.
    pub fn record_valid_frame(
        &mut self,
        frame_id: u64,
        landmarks: &PoseLandmarks,
        joints: &CalculatedJoints,
    ) {
        let record = FrameRecord {
            frame_id,
            timestamp: Utc::now(),
            landmarks: landmarks.clone(),
            joints: joints.clone(),
            errors: Vec::new(),
        };

        self.history.frames.push_back(record.clone());
        while self.history.frames.len() > self.settings.frames_rolling_window_size {
            self.history.frames.pop_front();
        }

        self.history.consecutive_ok_frames += 1;
        self.history.frames_since_last_valid = 0;

        if self.history.consecutive_ok_frames < self.settings.recovery_ok_threshold {
            return;
        }

        self.history.is_camera_stable = true;
        self.update_low_motion_streak(joints);
        self.history.last_valid_frame = Some(record);
        for value in self.history.bad_frame_counters.values_mut() {
            *value = 0;
        }
        for value in self.history.bad_frame_streaks.values_mut() {
            *value = 0;
        }
    }

    /// Records a rejected frame: exactly one quality-kind streak grows while
    /// the others reset, and the OK streak breaks.
    pub fn record_invalid_frame(&mut self, frame_id: u64, reason: PoseQuality) {
        debug_assert!(reason != PoseQuality::Ok);

        self.history.bad_frames_log.push_back(BadFrameRecord {
            frame_id,
            timestamp: Utc::now(),
            reason,
        });
        while self.history.bad_frames_log.len() > self.settings.bad_frame_log_size {
            self.history.bad_frames_log.pop_front();
        }

        *self.history.bad_frame_counters.entry(reason).or_insert(0) += 1;
        self.history.frames_since_last_valid += 1;
        for (&kind, streak) in self.history.bad_frame_streaks.iter_mut() {
            if kind == reason {
                *streak += 1;
            } else {
                *streak = 0;
            }
        }
        self.history.consecutive_ok_frames = 0;

        if self.history.bad_frame_streaks[&reason] >= self.settings.bad_stability_limit {
            warn!("camera flagged unstable after repeated {} frames", reason.name());
            self.history.is_camera_stable = false;
        }
    }

    /// Attaches a detected error to an already-recorded frame and updates
    /// the per-error counters and streaks.
    pub fn add_frame_error(
        &mut self,
        error: DetectedErrorCode,
        frame_id: u64,
    ) -> Result<(), ErrorCode> {
        let frame = self
            .history
            .frames
            .iter_mut()
            .rev()
            .find(|f| f.frame_id == frame_id)
            .ok_or(ErrorCode::CantFindFrameInFramesWindow)?;
        frame.errors.push(error);
        if let Some(valid) = self.history.last_valid_frame.as_mut() {
            if valid.frame_id == frame_id {
                valid.errors.push(error);
            }
        }

        *self.history.error_counters.entry(error).or_insert(0) += 1;

        let streak = self.history.error_streaks.get(&error).copied().unwrap_or(0) + 1;
        for value in self.history.error_streaks.values_mut() {
            *value = 0;
        }
        self.history.error_streaks.insert(error, streak);
        Ok(())
    }

    /// Stores the configured initial phase once calibration completes.
    pub fn set_initial_phase(&mut self, phases: &ExercisePhases) {
        self.history.phase_state = Some(phases.initial_phase);
    }

    pub fn set_position_side(&mut self, side: PositionSide) {
        self.history.position_side = side;
    }

    /// Records a phase change, driving rep progression along the configured
    /// transition order. No event is recorded when the phase is unchanged;
    /// the first phase ever seen is stored without a transition.
    pub fn record_phase_transition(
        &mut self,
        phases: &ExercisePhases,
        new_phase: Phase,
        frame_id: u64,
        joints: &CalculatedJoints,
    ) {
        let Some(old_phase) = self.history.phase_state else {
            self.history.phase_state = Some(new_phase);
            return;
        };
        if new_phase == old_phase {
            return;
        }

        let order = &phases.transition_order;
        let initial_phase = phases.initial_phase;
        let index = self.history.current_transition_index;
        let next_phase = order.get(index + 1).copied();

        if Some(new_phase) == next_phase && new_phase != initial_phase {
            // Correct progression. Leaving the initial phase opens a rep.
            if index == 0 {
                self.start_a_new_rep();
            }
            self.history.current_transition_index += 1;
        } else if new_phase == initial_phase && index != 0 {
            // Cycle completed.
            self.end_current_rep();
            self.history.current_transition_index = 0;
        } else {
            // Invalid jump: reset rep tracking without closing a rep.
            self.history.current_transition_index = 0;
        }

        let now = Utc::now();
        if let Some(last) = self.history.phase_transitions.last() {
            let duration = (now - last.timestamp).num_milliseconds() as f64 / 1000.0;
            self.history.phase_durations.push(PhaseDurationRecord {
                phase: old_phase,
                start_time: last.timestamp,
                end_time: now,
                duration_seconds: duration,
                frame_start: last.frame_id,
                frame_end: Some(frame_id),
            });
        }

        self.history.phase_transitions.push(TransitionRecord {
            phase_from: old_phase,
            phase_to: new_phase,
            timestamp: now,
            frame_id,
            joints: joints.clone(),
        });
        self.history.phase_state = Some(new_phase);
    }

    fn start_a_new_rep(&mut self) {
        if self.history.current_rep.is_some() {
            warn!("tried to start a rep while one is open");
            return;
        }
        self.history.current_rep = Some(CurrentRep {
            start_time: Utc::now(),
            has_error: false,
            errors: Vec::new(),
            notified: HashSet::new(),
        });
    }

    fn end_current_rep(&mut self) {
        let Some(rep) = self.history.current_rep.take() else {
            warn!("tried to end a rep while none is open");
            return;
        };
        let end_time = Utc::now();
        self.history.repetitions.push(Repetition {
            start_time: rep.start_time,
            end_time,
            duration_seconds: (end_time - rep.start_time).num_milliseconds() as f64 / 1000.0,
            is_correct: !rep.has_error,
            errors: rep.errors,
        });
        self.history.rep_count += 1;
    }

    pub fn add_error_to_current_rep(&mut self, error: DetectedErrorCode) {
        let Some(rep) = self.history.current_rep.as_mut() else {
            return;
        };
        rep.has_error = true;
        rep.errors.push(error);
    }

    pub fn record_feedback_notified(&mut self, feedback: FeedbackCode) {
        if let Some(rep) = self.history.current_rep.as_mut() {
            rep.notified.insert(feedback);
        }
    }

    pub fn mark_exercise_start(&mut self) -> Result<(), ErrorCode> {
        if self.history.exercise_start_time.is_some() {
            return Err(ErrorCode::ExerciseStartTimeAlreadySet);
        }
        self.history.exercise_start_time = Some(Utc::now());
        Ok(())
    }

    /// Stamps the exercise end: closes any open pause, computes the final
    /// duration net of pauses, finalizes the open phase and the open rep.
    /// An open rep cut short by the session end is not correct.
    pub fn mark_exercise_end(&mut self) -> Result<(), ErrorCode> {
        if self.history.exercise_end_time.is_some() {
            return Err(ErrorCode::ExerciseEndTimeAlreadySet);
        }
        let end = Utc::now();
        self.history.exercise_end_time = Some(end);

        if let Some(paused_at) = self.history.pause_session_timestamp.take() {
            self.history.pauses_durations +=
                (end - paused_at).num_milliseconds() as f64 / 1000.0;
        }

        if let Some(started_at) = self.history.exercise_start_time {
            let total = (end - started_at).num_milliseconds() as f64 / 1000.0;
            self.history.exercise_final_duration =
                Some(total - self.history.pauses_durations);
        }

        if let Some(last) = self.history.phase_transitions.last() {
            self.history.phase_durations.push(PhaseDurationRecord {
                phase: last.phase_to,
                start_time: last.timestamp,
                end_time: end,
                duration_seconds: (end - last.timestamp).num_milliseconds() as f64 / 1000.0,
                frame_start: last.frame_id,
                frame_end: None,
            });
        }

        if let Some(rep) = self.history.current_rep.take() {
            self.history.repetitions.push(Repetition {
                start_time: rep.start_time,
                end_time: end,
                duration_seconds: (end - rep.start_time).num_milliseconds() as f64 / 1000.0,
                is_correct: false,
                errors: rep.errors,
            });
            self.history.rep_count += 1;
        }
        Ok(())
    }

    pub fn pause_session(&mut self) -> Result<(), ErrorCode> {
        if self.history.pause_session_timestamp.is_some() {
            return Err(ErrorCode::HistoryManagerInternalError);
        }
        self.history.pause_session_timestamp = Some(Utc::now());
        Ok(())
    }

    pub fn resume_session(&mut self) -> Result<(), ErrorCode> {
        let paused_at = self
            .history
            .pause_session_timestamp
            .take()
            .ok_or(ErrorCode::HistoryManagerInternalError)?;
        self.history.pauses_durations +=
            (Utc::now() - paused_at).num_milliseconds() as f64 / 1000.0;
        Ok(())
    }

    pub fn should_abort_session(&self) -> bool {
        self.history.frames_since_last_valid >= self.settings.max_consecutive_invalid_before_abort
    }

    pub fn increment_consecutive_ok_streak(&mut self) {
        self.history.consecutive_ok_frames += 1;
    }

    pub fn reset_consecutive_ok_streak(&mut self) {
        self.history.consecutive_ok_frames = 0;
    }

    pub fn increment_initial_phase_counter(&mut self) {
        self.history.initial_phase_counter += 1;
    }

    pub fn reset_initial_phase_counter(&mut self) {
        self.history.initial_phase_counter = 0;
    }

    pub fn increment_frames_since_last_feedback(&mut self) {
        self.history.frames_since_last_feedback =
            self.history.frames_since_last_feedback.saturating_add(1);
    }

    pub fn reset_frames_since_last_feedback(&mut self) {
        self.history.frames_since_last_feedback = 0;
    }

    pub fn set_camera_stable(&mut self) {
        self.history.is_camera_stable = true;
    }

    /// Average absolute joint-angle delta versus the previous valid frame;
    /// small deltas extend the low-motion streak that gates HOLD phases.
    fn update_low_motion_streak(&mut self, joints: &CalculatedJoints) {
        let Some(previous) = self.history.last_valid_frame.as_ref() else {
            self.history.low_motion_streak = 0;
            return;
        };
        let mut deltas = Vec::new();
        for (name, value) in joints {
            if let (Some(current), Some(Some(prev))) = (value, previous.joints.get(name)) {
                deltas.push((current - prev).abs());
            }
        }
        if deltas.is_empty() {
            self.history.low_motion_streak = 0;
            return;
        }
        let motion_score = deltas.iter().sum::<f64>() / deltas.len() as f64;
        if motion_score <= self.settings.low_motion_angle_degrees_threshold as f64 {
            self.history.low_motion_streak += 1;
        } else {
            self.history.low_motion_streak = 0;
        }
    }
}
