//! SPDX-License-Identifier: GPL-3.0-or-later

//! Feedback selection. One code per frame, chosen from the biomechanical
//! error streaks when the pose is healthy and from the quality streaks when
//! it is not, throttled by the cooldown counter so the user is not flooded.

use serde::Serialize;

use crate::config::FeedbackSettings;
use crate::detect::DetectedErrorCode;
use crate::history::HistoryData;
use crate::quality::PoseQuality;

/// Everything the server may say to the client during an active session.
/// VALID means the movement is currently clean; SILENT holds the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u16)]
pub enum FeedbackCode {
    Valid = 1,
    Silent = 2,

    NoPerson = 3,
    PartialBody = 4,
    TooFar = 5,
    Unstable = 6,

    SquatTopTrunkTooForward = 7,
    SquatTopTrunkTooBackward = 8,
    SquatTopHipLineUnbalanced = 9,
    SquatDownKneeTooStraight = 10,
    SquatDownKneeTooBent = 11,
    SquatDownHipTooStraight = 12,
    SquatDownHipTooBent = 13,
    SquatHoldHipNotDeepEnough = 14,
    SquatHoldHipTooDeep = 15,
    SquatHoldKneeValgus = 16,
    SquatUpKneeCollapse = 17,
    SquatUpTrunkTooForward = 18,
    SquatUpTrunkTooBackward = 19,

    CurlRestElbowTooBent = 20,
    CurlRestElbowTooStraight = 21,
    CurlRestShoulderTooForward = 22,
    CurlRestShoulderTooBackward = 23,
    CurlLiftingElbowTooStraight = 24,
    CurlLiftingElbowTooBent = 25,
    CurlLiftingShoulderTooForward = 26,
    CurlLiftingShoulderTooBackward = 27,
    CurlHoldElbowTooOpen = 28,
    CurlHoldElbowTooClosed = 29,
    CurlHoldWristTooFlexed = 30,
    CurlHoldWristTooExtended = 31,
    CurlLoweringElbowTooStraight = 32,
    CurlLoweringElbowTooBent = 33,
    CurlLoweringShoulderTooForward = 34,
    CurlLoweringShoulderTooBackward = 35,
}

impl FeedbackCode {
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Client-facing message. VALID and SILENT deliberately carry none.
    pub fn description(self) -> &'static str {
        use FeedbackCode::*;
        match self {
            Valid | Silent => "",
            NoPerson => "I can't see you please step into the frame.",
            PartialBody => "Move back a bit. I need to see your full body.",
            TooFar => "You're too far away step closer.",
            Unstable => "The camera view is unstable try holding your position.",
            SquatTopTrunkTooForward => "Keep your chest more upright at the top.",
            SquatTopTrunkTooBackward => "Avoid leaning backward at the top.",
            SquatTopHipLineUnbalanced => "Keep your hips level.",
            SquatDownKneeTooStraight => "Bend your knees more as you go down.",
            SquatDownKneeTooBent => "Don't bend your knees too much on the way down.",
            SquatDownHipTooStraight => "Sit back more into the squat.",
            SquatDownHipTooBent => "Don't drop too quickly into the squat.",
            SquatHoldHipNotDeepEnough => "Go a bit deeper in the squat.",
            SquatHoldHipTooDeep => "You're going too deep rise slightly.",
            SquatHoldKneeValgus => "Keep your knees aligned over your toes.",
            SquatUpKneeCollapse => "Avoid letting your knees collapse inward.",
            SquatUpTrunkTooForward => "Lift your chest as you stand up.",
            SquatUpTrunkTooBackward => "Don't lean backward as you rise.",
            CurlRestElbowTooBent => "Fully extend your arms at the bottom.",
            CurlRestElbowTooStraight => "Maintain slight tension don't lock out.",
            CurlRestShoulderTooForward => "Relax your shoulders don't push them forward.",
            CurlRestShoulderTooBackward => "Keep your shoulders neutral.",
            CurlLiftingElbowTooStraight => "Bend your elbows more as you lift.",
            CurlLiftingElbowTooBent => "Control the lift avoid over-bending.",
            CurlLiftingShoulderTooForward => "Don't swing your shoulders forward.",
            CurlLiftingShoulderTooBackward => "Avoid leaning back during the curl.",
            CurlHoldElbowTooOpen => "Bend your elbows a bit more at the top.",
            CurlHoldElbowTooClosed => "Open your elbows slightly at the top.",
            CurlHoldWristTooFlexed => "Keep your wrists neutral.",
            CurlHoldWristTooExtended => "Avoid bending your wrists backward.",
            CurlLoweringElbowTooStraight => "Lower the weight with control.",
            CurlLoweringElbowTooBent => "Extend your arms more as you lower.",
            CurlLoweringShoulderTooForward => "Don't lean forward while lowering.",
            CurlLoweringShoulderTooBackward => "Control your posture on the way down.",
        }
    }

    pub fn from_pose_quality(quality: PoseQuality) -> FeedbackCode {
        match quality {
            PoseQuality::NoPerson => FeedbackCode::NoPerson,
            PoseQuality::PartialBody => FeedbackCode::PartialBody,
            PoseQuality::TooFar => FeedbackCode::TooFar,
            PoseQuality::Unstable => FeedbackCode::Unstable,
            PoseQuality::Ok => FeedbackCode::Silent,
        }
    }

    pub fn from_detected_error(error: DetectedErrorCode) -> FeedbackCode {
        use DetectedErrorCode as E;
        use FeedbackCode as F;
        match error {
            E::NoBiomechanicalError => F::Valid,
            E::NotReadyForAnalysis => F::Silent,
            E::SquatTopTrunkTooForward => F::SquatTopTrunkTooForward,
            E::SquatTopTrunkTooBackward => F::SquatTopTrunkTooBackward,
            E::SquatTopHipLineUnbalanced => F::SquatTopHipLineUnbalanced,
            E::SquatDownKneeTooStraight => F::SquatDownKneeTooStraight,
            E::SquatDownKneeTooBent => F::SquatDownKneeTooBent,
            E::SquatDownHipTooStraight => F::SquatDownHipTooStraight,
            E::SquatDownHipTooBent => F::SquatDownHipTooBent,
            E::SquatHoldHipNotDeepEnough => F::SquatHoldHipNotDeepEnough,
            E::SquatHoldHipTooDeep => F::SquatHoldHipTooDeep,
            E::SquatHoldKneeValgus => F::SquatHoldKneeValgus,
            E::SquatUpKneeCollapse => F::SquatUpKneeCollapse,
            E::SquatUpTrunkTooForward => F::SquatUpTrunkTooForward,
            E::SquatUpTrunkTooBackward => F::SquatUpTrunkTooBackward,
            E::CurlRestElbowTooBent => F::CurlRestElbowTooBent,
            E::CurlRestElbowTooStraight => F::CurlRestElbowTooStraight,
            E::CurlRestShoulderTooForward => F::CurlRestShoulderTooForward,
            E::CurlRestShoulderTooBackward => F::CurlRestShoulderTooBackward,
            E::CurlLiftingElbowTooStraight => F::CurlLiftingElbowTooStraight,
            E::CurlLiftingElbowTooBent => F::CurlLiftingElbowTooBent,
            E::CurlLiftingShoulderTooForward => F::CurlLiftingShoulderTooForward,
            E::CurlLiftingShoulderTooBackward => F::CurlLiftingShoulderTooBackward,
            E::CurlHoldElbowTooOpen => F::CurlHoldElbowTooOpen,
            E::CurlHoldElbowTooClosed => F::CurlHoldElbowTooClosed,
            E::CurlHoldWristTooFlexed => F::CurlHoldWristTooFlexed,
            E::CurlHoldWristTooExtended => F::CurlHoldWristTooExtended,
            E::CurlLoweringElbowTooStraight => F::CurlLoweringElbowTooStraight,
            E::CurlLoweringElbowTooBent => F::CurlLoweringElbowTooBent,
            E::CurlLoweringShoulderTooForward => F::CurlLoweringShoulderTooForward,
            E::CurlLoweringShoulderTooBackward => F::CurlLoweringShoulderTooBackward,
        }
    }
}

fn cooldown_passed(settings: &FeedbackSettings, history: &HistoryData) -> bool {
    history.frames_since_last_feedback() >= settings.cooldown_frames
}

fn worst_biomechanical(history: &HistoryData) -> Option<(DetectedErrorCode, u32)> {
    // Ties break on the wire code so the choice is deterministic.
    history
        .error_streaks()
        .iter()
        .map(|(&error, &streak)| (error, streak))
        .max_by_key(|&(error, streak)| (streak, error.code()))
}

fn worst_quality(history: &HistoryData) -> Option<PoseQuality> {
    history
        .bad_frame_streaks()
        .iter()
        .map(|(&kind, &streak)| (kind, streak))
        .max_by_key(|&(kind, streak)| (streak, kind.name()))
        .map(|(kind, _)| kind)
}

/// Chooses the feedback code for the current frame. VALID and SILENT defeat
/// the cooldown; any other code is only emitted once the cooldown has
/// elapsed, otherwise SILENT holds the channel.
pub fn select_feedback(settings: &FeedbackSettings, history: &HistoryData) -> FeedbackCode {
    if history.is_state_ok() {
        let Some((worst, streak)) = worst_biomechanical(history) else {
            return FeedbackCode::Silent;
        };
        if streak < settings.bio_feedback_threshold {
            return FeedbackCode::Silent;
        }
        let feedback = FeedbackCode::from_detected_error(worst);
        if matches!(feedback, FeedbackCode::Silent | FeedbackCode::Valid) {
            return feedback;
        }
        if cooldown_passed(settings, history) {
            feedback
        } else {
            FeedbackCode::Silent
        }
    } else {
        if history.frames_since_last_valid() < settings.pose_quality_feedback_threshold {
            return FeedbackCode::Silent;
        }
        let Some(worst) = worst_quality(history) else {
            return FeedbackCode::Silent;
        };
        let feedback = FeedbackCode::from_pose_quality(worst);
        if feedback == FeedbackCode::Silent {
            return feedback;
        }
        if cooldown_passed(settings, history) {
            feedback
        } else {
            FeedbackCode::Silent
        }
    }
}
