//! SPDX-License-Identifier: GPL-3.0-or-later

//! Biomechanical error detection. Joint angles from the last valid frame are
//! compared against the phase-scoped threshold table; the first out-of-range
//! joint, in document order, maps to a detected error code.

use serde::Serialize;

use crate::config::ConfigSet;
use crate::error::ErrorCode;
use crate::exercise::{ExerciseType, Phase};
use crate::history::HistoryData;

/// Pure biomechanical error codes. Numeric values follow the original wire
/// assignment: squat errors in the 3000 range, curl errors in the 3100 range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u16)]
pub enum DetectedErrorCode {
    SquatTopTrunkTooForward = 3000,
    SquatTopTrunkTooBackward = 3001,
    SquatTopHipLineUnbalanced = 3002,
    SquatDownKneeTooStraight = 3003,
    SquatDownKneeTooBent = 3004,
    SquatDownHipTooStraight = 3005,
    SquatDownHipTooBent = 3006,
    SquatHoldHipNotDeepEnough = 3007,
    SquatHoldHipTooDeep = 3008,
    SquatHoldKneeValgus = 3009,
    SquatUpKneeCollapse = 3010,
    SquatUpTrunkTooForward = 3011,
    SquatUpTrunkTooBackward = 3012,

    CurlRestElbowTooBent = 3100,
    CurlRestElbowTooStraight = 3101,
    CurlRestShoulderTooForward = 3102,
    CurlRestShoulderTooBackward = 3103,
    CurlLiftingElbowTooStraight = 3104,
    CurlLiftingElbowTooBent = 3105,
    CurlLiftingShoulderTooForward = 3106,
    CurlLiftingShoulderTooBackward = 3107,
    CurlHoldElbowTooOpen = 3108,
    CurlHoldElbowTooClosed = 3109,
    CurlHoldWristTooFlexed = 3110,
    CurlHoldWristTooExtended = 3111,
    CurlLoweringElbowTooStraight = 3112,
    CurlLoweringElbowTooBent = 3113,
    CurlLoweringShoulderTooForward = 3114,
    CurlLoweringShoulderTooBackward = 3115,

    NoBiomechanicalError = 3999,
    NotReadyForAnalysis = 4000,
}

impl DetectedErrorCode {
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn name(self) -> &'static str {
        use DetectedErrorCode::*;
        match self {
            SquatTopTrunkTooForward => "SQUAT_TOP_TRUNK_TOO_FORWARD",
            SquatTopTrunkTooBackward => "SQUAT_TOP_TRUNK_TOO_BACKWARD",
            SquatTopHipLineUnbalanced => "SQUAT_TOP_HIP_LINE_UNBALANCED",
            SquatDownKneeTooStraight => "SQUAT_DOWN_KNEE_TOO_STRAIGHT",
            SquatDownKneeTooBent => "SQUAT_DOWN_KNEE_TOO_BENT",
            SquatDownHipTooStraight => "SQUAT_DOWN_HIP_TOO_STRAIGHT",
            SquatDownHipTooBent => "SQUAT_DOWN_HIP_TOO_BENT",
            SquatHoldHipNotDeepEnough => "SQUAT_HOLD_HIP_NOT_DEEP_ENOUGH",
            SquatHoldHipTooDeep => "SQUAT_HOLD_HIP_TOO_DEEP",
            SquatHoldKneeValgus => "SQUAT_HOLD_KNEE_VALGUS",
            SquatUpKneeCollapse => "SQUAT_UP_KNEE_COLLAPSE",
            SquatUpTrunkTooForward => "SQUAT_UP_TRUNK_TOO_FORWARD",
            SquatUpTrunkTooBackward => "SQUAT_UP_TRUNK_TOO_BACKWARD",
            CurlRestElbowTooBent => "CURL_REST_ELBOW_TOO_BENT",
            CurlRestElbowTooStraight => "CURL_REST_ELBOW_TOO_STRAIGHT",
            CurlRestShoulderTooForward => "CURL_REST_SHOULDER_TOO_FORWARD",
            CurlRestShoulderTooBackward => "CURL_REST_SHOULDER_TOO_BACKWARD",
            CurlLiftingElbowTooStraight => "CURL_LIFTING_ELBOW_TOO_STRAIGHT",
            CurlLiftingElbowTooBent => "CURL_LIFTING_ELBOW_TOO_BENT",
            CurlLiftingShoulderTooForward => "CURL_LIFTING_SHOULDER_TOO_FORWARD",
            CurlLiftingShoulderTooBackward => "CURL_LIFTING_SHOULDER_TOO_BACKWARD",
            CurlHoldElbowTooOpen => "CURL_HOLD_ELBOW_TOO_OPEN",
            CurlHoldElbowTooClosed => "CURL_HOLD_ELBOW_TOO_CLOSED",
            CurlHoldWristTooFlexed => "CURL_HOLD_WRIST_TOO_FLEXED",
            CurlHoldWristTooExtended => "CURL_HOLD_WRIST_TOO_EXTENDED",
            CurlLoweringElbowTooStraight => "CURL_LOWERING_ELBOW_TOO_STRAIGHT",
            CurlLoweringElbowTooBent => "CURL_LOWERING_ELBOW_TOO_BENT",
            CurlLoweringShoulderTooForward => "CURL_LOWERING_SHOULDER_TOO_FORWARD",
            CurlLoweringShoulderTooBackward => "CURL_LOWERING_SHOULDER_TOO_BACKWARD",
            NoBiomechanicalError => "NO_BIOMECHANICAL_ERROR",
            NotReadyForAnalysis => "NOT_READY_FOR_ANALYSIS",
        }
    }

    /// True for codes that describe an actual movement fault, as opposed to
    /// the two sentinels.
    pub fn is_biomechanical(self) -> bool {
        !matches!(
            self,
            DetectedErrorCode::NoBiomechanicalError | DetectedErrorCode::NotReadyForAnalysis
        )
    }

    /// Recommendation text used by the session summary.
    pub fn recommendation(self) -> &'static str {
        use DetectedErrorCode::*;
        match self {
            SquatTopTrunkTooForward => "Keep your torso more upright at the top of the squat.",
            SquatTopTrunkTooBackward => {
                "Avoid leaning backward, keep your torso stacked over your hips."
            }
            SquatTopHipLineUnbalanced => {
                "Distribute your weight evenly between both hips at the top position."
            }
            SquatDownKneeTooStraight => "Allow your knees to bend more as you descend.",
            SquatDownKneeTooBent => {
                "Control the descent and avoid collapsing too quickly into the bottom."
            }
            SquatDownHipTooStraight => "Sit back more with your hips as you lower.",
            SquatDownHipTooBent => "Slow the descent and avoid dropping too deep too fast.",
            SquatHoldHipNotDeepEnough => {
                "Lower your hips slightly more to reach proper squat depth."
            }
            SquatHoldHipTooDeep => "Rise slightly and avoid sinking too deep at the bottom.",
            SquatHoldKneeValgus => {
                "Push your knees outward to prevent them from collapsing inward."
            }
            SquatUpKneeCollapse => "Maintain knee alignment as you stand up.",
            SquatUpTrunkTooForward => "Lift your chest as you rise from the squat.",
            SquatUpTrunkTooBackward => "Avoid leaning back, stand up tall and controlled.",
            CurlRestElbowTooBent => "Fully extend your arms at the bottom of the curl.",
            CurlRestElbowTooStraight => "Maintain a slight natural bend in your elbows.",
            CurlRestShoulderTooForward => "Pull your shoulders back and keep them stable.",
            CurlRestShoulderTooBackward => "Relax your shoulders and avoid excessive retraction.",
            CurlLiftingElbowTooStraight => "Bend your elbows more as you lift the weight.",
            CurlLiftingElbowTooBent => "Control the lift and avoid over-curling too early.",
            CurlLiftingShoulderTooForward => "Keep your shoulders back while lifting.",
            CurlLiftingShoulderTooBackward => {
                "Avoid pulling your shoulders backward during the lift."
            }
            CurlHoldElbowTooOpen => "Squeeze more at the top of the curl.",
            CurlHoldElbowTooClosed => "Hold a strong but controlled position at the top.",
            CurlHoldWristTooFlexed => "Keep your wrist neutral and avoid bending it inward.",
            CurlHoldWristTooExtended => "Relax your wrist slightly, avoid bending it backward.",
            CurlLoweringElbowTooStraight => "Control the lowering, do not lock your elbows.",
            CurlLoweringElbowTooBent => "Extend your arms more as you lower the weight.",
            CurlLoweringShoulderTooForward => "Keep your shoulders stable while lowering.",
            CurlLoweringShoulderTooBackward => {
                "Avoid pulling your shoulders backward on the way down."
            }
            NoBiomechanicalError => "No biomechanical issues detected.",
            NotReadyForAnalysis => "Not enough stable data to analyze this repetition.",
        }
    }
}

/// Maps `(exercise, phase, joint, direction)` to a detected error. The table
/// is exhaustive for every joint that may appear in the thresholds file; a
/// `None` here means the thresholds file references a joint this phase has no
/// mapping for, which the detector reports as a configuration error.
pub fn map_error(
    exercise: ExerciseType,
    phase: Phase,
    joint_name: &str,
    is_high: bool,
) -> Option<DetectedErrorCode> {
    use DetectedErrorCode::*;
    let low_high = |low, high| if is_high { high } else { low };
    match (exercise, phase, joint_name) {
        (ExerciseType::Squat, Phase::Top, "trunk_tilt_angle") => {
            Some(low_high(SquatTopTrunkTooForward, SquatTopTrunkTooBackward))
        }
        (ExerciseType::Squat, Phase::Top, "hip_line_angle") => Some(SquatTopHipLineUnbalanced),
        (ExerciseType::Squat, Phase::Down, "left_knee_angle" | "right_knee_angle") => {
            Some(low_high(SquatDownKneeTooStraight, SquatDownKneeTooBent))
        }
        (ExerciseType::Squat, Phase::Down, "left_hip_angle" | "right_hip_angle") => {
            Some(low_high(SquatDownHipTooStraight, SquatDownHipTooBent))
        }
        (ExerciseType::Squat, Phase::Hold, "left_hip_angle" | "right_hip_angle") => {
            Some(low_high(SquatHoldHipNotDeepEnough, SquatHoldHipTooDeep))
        }
        (ExerciseType::Squat, Phase::Hold, "knee_valgus_angle") => Some(SquatHoldKneeValgus),
        (ExerciseType::Squat, Phase::Up, "left_knee_angle" | "right_knee_angle") => {
            Some(SquatUpKneeCollapse)
        }
        (ExerciseType::Squat, Phase::Up, "trunk_tilt_angle") => {
            Some(low_high(SquatUpTrunkTooForward, SquatUpTrunkTooBackward))
        }
        (ExerciseType::BicepsCurl, Phase::Rest, "left_elbow_angle" | "right_elbow_angle") => {
            Some(low_high(CurlRestElbowTooBent, CurlRestElbowTooStraight))
        }
        (
            ExerciseType::BicepsCurl,
            Phase::Rest,
            "left_shoulder_flexion_angle" | "right_shoulder_flexion_angle",
        ) => Some(low_high(
            CurlRestShoulderTooBackward,
            CurlRestShoulderTooForward,
        )),
        (ExerciseType::BicepsCurl, Phase::Lifting, "left_elbow_angle" | "right_elbow_angle") => {
            Some(low_high(CurlLiftingElbowTooStraight, CurlLiftingElbowTooBent))
        }
        (
            ExerciseType::BicepsCurl,
            Phase::Lifting,
            "left_shoulder_flexion_angle" | "right_shoulder_flexion_angle",
        ) => Some(low_high(
            CurlLiftingShoulderTooBackward,
            CurlLiftingShoulderTooForward,
        )),
        (ExerciseType::BicepsCurl, Phase::Hold, "left_elbow_angle" | "right_elbow_angle") => {
            Some(low_high(CurlHoldElbowTooClosed, CurlHoldElbowTooOpen))
        }
        (ExerciseType::BicepsCurl, Phase::Hold, "left_wrist_angle" | "right_wrist_angle") => {
            Some(low_high(CurlHoldWristTooFlexed, CurlHoldWristTooExtended))
        }
        (ExerciseType::BicepsCurl, Phase::Lowering, "left_elbow_angle" | "right_elbow_angle") => {
            Some(low_high(
                CurlLoweringElbowTooStraight,
                CurlLoweringElbowTooBent,
            ))
        }
        (
            ExerciseType::BicepsCurl,
            Phase::Lowering,
            "left_shoulder_flexion_angle" | "right_shoulder_flexion_angle",
        ) => Some(low_high(
            CurlLoweringShoulderTooBackward,
            CurlLoweringShoulderTooForward,
        )),
        _ => None,
    }
}

/// Runs the detector against the last valid frame recorded in history.
///
/// NOT_READY_FOR_ANALYSIS is returned whenever history cannot vouch for the
/// newest frame; it is a sentinel, not a server fault.
pub fn detect_errors(
    config: &ConfigSet,
    exercise: ExerciseType,
    history: &HistoryData,
) -> Result<DetectedErrorCode, ErrorCode> {
    if !history.is_state_ok() || !history.is_last_frame_actually_valid() {
        return Ok(DetectedErrorCode::NotReadyForAnalysis);
    }

    let phase = history
        .phase_state()
        .ok_or(ErrorCode::PhaseIsNoneInFrame)?;
    let frame = history
        .last_valid_frame()
        .ok_or(ErrorCode::LastValidFrameIsNone)?;
    if frame.joints.is_empty() {
        return Err(ErrorCode::AnglesDictionaryIsEmpty);
    }

    let thresholds = config.error_thresholds_for(exercise, phase)?;
    for (joint_name, range) in thresholds {
        let Some(Some(value)) = frame.joints.get(joint_name).copied() else {
            continue;
        };
        if value.is_nan() {
            continue;
        }
        if value < range.min {
            return map_error(exercise, phase, joint_name, false)
                .ok_or(ErrorCode::ErrorDetectorMappingNotFound);
        }
        if value > range.max {
            return map_error(exercise, phase, joint_name, true)
                .ok_or(ErrorCode::ErrorDetectorMappingNotFound);
        }
    }

    Ok(DetectedErrorCode::NoBiomechanicalError)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_covers_both_directions() {
        assert_eq!(
            map_error(ExerciseType::Squat, Phase::Down, "left_knee_angle", false),
            Some(DetectedErrorCode::SquatDownKneeTooStraight)
        );
        assert_eq!(
            map_error(ExerciseType::Squat, Phase::Down, "left_knee_angle", true),
            Some(DetectedErrorCode::SquatDownKneeTooBent)
        );
    }

    #[test]
    fn mapping_is_phase_scoped() {
        // Knee angles have no TOP mapping.
        assert_eq!(
            map_error(ExerciseType::Squat, Phase::Top, "left_knee_angle", true),
            None
        );
    }

    #[test]
    fn sentinels_are_not_biomechanical() {
        assert!(!DetectedErrorCode::NoBiomechanicalError.is_biomechanical());
        assert!(!DetectedErrorCode::NotReadyForAnalysis.is_biomechanical());
        assert!(DetectedErrorCode::SquatHoldKneeValgus.is_biomechanical());
    }

    #[test]
    fn wire_codes_follow_original_ranges() {
        assert_eq!(DetectedErrorCode::SquatTopTrunkTooForward.code(), 3000);
        assert_eq!(DetectedErrorCode::CurlRestElbowTooBent.code(), 3100);
        assert_eq!(DetectedErrorCode::NoBiomechanicalError.code(), 3999);
    }
}
