//! SPDX-License-Identifier: GPL-3.0-or-later

//! Frame-level technical validation. Stateless and exercise aware: only the
//! landmarks the current exercise needs are checked, filtered by the detected
//! camera side, and temporal comparisons read the previous accepted frame
//! from history instead of internal state.

use serde::Serialize;

use crate::config::PoseSettings;
use crate::error::ErrorCode;
use crate::exercise::{ExerciseType, PositionSide};
use crate::landmarks::PoseLandmarks;

/// Quality verdict for one frame. Everything except `Ok` is a hard failure
/// for the frame, not a coaching decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoseQuality {
    Ok,
    NoPerson,
    PartialBody,
    TooFar,
    Unstable,
}

impl PoseQuality {
    /// The invalid kinds, in streak-table order.
    pub const INVALID_KINDS: [PoseQuality; 4] = [
        PoseQuality::NoPerson,
        PoseQuality::PartialBody,
        PoseQuality::TooFar,
        PoseQuality::Unstable,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PoseQuality::Ok => "OK",
            PoseQuality::NoPerson => "NO_PERSON",
            PoseQuality::PartialBody => "PARTIAL_BODY",
            PoseQuality::TooFar => "TOO_FAR",
            PoseQuality::Unstable => "UNSTABLE",
        }
    }

    /// Calibration-stage error code for a failed frame.
    pub fn to_error_code(self) -> Option<ErrorCode> {
        match self {
            PoseQuality::Ok => None,
            PoseQuality::NoPerson => Some(ErrorCode::NoPersonDetectedInFrame),
            PoseQuality::PartialBody => Some(ErrorCode::PartialBodyInFrame),
            PoseQuality::TooFar => Some(ErrorCode::TooFarInFrame),
            PoseQuality::Unstable => Some(ErrorCode::UnstableInFrame),
        }
    }
}

/// Classifies one landmark matrix. Decisions run in order, first match wins:
///
/// 1. Degenerate bounding box -> NO_PERSON.
/// 2. Small box and poor required-landmark visibility -> TOO_FAR.
/// 3. Adequate box but poor visibility -> PARTIAL_BODY.
/// 4. Large mean displacement versus the previous accepted frame -> UNSTABLE.
/// 5. Otherwise OK. Without a previous frame the stability check is skipped.
pub fn evaluate_landmarks(
    settings: &PoseSettings,
    exercise: ExerciseType,
    side: PositionSide,
    extended_evaluation: bool,
    landmarks: &PoseLandmarks,
    previous: Option<&PoseLandmarks>,
) -> PoseQuality {
    let area = landmarks.bbox_area();
    if area <= settings.minimum_bbox_area {
        return PoseQuality::NoPerson;
    }

    let required = exercise.required_landmark_indices(side, extended_evaluation);
    let visible = required
        .iter()
        .filter(|&&index| landmarks.visibility(index) >= settings.visibility_good_threshold)
        .count();
    let visibility_ratio = visible as f32 / required.len() as f32;

    if visibility_ratio < settings.required_visibility_ratio {
        if area < settings.bbox_too_far {
            return PoseQuality::TooFar;
        }
        return PoseQuality::PartialBody;
    }

    if let Some(previous) = previous {
        if landmarks.mean_delta(previous) > settings.stability_threshold {
            return PoseQuality::Unstable;
        }
    }

    PoseQuality::Ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::NUM_LANDMARKS;

    fn settings() -> PoseSettings {
        PoseSettings {
            stability_threshold: 0.15,
            bbox_too_far: 0.1,
            minimum_bbox_area: 0.01,
            visibility_good_threshold: 0.6,
            required_visibility_ratio: 0.7,
            extractor_command: None,
        }
    }

    /// Full body spread over the frame, every landmark visible.
    fn full_body(vis: f32) -> PoseLandmarks {
        let mut rows = [[0.0f32; 4]; NUM_LANDMARKS];
        for (i, row) in rows.iter_mut().enumerate() {
            let t = i as f32 / (NUM_LANDMARKS - 1) as f32;
            *row = [0.3 + 0.4 * t, 0.1 + 0.8 * t, 0.0, vis];
        }
        PoseLandmarks::from_rows(&rows).unwrap()
    }

    /// Tiny cluster of points, as when nobody is in frame.
    fn collapsed() -> PoseLandmarks {
        PoseLandmarks::from_rows(&[[0.5, 0.5, 0.0, 0.9]; NUM_LANDMARKS]).unwrap()
    }

    #[test]
    fn collapsed_pose_is_no_person() {
        let quality = evaluate_landmarks(
            &settings(),
            ExerciseType::Squat,
            PositionSide::Front,
            false,
            &collapsed(),
            None,
        );
        assert_eq!(quality, PoseQuality::NoPerson);
    }

    #[test]
    fn good_frame_without_history_is_ok() {
        let quality = evaluate_landmarks(
            &settings(),
            ExerciseType::Squat,
            PositionSide::Front,
            false,
            &full_body(0.95),
            None,
        );
        assert_eq!(quality, PoseQuality::Ok);
    }

    #[test]
    fn invisible_landmarks_are_partial_body() {
        let quality = evaluate_landmarks(
            &settings(),
            ExerciseType::Squat,
            PositionSide::Front,
            false,
            &full_body(0.2),
            None,
        );
        assert_eq!(quality, PoseQuality::PartialBody);
    }

    #[test]
    fn small_box_with_poor_visibility_is_too_far() {
        // Shrink the body into a small but detectable region and dim the
        // visibility.
        let mut rows = [[0.0f32; 4]; NUM_LANDMARKS];
        for (i, row) in rows.iter_mut().enumerate() {
            let t = i as f32 / (NUM_LANDMARKS - 1) as f32;
            *row = [0.45 + 0.15 * t, 0.45 + 0.30 * t, 0.0, 0.2];
        }
        let lm = PoseLandmarks::from_rows(&rows).unwrap();
        let quality = evaluate_landmarks(
            &settings(),
            ExerciseType::Squat,
            PositionSide::Front,
            false,
            &lm,
            None,
        );
        assert_eq!(quality, PoseQuality::TooFar);
    }

    #[test]
    fn large_jump_is_unstable() {
        let previous = full_body(0.95);
        let mut rows = [[0.0f32; 4]; NUM_LANDMARKS];
        for (i, row) in rows.iter_mut().enumerate() {
            let t = i as f32 / (NUM_LANDMARKS - 1) as f32;
            *row = [0.3 + 0.4 * t, 0.1 + 0.8 * t, 0.0, 0.95];
            row[0] += 0.3; // everything jumped right
        }
        let current = PoseLandmarks::from_rows(&rows).unwrap();
        let quality = evaluate_landmarks(
            &settings(),
            ExerciseType::Squat,
            PositionSide::Front,
            false,
            &current,
            Some(&previous),
        );
        assert_eq!(quality, PoseQuality::Unstable);
    }
}
