//! SPDX-License-Identifier: GPL-3.0-or-later

//! Camera-side detection from landmark visibility dominance, plus validation
//! against the sides an exercise accepts.

use crate::config::SideSettings;
use crate::error::ErrorCode;
use crate::exercise::{ExerciseType, PositionSide};
use crate::landmarks::{PoseLandmarks, LEFT_LANDMARKS, RIGHT_LANDMARKS};

fn visibility_ratio(settings: &SideSettings, landmarks: &PoseLandmarks, indices: &[usize]) -> f32 {
    let visible = indices
        .iter()
        .filter(|&&index| landmarks.visibility(index) >= settings.landmark_visibility_threshold)
        .count();
    visible as f32 / indices.len() as f32
}

/// Determines the filming side and validates it against the exercise.
/// UNKNOWN passes through untouched; callers treat it as a not-OK frame.
pub fn detect_and_validate(
    settings: &SideSettings,
    landmarks: &PoseLandmarks,
    exercise: ExerciseType,
) -> Result<PositionSide, ErrorCode> {
    let left = visibility_ratio(settings, landmarks, &LEFT_LANDMARKS);
    let right = visibility_ratio(settings, landmarks, &RIGHT_LANDMARKS);

    // Not enough signal on either side.
    if left.max(right) < settings.min_required_landmark_ratio {
        return Ok(PositionSide::Unknown);
    }

    let side = if (left - right).abs() <= settings.front_symmetry_threshold {
        PositionSide::Front
    } else if left >= settings.dominance_ratio_threshold && left > right {
        PositionSide::Left
    } else if right >= settings.dominance_ratio_threshold && right > left {
        PositionSide::Right
    } else {
        PositionSide::Unknown
    };

    if side.is_unknown() {
        return Ok(side);
    }
    if !exercise.allowed_sides().contains(&side) {
        return Err(ErrorCode::WrongExercisePosition);
    }
    Ok(side)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::NUM_LANDMARKS;

    fn settings() -> SideSettings {
        SideSettings {
            landmark_visibility_threshold: 0.5,
            dominance_ratio_threshold: 0.6,
            front_symmetry_threshold: 0.15,
            min_required_landmark_ratio: 0.4,
        }
    }

    fn with_visibility(left: f32, right: f32) -> PoseLandmarks {
        let mut rows = [[0.5f32, 0.5, 0.0, 0.0]; NUM_LANDMARKS];
        for &index in &LEFT_LANDMARKS {
            rows[index][3] = left;
        }
        for &index in &RIGHT_LANDMARKS {
            rows[index][3] = right;
        }
        PoseLandmarks::from_rows(&rows).unwrap()
    }

    #[test]
    fn symmetric_visibility_is_front() {
        let lm = with_visibility(0.9, 0.9);
        assert_eq!(
            detect_and_validate(&settings(), &lm, ExerciseType::Squat),
            Ok(PositionSide::Front)
        );
    }

    #[test]
    fn left_dominance_is_left() {
        let lm = with_visibility(0.9, 0.1);
        assert_eq!(
            detect_and_validate(&settings(), &lm, ExerciseType::Squat),
            Ok(PositionSide::Left)
        );
    }

    #[test]
    fn low_signal_is_unknown() {
        let lm = with_visibility(0.1, 0.1);
        assert_eq!(
            detect_and_validate(&settings(), &lm, ExerciseType::Squat),
            Ok(PositionSide::Unknown)
        );
    }

    #[test]
    fn front_is_rejected_for_biceps_curl() {
        let lm = with_visibility(0.9, 0.9);
        assert_eq!(
            detect_and_validate(&settings(), &lm, ExerciseType::BicepsCurl),
            Err(ErrorCode::WrongExercisePosition)
        );
    }
}
