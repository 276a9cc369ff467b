//! SPDX-License-Identifier: GPL-3.0-or-later

//! Joint-angle computation. Three-point joints measure the angle at the
//! middle landmark via the dot product; two-point joints measure the tilt of
//! a line against the horizontal axis, ignoring depth.

use std::collections::HashMap;

use ndarray::ArrayView1;

use crate::config::JointSettings;
use crate::error::ErrorCode;
use crate::exercise::{ExerciseType, JointPoints};
use crate::landmarks::PoseLandmarks;

/// Joint name to degrees; `None` when the joint could not be computed for
/// this frame (occluded or degenerate geometry).
pub type CalculatedJoints = HashMap<String, Option<f64>>;

fn is_visible(settings: &JointSettings, point: ArrayView1<'_, f32>) -> bool {
    let visibility = point[3];
    !visibility.is_nan() && visibility >= settings.visibility_threshold
}

/// Angle at `b` between the rays towards `a` and `c`, in degrees.
fn three_point_angle(
    a: ArrayView1<'_, f32>,
    b: ArrayView1<'_, f32>,
    c: ArrayView1<'_, f32>,
) -> Option<f64> {
    let u = [
        (a[0] - b[0]) as f64,
        (a[1] - b[1]) as f64,
        (a[2] - b[2]) as f64,
    ];
    let v = [
        (c[0] - b[0]) as f64,
        (c[1] - b[1]) as f64,
        (c[2] - b[2]) as f64,
    ];
    let norm_u = (u[0] * u[0] + u[1] * u[1] + u[2] * u[2]).sqrt();
    let norm_v = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if norm_u == 0.0 || norm_v == 0.0 {
        return None;
    }
    let dot = u[0] * v[0] + u[1] * v[1] + u[2] * v[2];
    let cos_theta = (dot / (norm_u * norm_v)).clamp(-1.0, 1.0);
    Some(cos_theta.acos().to_degrees())
}

/// Tilt of the segment between two landmarks against the horizontal axis,
/// normalized to [0, 90] degrees.
fn line_against_horizontal(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> Option<f64> {
    let dx = (b[0] - a[0]) as f64;
    let dy = (b[1] - a[1]) as f64;
    if dx == 0.0 && dy == 0.0 {
        return None;
    }
    Some(dy.abs().atan2(dx.abs()).to_degrees())
}

/// Computes the exercise's joints from one landmark matrix. EXTENDED joints
/// are only computed with `extended_evaluation`; they never appear in the
/// result otherwise. Fails with TOO_MANY_INVALID_ANGLES when the fraction of
/// computable CORE joints falls below the configured ratio.
pub fn calculate_joints(
    settings: &JointSettings,
    exercise: ExerciseType,
    landmarks: &PoseLandmarks,
    extended_evaluation: bool,
) -> Result<CalculatedJoints, ErrorCode> {
    let core = exercise.core_joints();
    let mut results = CalculatedJoints::new();
    let mut valid_core = 0usize;

    let all: Vec<_> = if extended_evaluation {
        core.iter().chain(exercise.extended_joints()).collect()
    } else {
        core.iter().collect()
    };

    for joint in all {
        let angle = match joint.points {
            JointPoints::Three([a, b, c]) => {
                let (pa, pb, pc) = (landmarks.row(a), landmarks.row(b), landmarks.row(c));
                if is_visible(settings, pa) && is_visible(settings, pb) && is_visible(settings, pc)
                {
                    three_point_angle(pa, pb, pc)
                } else {
                    None
                }
            }
            JointPoints::Two([a, b]) => {
                let (pa, pb) = (landmarks.row(a), landmarks.row(b));
                if is_visible(settings, pa) && is_visible(settings, pb) {
                    line_against_horizontal(pa, pb)
                } else {
                    None
                }
            }
        };

        if angle.is_some() && core.contains(joint) {
            valid_core += 1;
        }
        results.insert(joint.name.to_string(), angle);
    }

    let core_valid_ratio = valid_core as f32 / core.len() as f32;
    if core_valid_ratio < settings.min_valid_joint_ratio {
        return Err(ErrorCode::TooManyInvalidAngles);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{landmark as lm, NUM_LANDMARKS};

    fn settings() -> JointSettings {
        JointSettings {
            visibility_threshold: 0.5,
            min_valid_joint_ratio: 0.6,
        }
    }

    fn place(rows: &mut [[f32; 4]; NUM_LANDMARKS], index: usize, x: f32, y: f32) {
        rows[index] = [x, y, 0.0, 1.0];
    }

    /// A right-angled knee: hip above the knee, ankle to the side.
    #[test]
    fn right_angle_measures_ninety_degrees() {
        let mut rows = [[0.5f32, 0.5, 0.0, 1.0]; NUM_LANDMARKS];
        place(&mut rows, lm::LEFT_HIP, 0.5, 0.2);
        place(&mut rows, lm::LEFT_KNEE, 0.5, 0.5);
        place(&mut rows, lm::LEFT_ANKLE, 0.8, 0.5);
        let landmarks = PoseLandmarks::from_rows(&rows).unwrap();

        let angle = three_point_angle(
            landmarks.row(lm::LEFT_HIP),
            landmarks.row(lm::LEFT_KNEE),
            landmarks.row(lm::LEFT_ANKLE),
        )
        .unwrap();
        assert!((angle - 90.0).abs() < 1e-3, "angle {angle}");
    }

    #[test]
    fn straight_line_measures_near_180() {
        let mut rows = [[0.5f32, 0.5, 0.0, 1.0]; NUM_LANDMARKS];
        place(&mut rows, lm::LEFT_HIP, 0.5, 0.2);
        place(&mut rows, lm::LEFT_KNEE, 0.5, 0.5);
        place(&mut rows, lm::LEFT_ANKLE, 0.5, 0.8);
        let landmarks = PoseLandmarks::from_rows(&rows).unwrap();

        let angle = three_point_angle(
            landmarks.row(lm::LEFT_HIP),
            landmarks.row(lm::LEFT_KNEE),
            landmarks.row(lm::LEFT_ANKLE),
        )
        .unwrap();
        assert!((angle - 180.0).abs() < 1e-3, "angle {angle}");
    }

    #[test]
    fn horizontal_line_is_zero_degrees() {
        let mut rows = [[0.5f32, 0.5, 0.0, 1.0]; NUM_LANDMARKS];
        place(&mut rows, lm::LEFT_HIP, 0.4, 0.5);
        place(&mut rows, lm::RIGHT_HIP, 0.6, 0.5);
        let landmarks = PoseLandmarks::from_rows(&rows).unwrap();
        let angle =
            line_against_horizontal(landmarks.row(lm::LEFT_HIP), landmarks.row(lm::RIGHT_HIP))
                .unwrap();
        assert!(angle.abs() < 1e-6);
    }

    #[test]
    fn identical_endpoints_yield_none() {
        let rows = [[0.5f32, 0.5, 0.0, 1.0]; NUM_LANDMARKS];
        let landmarks = PoseLandmarks::from_rows(&rows).unwrap();
        assert!(line_against_horizontal(
            landmarks.row(lm::LEFT_HIP),
            landmarks.row(lm::RIGHT_HIP)
        )
        .is_none());
    }

    #[test]
    fn occluded_core_joints_fail_the_ratio() {
        // Everything invisible: zero valid core joints.
        let rows = [[0.5f32, 0.5, 0.0, 0.0]; NUM_LANDMARKS];
        let landmarks = PoseLandmarks::from_rows(&rows).unwrap();
        assert_eq!(
            calculate_joints(&settings(), ExerciseType::Squat, &landmarks, false),
            Err(ErrorCode::TooManyInvalidAngles)
        );
    }

    #[test]
    fn extended_joints_absent_without_flag() {
        // A spread-out pose so core joints compute.
        let mut rows = [[0.5f32, 0.5, 0.0, 1.0]; NUM_LANDMARKS];
        for (i, row) in rows.iter_mut().enumerate() {
            let t = i as f32 / (NUM_LANDMARKS - 1) as f32;
            *row = [0.3 + 0.4 * t, 0.1 + 0.8 * t, 0.0, 1.0];
        }
        let landmarks = PoseLandmarks::from_rows(&rows).unwrap();
        let joints =
            calculate_joints(&settings(), ExerciseType::Squat, &landmarks, false).unwrap();
        assert!(joints.contains_key("left_knee_angle"));
        assert!(!joints.contains_key("hip_line_angle"));

        let joints = calculate_joints(&settings(), ExerciseType::Squat, &landmarks, true).unwrap();
        assert!(joints.contains_key("hip_line_angle"));
    }
}
