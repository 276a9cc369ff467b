//! SPDX-License-Identifier: GPL-3.0-or-later

//! Exercise schemas: the phase family, the joint definitions and the camera
//! sides each exercise accepts. All of it is static data; the numeric phase
//! rule ranges live in configuration.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::landmarks::landmark as lm;

/// Supported exercise kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseType {
    Squat,
    BicepsCurl,
}

impl ExerciseType {
    pub const ALL: [ExerciseType; 2] = [ExerciseType::Squat, ExerciseType::BicepsCurl];

    /// Case-insensitive parse of the wire name.
    pub fn parse(name: &str) -> Result<Self, ErrorCode> {
        match name.trim().to_ascii_lowercase().as_str() {
            "squat" => Ok(ExerciseType::Squat),
            "biceps_curl" => Ok(ExerciseType::BicepsCurl),
            _ => Err(ErrorCode::ExerciseTypeDoesNotExist),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ExerciseType::Squat => "squat",
            ExerciseType::BicepsCurl => "biceps_curl",
        }
    }

    /// The phases of this exercise's movement cycle.
    pub fn phases(self) -> &'static [Phase] {
        match self {
            ExerciseType::Squat => &[Phase::Top, Phase::Down, Phase::Hold, Phase::Up],
            ExerciseType::BicepsCurl => {
                &[Phase::Rest, Phase::Lifting, Phase::Hold, Phase::Lowering]
            }
        }
    }

    pub fn core_joints(self) -> &'static [Joint] {
        match self {
            ExerciseType::Squat => SQUAT_CORE,
            ExerciseType::BicepsCurl => CURL_CORE,
        }
    }

    pub fn extended_joints(self) -> &'static [Joint] {
        match self {
            ExerciseType::Squat => SQUAT_EXTENDED,
            ExerciseType::BicepsCurl => CURL_EXTENDED,
        }
    }

    /// Camera orientations this exercise can be evaluated from.
    pub fn allowed_sides(self) -> &'static [PositionSide] {
        match self {
            ExerciseType::Squat => &[
                PositionSide::Front,
                PositionSide::Left,
                PositionSide::Right,
            ],
            ExerciseType::BicepsCurl => &[PositionSide::Left, PositionSide::Right],
        }
    }

    /// Joints relevant for a given camera side. FRONT sees everything; a
    /// profile view drops the occluded side's joints. UNKNOWN does not
    /// restrict so calibration can still make progress.
    pub fn joints_for_side(
        self,
        side: PositionSide,
        extended_evaluation: bool,
    ) -> Vec<&'static Joint> {
        let mut joints: Vec<&'static Joint> = self.core_joints().iter().collect();
        if extended_evaluation {
            joints.extend(self.extended_joints().iter());
        }
        match side {
            PositionSide::Left => joints
                .into_iter()
                .filter(|j| !j.name.starts_with("right_"))
                .collect(),
            PositionSide::Right => joints
                .into_iter()
                .filter(|j| !j.name.starts_with("left_"))
                .collect(),
            PositionSide::Front | PositionSide::Unknown => joints,
        }
    }

    /// Landmark rows that must be visible for this exercise and side.
    pub fn required_landmark_indices(
        self,
        side: PositionSide,
        extended_evaluation: bool,
    ) -> HashSet<usize> {
        let mut indices = HashSet::new();
        for joint in self.joints_for_side(side, extended_evaluation) {
            for index in joint.points.indices() {
                indices.insert(index);
            }
        }
        indices
    }
}

impl fmt::Display for ExerciseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One phase of a movement cycle. The variant set is shared across
/// exercises; `ExerciseType::phases` scopes which variants are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    // Squat.
    Top,
    Down,
    Up,
    // Biceps curl.
    Rest,
    Lifting,
    Lowering,
    // Shared.
    Hold,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::Top => "TOP",
            Phase::Down => "DOWN",
            Phase::Up => "UP",
            Phase::Rest => "REST",
            Phase::Lifting => "LIFTING",
            Phase::Lowering => "LOWERING",
            Phase::Hold => "HOLD",
        }
    }

    /// Resolves a configured phase name within an exercise's phase set.
    pub fn parse(exercise: ExerciseType, name: &str) -> Result<Self, ErrorCode> {
        exercise
            .phases()
            .iter()
            .copied()
            .find(|p| p.name() == name)
            .ok_or(ErrorCode::PhaseThresholdsConfigFileError)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Camera orientation relative to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionSide {
    #[default]
    Unknown,
    Front,
    Left,
    Right,
}

impl PositionSide {
    pub fn name(self) -> &'static str {
        match self {
            PositionSide::Unknown => "UNKNOWN",
            PositionSide::Front => "FRONT",
            PositionSide::Left => "LEFT",
            PositionSide::Right => "RIGHT",
        }
    }

    pub fn is_unknown(self) -> bool {
        self == PositionSide::Unknown
    }
}

/// The landmark rows a joint angle is computed from. Two points measure a
/// line against the horizontal axis; three points measure the angle at the
/// middle landmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointPoints {
    Two([usize; 2]),
    Three([usize; 3]),
}

impl JointPoints {
    pub fn indices(&self) -> Vec<usize> {
        match self {
            JointPoints::Two(p) => p.to_vec(),
            JointPoints::Three(p) => p.to_vec(),
        }
    }
}

/// A single joint definition: the stable name used in configuration and
/// reports, and the landmarks it is computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Joint {
    pub name: &'static str,
    pub points: JointPoints,
}

const SQUAT_CORE: &[Joint] = &[
    Joint {
        name: "left_knee_angle",
        points: JointPoints::Three([lm::LEFT_HIP, lm::LEFT_KNEE, lm::LEFT_ANKLE]),
    },
    Joint {
        name: "right_knee_angle",
        points: JointPoints::Three([lm::RIGHT_HIP, lm::RIGHT_KNEE, lm::RIGHT_ANKLE]),
    },
    Joint {
        name: "left_hip_angle",
        points: JointPoints::Three([lm::LEFT_SHOULDER, lm::LEFT_HIP, lm::LEFT_KNEE]),
    },
    Joint {
        name: "right_hip_angle",
        points: JointPoints::Three([lm::RIGHT_SHOULDER, lm::RIGHT_HIP, lm::RIGHT_KNEE]),
    },
    Joint {
        name: "trunk_tilt_angle",
        points: JointPoints::Three([lm::LEFT_HIP, lm::LEFT_SHOULDER, lm::LEFT_EAR]),
    },
];

const SQUAT_EXTENDED: &[Joint] = &[
    Joint {
        name: "left_ankle_angle",
        points: JointPoints::Three([lm::LEFT_KNEE, lm::LEFT_ANKLE, lm::LEFT_FOOT_INDEX]),
    },
    Joint {
        name: "right_ankle_angle",
        points: JointPoints::Three([lm::RIGHT_KNEE, lm::RIGHT_ANKLE, lm::RIGHT_FOOT_INDEX]),
    },
    Joint {
        name: "knee_valgus_angle",
        points: JointPoints::Three([lm::LEFT_HIP, lm::LEFT_KNEE, lm::LEFT_ANKLE]),
    },
    Joint {
        name: "hip_line_angle",
        points: JointPoints::Two([lm::LEFT_HIP, lm::RIGHT_HIP]),
    },
];

const CURL_CORE: &[Joint] = &[
    Joint {
        name: "left_elbow_angle",
        points: JointPoints::Three([lm::LEFT_SHOULDER, lm::LEFT_ELBOW, lm::LEFT_WRIST]),
    },
    Joint {
        name: "right_elbow_angle",
        points: JointPoints::Three([lm::RIGHT_SHOULDER, lm::RIGHT_ELBOW, lm::RIGHT_WRIST]),
    },
    Joint {
        name: "left_shoulder_flexion_angle",
        points: JointPoints::Three([lm::LEFT_HIP, lm::LEFT_SHOULDER, lm::LEFT_ELBOW]),
    },
    Joint {
        name: "right_shoulder_flexion_angle",
        points: JointPoints::Three([lm::RIGHT_HIP, lm::RIGHT_SHOULDER, lm::RIGHT_ELBOW]),
    },
];

const CURL_EXTENDED: &[Joint] = &[
    Joint {
        name: "left_shoulder_torso_angle",
        points: JointPoints::Three([lm::LEFT_HIP, lm::LEFT_SHOULDER, lm::LEFT_EAR]),
    },
    Joint {
        name: "right_shoulder_torso_angle",
        points: JointPoints::Three([lm::RIGHT_HIP, lm::RIGHT_SHOULDER, lm::RIGHT_EAR]),
    },
    Joint {
        name: "left_wrist_angle",
        points: JointPoints::Three([lm::LEFT_ELBOW, lm::LEFT_WRIST, lm::LEFT_INDEX]),
    },
    Joint {
        name: "right_wrist_angle",
        points: JointPoints::Three([lm::RIGHT_ELBOW, lm::RIGHT_WRIST, lm::RIGHT_INDEX]),
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(ExerciseType::parse(" Squat "), Ok(ExerciseType::Squat));
        assert_eq!(
            ExerciseType::parse("BICEPS_CURL"),
            Ok(ExerciseType::BicepsCurl)
        );
        assert_eq!(
            ExerciseType::parse("lateral_raise"),
            Err(ErrorCode::ExerciseTypeDoesNotExist)
        );
    }

    #[test]
    fn phase_names_resolve_within_exercise() {
        assert_eq!(
            Phase::parse(ExerciseType::Squat, "TOP"),
            Ok(Phase::Top)
        );
        assert_eq!(
            Phase::parse(ExerciseType::BicepsCurl, "HOLD"),
            Ok(Phase::Hold)
        );
        // TOP is not a biceps curl phase.
        assert!(Phase::parse(ExerciseType::BicepsCurl, "TOP").is_err());
    }

    #[test]
    fn side_filter_drops_occluded_joints() {
        let left = ExerciseType::Squat.joints_for_side(PositionSide::Left, false);
        assert!(left.iter().all(|j| !j.name.starts_with("right_")));
        assert!(left.iter().any(|j| j.name == "trunk_tilt_angle"));

        let front = ExerciseType::Squat.joints_for_side(PositionSide::Front, false);
        assert_eq!(front.len(), ExerciseType::Squat.core_joints().len());
    }

    #[test]
    fn extended_joints_only_when_enabled() {
        let base = ExerciseType::BicepsCurl.joints_for_side(PositionSide::Front, false);
        let extended = ExerciseType::BicepsCurl.joints_for_side(PositionSide::Front, true);
        assert_eq!(base.len(), 4);
        assert_eq!(extended.len(), 8);
    }

    #[test]
    fn curl_disallows_front() {
        assert!(!ExerciseType::BicepsCurl
            .allowed_sides()
            .contains(&PositionSide::Front));
    }
}
