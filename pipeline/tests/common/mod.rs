//! SPDX-License-Identifier: GPL-3.0-or-later

//! Shared fixtures: in-memory configuration sets, geometric pose builders
//! and a registry wired to the deterministic stub extractor.

#![allow(dead_code)]

use std::sync::Arc;

use bodytrack_pipeline::config::{
    parse_error_thresholds, parse_phase_config, CommunicationSettings, ConfigSet, ErrorSettings,
    FeedbackSettings, FrameSettings, HistorySettings, JointSettings, PhaseSettings, PoseSettings,
    SessionSettings, Settings, SharedConfig, SideSettings, SummarySettings, TaskSettings,
    TraceSettings,
};
use bodytrack_pipeline::extract::StubExtractor;
use bodytrack_pipeline::frame::FrameData;
use bodytrack_pipeline::landmarks::{landmark as lm, PoseLandmarks, NUM_LANDMARKS};
use bodytrack_pipeline::registry::SessionRegistry;
use bodytrack_pipeline::session::ClientInfo;
use bodytrack_pipeline::trace::TraceWriter;
use serde_json::{json, Value};

pub fn settings() -> Settings {
    Settings {
        communication: CommunicationSettings {
            host: "127.0.0.1".into(),
            port: 8080,
            termination_password: "secret".into(),
        },
        frame: FrameSettings {
            width: 640,
            height: 480,
        },
        session: SessionSettings {
            supported_exercises: vec!["squat".into(), "biceps_curl".into()],
            maximum_clients: 8,
            num_of_min_init_ok_frames: 5,
            num_of_min_init_correct_phase_frames: 3,
        },
        tasks: TaskSettings {
            cleanup_interval_minutes: 5,
            max_registration_minutes: 10,
            max_inactive_minutes: 5,
            max_pause_minutes: 15,
            max_ended_retention: 30,
            retrieve_configuration_minutes: 60,
        },
        pose: PoseSettings {
            stability_threshold: 0.15,
            bbox_too_far: 0.008,
            minimum_bbox_area: 0.001,
            visibility_good_threshold: 0.6,
            required_visibility_ratio: 0.7,
            extractor_command: None,
        },
        position_side: SideSettings {
            landmark_visibility_threshold: 0.5,
            dominance_ratio_threshold: 0.6,
            front_symmetry_threshold: 0.15,
            min_required_landmark_ratio: 0.4,
        },
        joints: JointSettings {
            visibility_threshold: 0.5,
            min_valid_joint_ratio: 0.5,
        },
        phase: PhaseSettings {
            phase_low_motion_threshold: 3,
            phase_detector_config_file: "phases.json".into(),
        },
        error: ErrorSettings {
            error_detector_config_file: "errors.json".into(),
        },
        history: HistorySettings {
            frames_rolling_window_size: 120,
            bad_frame_log_size: 60,
            recovery_ok_threshold: 1,
            bad_stability_limit: 30,
            max_consecutive_invalid_before_abort: 5,
            low_motion_angle_degrees_threshold: 3.0,
        },
        feedback: FeedbackSettings {
            pose_quality_feedback_threshold: 3,
            bio_feedback_threshold: 3,
            cooldown_frames: 5,
        },
        summary: SummarySettings {
            number_of_top_errors: 3,
            penalty_per_error: 2.0,
            max_grade: 100.0,
        },
        trace: TraceSettings::default(),
    }
}

pub fn phase_doc() -> Value {
    json!({
        "squat": {
            "initial_phase": "TOP",
            "transition_order": ["TOP", "DOWN", "HOLD", "UP", "TOP"],
            "low_motion_phases": ["HOLD"],
            "rules": {
                "TOP": {
                    "left_knee_angle": { "min": 160.0, "max": 180.0 },
                    "right_knee_angle": { "min": 160.0, "max": 180.0 },
                    "left_hip_angle": { "min": 160.0, "max": 180.0 },
                    "right_hip_angle": { "min": 160.0, "max": 180.0 }
                },
                "DOWN": {
                    "left_knee_angle": { "min": 100.0, "max": 160.0 },
                    "right_knee_angle": { "min": 100.0, "max": 160.0 },
                    "left_hip_angle": { "min": 95.0, "max": 160.0 },
                    "right_hip_angle": { "min": 95.0, "max": 160.0 }
                },
                "HOLD": {
                    "left_knee_angle": { "min": 60.0, "max": 100.0 },
                    "right_knee_angle": { "min": 60.0, "max": 100.0 },
                    "left_hip_angle": { "min": 50.0, "max": 110.0 },
                    "right_hip_angle": { "min": 50.0, "max": 110.0 }
                },
                "UP": {
                    "left_knee_angle": { "min": 100.0, "max": 160.0 },
                    "right_knee_angle": { "min": 100.0, "max": 160.0 },
                    "left_hip_angle": { "min": 95.0, "max": 160.0 },
                    "right_hip_angle": { "min": 95.0, "max": 160.0 }
                }
            }
        },
        "biceps_curl": {
            "initial_phase": "REST",
            "transition_order": ["REST", "LIFTING", "HOLD", "LOWERING", "REST"],
            "low_motion_phases": ["HOLD"],
            "rules": {
                "REST": {
                    "left_elbow_angle": { "min": 150.0, "max": 180.0 },
                    "right_elbow_angle": { "min": 150.0, "max": 180.0 },
                    "left_shoulder_flexion_angle": { "min": 0.0, "max": 30.0 },
                    "right_shoulder_flexion_angle": { "min": 0.0, "max": 30.0 }
                },
                "LIFTING": {
                    "left_elbow_angle": { "min": 70.0, "max": 150.0 },
                    "right_elbow_angle": { "min": 70.0, "max": 150.0 },
                    "left_shoulder_flexion_angle": { "min": 0.0, "max": 45.0 },
                    "right_shoulder_flexion_angle": { "min": 0.0, "max": 45.0 }
                },
                "HOLD": {
                    "left_elbow_angle": { "min": 30.0, "max": 70.0 },
                    "right_elbow_angle": { "min": 30.0, "max": 70.0 },
                    "left_shoulder_flexion_angle": { "min": 0.0, "max": 45.0 },
                    "right_shoulder_flexion_angle": { "min": 0.0, "max": 45.0 }
                },
                "LOWERING": {
                    "left_elbow_angle": { "min": 70.0, "max": 150.0 },
                    "right_elbow_angle": { "min": 70.0, "max": 150.0 },
                    "left_shoulder_flexion_angle": { "min": 0.0, "max": 45.0 },
                    "right_shoulder_flexion_angle": { "min": 0.0, "max": 45.0 }
                }
            }
        }
    })
}

pub fn error_doc() -> Value {
    json!({
        "squat": {
            "TOP": {
                "trunk_tilt_angle": { "min": 150.0, "max": 185.0 },
                "hip_line_angle": { "min": 0.0, "max": 15.0 }
            },
            "DOWN": {
                "left_knee_angle": { "min": 95.0, "max": 165.0 },
                "right_knee_angle": { "min": 95.0, "max": 165.0 },
                "left_hip_angle": { "min": 90.0, "max": 165.0 },
                "right_hip_angle": { "min": 90.0, "max": 165.0 }
            },
            "HOLD": {
                "left_hip_angle": { "min": 45.0, "max": 115.0 },
                "right_hip_angle": { "min": 45.0, "max": 115.0 },
                "knee_valgus_angle": { "min": 40.0, "max": 130.0 }
            },
            "UP": {
                "left_knee_angle": { "min": 95.0, "max": 170.0 },
                "right_knee_angle": { "min": 95.0, "max": 170.0 },
                "trunk_tilt_angle": { "min": 140.0, "max": 185.0 }
            }
        },
        "biceps_curl": {
            "REST": {
                "left_elbow_angle": { "min": 145.0, "max": 182.0 },
                "right_elbow_angle": { "min": 145.0, "max": 182.0 },
                "left_shoulder_flexion_angle": { "min": 0.0, "max": 35.0 },
                "right_shoulder_flexion_angle": { "min": 0.0, "max": 35.0 }
            },
            "LIFTING": {
                "left_elbow_angle": { "min": 60.0, "max": 155.0 },
                "right_elbow_angle": { "min": 60.0, "max": 155.0 },
                "left_shoulder_flexion_angle": { "min": 0.0, "max": 50.0 },
                "right_shoulder_flexion_angle": { "min": 0.0, "max": 50.0 }
            },
            "HOLD": {
                "left_elbow_angle": { "min": 25.0, "max": 75.0 },
                "right_elbow_angle": { "min": 25.0, "max": 75.0 },
                "left_wrist_angle": { "min": 130.0, "max": 185.0 },
                "right_wrist_angle": { "min": 130.0, "max": 185.0 }
            },
            "LOWERING": {
                "left_elbow_angle": { "min": 60.0, "max": 155.0 },
                "right_elbow_angle": { "min": 60.0, "max": 155.0 },
                "left_shoulder_flexion_angle": { "min": 0.0, "max": 50.0 },
                "right_shoulder_flexion_angle": { "min": 0.0, "max": 50.0 }
            }
        }
    })
}

/// An error-threshold table that flags every squat DOWN frame as
/// SQUAT_DOWN_KNEE_TOO_BENT while the phase rules still accept it.
pub fn knee_too_bent_error_doc() -> Value {
    let mut doc = error_doc();
    doc["squat"]["DOWN"] = json!({
        "left_knee_angle": { "min": 60.0, "max": 100.0 },
        "right_knee_angle": { "min": 60.0, "max": 100.0 }
    });
    doc
}

pub fn config_set_with(settings: Settings, errors: &Value) -> ConfigSet {
    ConfigSet {
        settings,
        phases: parse_phase_config(&phase_doc()).expect("phase doc"),
        errors: parse_error_thresholds(errors).expect("error doc"),
    }
}

pub fn config_set(settings: Settings) -> ConfigSet {
    config_set_with(settings, &error_doc())
}

pub fn registry_with(config: ConfigSet, poses: Vec<PoseLandmarks>) -> Arc<SessionRegistry> {
    let shared = SharedConfig::from_set(config);
    let extractor = Arc::new(StubExtractor::new(poses));
    let trace_writer = Arc::new(TraceWriter::disabled());
    Arc::new(SessionRegistry::new(shared, extractor, trace_writer))
}

pub fn client(ip: &str) -> ClientInfo {
    ClientInfo {
        ip: ip.parse().expect("test ip"),
        user_agent: "bodytrack-tests/1.0".into(),
    }
}

pub fn frame(frame_id: u64) -> FrameData {
    FrameData::new(frame_id, 2, 2, vec![0u8; 12])
}

fn base_rows(visibility: f32) -> [[f32; 4]; NUM_LANDMARKS] {
    [[0.5, 0.5, 0.0, visibility]; NUM_LANDMARKS]
}

fn place(rows: &mut [[f32; 4]; NUM_LANDMARKS], index: usize, x: f32, y: f32, vis: f32) {
    rows[index] = [x, y, 0.0, vis];
}

/// Front-view squat pose. `shoulder_y`, `hip_y` and the knee x offset pick
/// the depth; legs are mirrored about the body axis.
fn squat_rows(
    shoulder_y: f32,
    hip_y: f32,
    knee_dx: f32,
    knee_y: f32,
    ear_y: f32,
) -> [[f32; 4]; NUM_LANDMARKS] {
    let v = 0.95;
    let (lx, rx) = (0.40, 0.60);
    let mut rows = base_rows(v);

    place(&mut rows, lm::NOSE, 0.50, ear_y - 0.02, v);
    place(&mut rows, lm::LEFT_EYE, 0.48, ear_y - 0.01, v);
    place(&mut rows, lm::RIGHT_EYE, 0.52, ear_y - 0.01, v);
    place(&mut rows, lm::LEFT_EAR, lx, ear_y, v);
    place(&mut rows, lm::RIGHT_EAR, rx, ear_y, v);
    place(&mut rows, lm::LEFT_SHOULDER, lx, shoulder_y, v);
    place(&mut rows, lm::RIGHT_SHOULDER, rx, shoulder_y, v);
    place(&mut rows, lm::LEFT_ELBOW, lx - 0.05, shoulder_y + 0.13, v);
    place(&mut rows, lm::RIGHT_ELBOW, rx + 0.05, shoulder_y + 0.13, v);
    place(&mut rows, lm::LEFT_WRIST, lx - 0.06, shoulder_y + 0.25, v);
    place(&mut rows, lm::RIGHT_WRIST, rx + 0.06, shoulder_y + 0.25, v);
    place(&mut rows, lm::LEFT_HIP, lx, hip_y, v);
    place(&mut rows, lm::RIGHT_HIP, rx, hip_y, v);
    place(&mut rows, lm::LEFT_KNEE, lx + knee_dx, knee_y, v);
    place(&mut rows, lm::RIGHT_KNEE, rx - knee_dx, knee_y, v);
    place(&mut rows, lm::LEFT_ANKLE, lx, 0.90, v);
    place(&mut rows, lm::RIGHT_ANKLE, rx, 0.90, v);
    place(&mut rows, lm::LEFT_HEEL, lx - 0.02, 0.93, v);
    place(&mut rows, lm::RIGHT_HEEL, rx + 0.02, 0.93, v);
    place(&mut rows, lm::LEFT_FOOT_INDEX, lx + 0.03, 0.95, v);
    place(&mut rows, lm::RIGHT_FOOT_INDEX, rx - 0.03, 0.95, v);
    rows
}

/// Upright stance: knees and hips fully extended (TOP phase).
pub fn squat_top() -> PoseLandmarks {
    PoseLandmarks::from_rows(&squat_rows(0.25, 0.50, 0.0, 0.70, 0.10)).unwrap()
}

/// Mid-descent: knees around 108 degrees, hips around 135 (DOWN phase).
pub fn squat_down() -> PoseLandmarks {
    PoseLandmarks::from_rows(&squat_rows(0.30, 0.60, 0.10, 0.70, 0.15)).unwrap()
}

/// Bottom position: knees around 69 degrees, hips just under 100 (HOLD).
pub fn squat_hold() -> PoseLandmarks {
    PoseLandmarks::from_rows(&squat_rows(0.40, 0.68, 0.12, 0.70, 0.25)).unwrap()
}

/// Ascent mirrors the descent geometry (UP phase).
pub fn squat_up() -> PoseLandmarks {
    PoseLandmarks::from_rows(&squat_rows(0.30, 0.60, 0.10, 0.70, 0.15)).unwrap()
}

/// Left-profile biceps curl at rest: left arm extended, right side occluded.
pub fn curl_rest_left() -> PoseLandmarks {
    let v = 0.95;
    let occluded = 0.1;
    let mut rows = base_rows(occluded);

    place(&mut rows, lm::NOSE, 0.52, 0.08, 0.9);
    place(&mut rows, lm::LEFT_EYE, 0.51, 0.09, v);
    place(&mut rows, lm::LEFT_EYE_INNER, 0.51, 0.09, v);
    place(&mut rows, lm::LEFT_EYE_OUTER, 0.50, 0.09, v);
    place(&mut rows, lm::LEFT_EAR, 0.50, 0.10, v);
    place(&mut rows, lm::LEFT_SHOULDER, 0.50, 0.25, v);
    place(&mut rows, lm::LEFT_ELBOW, 0.50, 0.40, v);
    place(&mut rows, lm::LEFT_WRIST, 0.50, 0.55, v);
    place(&mut rows, lm::LEFT_PINKY, 0.51, 0.59, v);
    place(&mut rows, lm::LEFT_INDEX, 0.50, 0.60, v);
    place(&mut rows, lm::LEFT_THUMB, 0.49, 0.58, v);
    place(&mut rows, lm::LEFT_HIP, 0.48, 0.50, v);
    place(&mut rows, lm::LEFT_KNEE, 0.48, 0.72, v);
    place(&mut rows, lm::LEFT_ANKLE, 0.48, 0.92, v);
    place(&mut rows, lm::LEFT_HEEL, 0.46, 0.93, v);
    place(&mut rows, lm::LEFT_FOOT_INDEX, 0.52, 0.95, v);
    PoseLandmarks::from_rows(&rows).unwrap()
}

/// Front-facing stance with both sides visible; not allowed for the curl.
pub fn curl_front() -> PoseLandmarks {
    squat_top()
}

/// A collapsed landmark cluster: reads as NO_PERSON.
pub fn empty_pose() -> PoseLandmarks {
    PoseLandmarks::from_rows(&base_rows(0.9)).unwrap()
}
