//! SPDX-License-Identifier: GPL-3.0-or-later

//! Full-pipeline coverage in the ACTIVE analyzing state: rep counting along
//! the transition order, biomechanical feedback under cooldown, the abort
//! path, and the end-of-session summary.

mod common;

use std::sync::Arc;

use bodytrack_pipeline::config::SharedConfig;
use bodytrack_pipeline::error::ErrorCode;
use bodytrack_pipeline::extract::StubExtractor;
use bodytrack_pipeline::feedback::FeedbackCode;
use bodytrack_pipeline::pipeline::PipelineProcessor;
use bodytrack_pipeline::response::AnalysisOutcome;
use bodytrack_pipeline::session::{AnalyzingState, SessionData, SessionId, SessionStatus};
use bodytrack_pipeline::trace::TraceWriter;
use common::*;

/// Calibration prefix: 5 visibility frames plus 3 initial-phase frames.
fn calibration_poses() -> Vec<bodytrack_pipeline::landmarks::PoseLandmarks> {
    vec![squat_top(); 8]
}

fn one_rep_poses() -> Vec<bodytrack_pipeline::landmarks::PoseLandmarks> {
    vec![
        squat_down(),
        squat_down(),
        squat_hold(),
        squat_up(),
        squat_top(),
    ]
}

#[test]
fn three_reps_count_and_summarize_cleanly() {
    let mut poses = calibration_poses();
    for _ in 0..3 {
        poses.extend(one_rep_poses());
    }
    let registry = registry_with(config_set(settings()), poses);
    let (_, id) = registry.register("squat", client("30.0.0.1")).unwrap();
    registry.start(id.as_str(), false).unwrap();

    let mut frame_id = 0;
    for _ in 0..8 {
        frame_id += 1;
        registry.analyze_frame(id.as_str(), frame(frame_id)).unwrap();
    }
    for _ in 0..15 {
        frame_id += 1;
        let outcome = registry.analyze_frame(id.as_str(), frame(frame_id)).unwrap();
        // The whole movement is within thresholds: never a coaching cue.
        match outcome {
            AnalysisOutcome::Feedback(code) => {
                assert!(
                    matches!(code, FeedbackCode::Silent | FeedbackCode::Valid),
                    "frame {frame_id} produced {code:?}"
                )
            }
            AnalysisOutcome::Calibration(code) => {
                panic!("frame {frame_id} still calibrating: {code:?}")
            }
        }
    }

    registry.end(id.as_str()).unwrap();
    let summary = registry.summary(id.as_str()).unwrap();

    assert_eq!(summary.number_of_reps, 3);
    assert_eq!(summary.rep_breakdown.len(), 3);
    assert!(summary.rep_breakdown.iter().all(|rep| rep.is_correct));
    assert_eq!(summary.overall_grade, 100.0);
    assert!(summary.recommendations.is_empty());

    let mean: f64 = summary
        .rep_breakdown
        .iter()
        .map(|rep| rep.duration_seconds)
        .sum::<f64>()
        / summary.rep_breakdown.len() as f64;
    assert!((summary.average_rep_duration_seconds - mean).abs() < 1e-9);
}

#[test]
fn knee_error_feedback_respects_streak_and_cooldown() {
    // Thresholds tightened so every DOWN frame reads as knee-too-bent.
    let config = config_set_with(settings(), &knee_too_bent_error_doc());
    let mut poses = calibration_poses();
    poses.extend(vec![squat_down(); 8]);
    let registry = registry_with(config, poses);
    let (_, id) = registry.register("squat", client("30.0.0.2")).unwrap();
    registry.start(id.as_str(), false).unwrap();

    for frame_id in 1..=8 {
        registry.analyze_frame(id.as_str(), frame(frame_id)).unwrap();
    }

    let mut feedback = Vec::new();
    for frame_id in 9..=16 {
        match registry.analyze_frame(id.as_str(), frame(frame_id)).unwrap() {
            AnalysisOutcome::Feedback(code) => feedback.push(code),
            AnalysisOutcome::Calibration(code) => {
                panic!("frame {frame_id} still calibrating: {code:?}")
            }
        }
    }

    use FeedbackCode::*;
    assert_eq!(
        feedback,
        vec![
            Silent,               // streak 1
            Silent,               // streak 2
            SquatDownKneeTooBent, // streak hits the threshold
            Silent,               // cooldown
            Silent,
            Silent,
            Silent,
            SquatDownKneeTooBent, // cooldown elapsed
        ]
    );

    registry.end(id.as_str()).unwrap();
    let summary = registry.summary(id.as_str()).unwrap();
    assert!(summary.overall_grade < 100.0);
    assert!(summary
        .recommendations
        .iter()
        .any(|r| r.contains("descent")));
    // The rep was cut short by the session end.
    assert_eq!(summary.number_of_reps, 1);
    assert!(!summary.rep_breakdown[0].is_correct);
}

#[test]
fn invalid_frame_pileup_aborts_the_session() {
    let mut poses = calibration_poses();
    poses.push(empty_pose());
    let registry = registry_with(config_set(settings()), poses);
    let (_, id) = registry.register("squat", client("30.0.0.3")).unwrap();
    registry.start(id.as_str(), false).unwrap();

    for frame_id in 1..=8 {
        registry.analyze_frame(id.as_str(), frame(frame_id)).unwrap();
    }

    // max_consecutive_invalid_before_abort is 5 in the test settings; the
    // first four bad frames still answer with feedback.
    for frame_id in 9..=12 {
        let outcome = registry.analyze_frame(id.as_str(), frame(frame_id)).unwrap();
        assert!(
            matches!(outcome, AnalysisOutcome::Feedback(_)),
            "frame {frame_id}"
        );
    }
    let error = registry.analyze_frame(id.as_str(), frame(13)).unwrap_err();
    assert_eq!(error.code, ErrorCode::SessionShouldAbort);
}

#[test]
fn quality_feedback_names_the_dominant_problem() {
    let mut poses = calibration_poses();
    poses.push(empty_pose());
    let registry = registry_with(config_set(settings()), poses);
    let (_, id) = registry.register("squat", client("30.0.0.4")).unwrap();
    registry.start(id.as_str(), false).unwrap();

    for frame_id in 1..=8 {
        registry.analyze_frame(id.as_str(), frame(frame_id)).unwrap();
    }

    let mut feedback = Vec::new();
    for frame_id in 9..=11 {
        match registry.analyze_frame(id.as_str(), frame(frame_id)).unwrap() {
            AnalysisOutcome::Feedback(code) => feedback.push(code),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    // Below the pose-quality threshold the channel stays silent, then the
    // dominant streak is spoken.
    assert_eq!(
        feedback,
        vec![
            FeedbackCode::Silent,
            FeedbackCode::Silent,
            FeedbackCode::NoPerson
        ]
    );
}

/// Drives the orchestrator directly and checks the structural invariants
/// after every frame.
#[test]
fn history_invariants_hold_after_every_frame() {
    let mut poses = calibration_poses();
    for _ in 0..2 {
        poses.extend(one_rep_poses());
    }
    let config = config_set(settings());
    let window = config.settings.history.frames_rolling_window_size;
    let log_size = config.settings.history.bad_frame_log_size;

    let shared = SharedConfig::from_set(config);
    let processor = PipelineProcessor::new(
        Arc::new(StubExtractor::new(poses)),
        Arc::new(TraceWriter::disabled()),
    );
    let mut session = SessionData::new(
        SessionId::generate(),
        client("30.0.0.5"),
        bodytrack_pipeline::exercise::ExerciseType::Squat,
    );
    session.session_status = SessionStatus::Active;
    session.analyzing_state = AnalyzingState::Init;

    let config = shared.current();
    processor.start(&config, &mut session);

    for frame_id in 1..=18u64 {
        processor
            .analyze_frame(&config, &mut session, &frame(frame_id))
            .unwrap();

        let history = &session.history;
        assert_eq!(
            history.rep_count() as usize,
            history.repetitions().len(),
            "frame {frame_id}"
        );
        assert!(history.frames().len() <= window);
        assert!(history.bad_frames_log().len() <= log_size);
        // At most one open rep, and only while a cycle is in progress.
        if history.current_rep().is_some() {
            assert_ne!(history.current_transition_index(), 0);
        }
        // A stored phase implies a matching transition or the initial set.
        if let Some(last) = history.phase_transitions().last() {
            assert_eq!(Some(last.phase_to), history.phase_state());
        }
    }

    assert_eq!(session.history.rep_count(), 2);
}
