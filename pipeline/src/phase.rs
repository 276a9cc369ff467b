//! SPDX-License-Identifier: GPL-3.0-or-later

//! Phase detection. A phase is a candidate when every joint in its
//! (side-filtered) rule block is present and inside its range; the winner is
//! then chosen with hysteresis, a bias towards the next expected phase in
//! the configured transition order, and a low-motion gate for phases like
//! HOLD that should only be entered once movement has actually settled.

use std::collections::{HashMap, HashSet};

use crate::config::{AngleRange, ConfigSet, ExercisePhases};
use crate::error::ErrorCode;
use crate::exercise::{ExerciseType, Phase, PositionSide};
use crate::history::HistoryData;
use crate::joints::CalculatedJoints;

/// Restricts a rule block to the joints observable from the detected camera
/// side. UNKNOWN does not restrict.
fn filter_rules(
    block: &HashMap<String, AngleRange>,
    exercise: ExerciseType,
    side: PositionSide,
) -> HashMap<String, AngleRange> {
    if side.is_unknown() {
        return block.clone();
    }
    let allowed: HashSet<&'static str> = exercise
        .joints_for_side(side, true)
        .iter()
        .map(|j| j.name)
        .collect();
    block
        .iter()
        .filter(|(name, _)| allowed.contains(name.as_str()))
        .map(|(name, range)| (name.clone(), *range))
        .collect()
}

/// Whether the joints satisfy every rule of the block. A joint that is
/// missing or uncomputed fails the block.
fn block_matches(block: &HashMap<String, AngleRange>, joints: &CalculatedJoints) -> bool {
    block.iter().all(|(name, range)| {
        matches!(joints.get(name), Some(Some(value)) if range.contains(*value))
    })
}

fn candidate_phases(
    phases: &ExercisePhases,
    exercise: ExerciseType,
    side: PositionSide,
    joints: &CalculatedJoints,
) -> Vec<Phase> {
    exercise
        .phases()
        .iter()
        .copied()
        .filter(|phase| {
            phases
                .rules
                .get(phase)
                .map(|block| block_matches(&filter_rules(block, exercise, side), joints))
                .unwrap_or(false)
        })
        .collect()
}

fn next_expected(phases: &ExercisePhases, last: Phase) -> Option<Phase> {
    let order = &phases.transition_order;
    let index = order.iter().position(|&p| p == last)?;
    Some(order[(index + 1) % order.len()])
}

/// Determines the phase for the newest valid frame. Preference order:
/// continuity (hysteresis), then the next expected phase in the cycle, then
/// the first selectable candidate walking the cycle forward from the last
/// phase. Low-motion phases are gated on the low-motion streak.
pub fn determine_phase(
    config: &ConfigSet,
    exercise: ExerciseType,
    history: &HistoryData,
) -> Result<Phase, ErrorCode> {
    let phases = config.phases_for(exercise)?;
    let last_phase = history.phase_state();

    // Without a fresh valid frame there is nothing to decide on; keep
    // continuity.
    if !history.is_state_ok() || !history.is_last_frame_actually_valid() {
        return Ok(last_phase.unwrap_or(phases.initial_phase));
    }

    let frame = history
        .last_valid_frame()
        .ok_or(ErrorCode::NoValidFrameDataInSession)?;
    if frame.joints.is_empty() {
        return Err(ErrorCode::NoValidFrameDataInSession);
    }

    let side = history.position_side();
    let candidates = candidate_phases(phases, exercise, side, &frame.joints);

    // No candidate: borderline angles or a momentarily failing joint.
    // Returning "undetermined" would block feedback, so prefer continuity.
    if candidates.is_empty() {
        return Ok(last_phase.unwrap_or(phases.initial_phase));
    }

    if candidates.len() == 1 {
        let candidate = candidates[0];
        if let Some(last) = last_phase {
            // Hysteresis: a single off-cycle candidate does not displace the
            // current phase.
            if candidate != last && Some(candidate) != next_expected(phases, last) {
                return Ok(last);
            }
        }
        return Ok(candidate);
    }

    // Multiple candidates, typically from overlapping threshold bands.
    if let Some(last) = last_phase {
        if candidates.contains(&last) {
            return Ok(last);
        }
    }

    let low_motion_ready = history.low_motion_streak()
        >= config.settings.phase.phase_low_motion_threshold;

    if let Some(last) = last_phase {
        if let Some(next) = next_expected(phases, last) {
            if phases.low_motion_phases.contains(&next) && !low_motion_ready {
                // Do not enter HOLD-like phases while still moving.
                return Ok(last);
            }
            if candidates.contains(&next) {
                return Ok(next);
            }
        }
    }

    // Recovery from lost tracking: walk the cycle forward from the last
    // phase and take the first selectable candidate.
    let order = &phases.transition_order;
    let ordered: Vec<Phase> = match last_phase.and_then(|last| {
        order.iter().position(|&p| p == last)
    }) {
        Some(index) => order[index + 1..]
            .iter()
            .chain(order[..=index].iter())
            .copied()
            .collect(),
        None => order.clone(),
    };
    for phase in ordered {
        if candidates.contains(&phase) {
            if phases.low_motion_phases.contains(&phase) && !low_motion_ready {
                continue;
            }
            return Ok(phase);
        }
    }

    match last_phase {
        Some(last) => Ok(last),
        None => Err(ErrorCode::PhaseUndeterminedInFrame),
    }
}

/// Checks the provided joints against the configured initial phase's
/// (side-filtered) rule block.
pub fn ensure_initial_phase_correct(
    config: &ConfigSet,
    exercise: ExerciseType,
    side: PositionSide,
    joints: &CalculatedJoints,
) -> Result<bool, ErrorCode> {
    let phases = config.phases_for(exercise)?;
    let block = phases
        .rules
        .get(&phases.initial_phase)
        .ok_or(ErrorCode::PhaseThresholdsConfigFileError)?;
    Ok(block_matches(&filter_rules(block, exercise, side), joints))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(entries: &[(&str, f64, f64)]) -> HashMap<String, AngleRange> {
        entries
            .iter()
            .map(|(name, min, max)| {
                (
                    name.to_string(),
                    AngleRange {
                        min: *min,
                        max: *max,
                    },
                )
            })
            .collect()
    }

    fn joints(entries: &[(&str, f64)]) -> CalculatedJoints {
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), Some(*value)))
            .collect()
    }

    #[test]
    fn block_requires_every_joint() {
        let block = rules(&[("left_knee_angle", 100.0, 160.0)]);
        assert!(block_matches(&block, &joints(&[("left_knee_angle", 120.0)])));
        assert!(!block_matches(&block, &joints(&[("left_knee_angle", 90.0)])));
        assert!(!block_matches(&block, &joints(&[])));
        // Present but uncomputed fails too.
        let mut j = CalculatedJoints::new();
        j.insert("left_knee_angle".to_string(), None);
        assert!(!block_matches(&block, &j));
    }

    #[test]
    fn side_filter_removes_unobservable_joints() {
        let block = rules(&[
            ("left_knee_angle", 100.0, 160.0),
            ("right_knee_angle", 100.0, 160.0),
        ]);
        let filtered = filter_rules(&block, ExerciseType::Squat, PositionSide::Left);
        assert!(filtered.contains_key("left_knee_angle"));
        assert!(!filtered.contains_key("right_knee_angle"));
        let unfiltered = filter_rules(&block, ExerciseType::Squat, PositionSide::Unknown);
        assert_eq!(unfiltered.len(), 2);
    }

    #[test]
    fn next_expected_wraps_the_cycle() {
        let phases = ExercisePhases {
            rules: HashMap::new(),
            initial_phase: Phase::Top,
            transition_order: vec![Phase::Top, Phase::Down, Phase::Hold, Phase::Up, Phase::Top],
            low_motion_phases: HashSet::new(),
        };
        assert_eq!(next_expected(&phases, Phase::Top), Some(Phase::Down));
        assert_eq!(next_expected(&phases, Phase::Up), Some(Phase::Top));
    }
}
