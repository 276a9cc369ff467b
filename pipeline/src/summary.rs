//! SPDX-License-Identifier: GPL-3.0-or-later

//! End-of-session summary: repetition metrics, a penalty-based grade and the
//! top-error recommendations.

use crate::config::SummarySettings;
use crate::response::{AggregatedError, SummaryResponse};
use crate::session::SessionData;

/// Builds the summary payload from the session's final history.
pub fn build_summary(settings: &SummarySettings, session: &SessionData) -> SummaryResponse {
    let history = &session.history;

    let reps = history.repetitions();
    let average_rep_duration_seconds = if reps.is_empty() {
        0.0
    } else {
        reps.iter().map(|r| r.duration_seconds).sum::<f64>() / reps.len() as f64
    };

    // Only actual movement faults count against the grade; the sentinels
    // are bookkeeping.
    let total_errors: u32 = history
        .error_counters()
        .iter()
        .filter(|(error, _)| error.is_biomechanical())
        .map(|(_, &count)| count)
        .sum();
    let overall_grade =
        (settings.max_grade - total_errors as f64 * settings.penalty_per_error).max(0.0);

    let mut aggregated: Vec<_> = history
        .error_counters()
        .iter()
        .map(|(&error, &count)| (error, count))
        .collect();
    aggregated.sort_by_key(|&(error, count)| (std::cmp::Reverse(count), error.code()));

    let recommendations: Vec<String> = aggregated
        .iter()
        .filter(|(error, count)| *count > 0 && error.is_biomechanical())
        .take(settings.number_of_top_errors)
        .map(|(error, _)| error.recommendation().to_string())
        .collect();

    SummaryResponse {
        session_id: session.session_id.to_string(),
        exercise_type: session.exercise_type.name().to_string(),
        session_duration_seconds: history.exercise_final_duration().unwrap_or(0.0),
        number_of_reps: history.rep_count(),
        average_rep_duration_seconds,
        overall_grade,
        rep_breakdown: reps.to_vec(),
        aggregated_errors: aggregated
            .into_iter()
            .map(|(error, count)| AggregatedError::new(error, count))
            .collect(),
        recommendations,
    }
}
