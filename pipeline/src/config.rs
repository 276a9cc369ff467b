//! SPDX-License-Identifier: GPL-3.0-or-later

//! Configuration loading and validation.
//!
//! Three JSON documents drive the server: `server.json` (typed settings),
//! the phase-rule file and the error-threshold file referenced from it.
//! A malformed document is a startup abort; at runtime the whole set is
//! reloaded and swapped atomically behind [`SharedConfig`].

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use log::{error, info};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ErrorCode;
use crate::exercise::{ExerciseType, Phase, PositionSide};

/// Typed view of `server.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub communication: CommunicationSettings,
    pub frame: FrameSettings,
    pub session: SessionSettings,
    pub tasks: TaskSettings,
    pub pose: PoseSettings,
    pub position_side: SideSettings,
    pub joints: JointSettings,
    pub phase: PhaseSettings,
    pub error: ErrorSettings,
    pub history: HistorySettings,
    pub feedback: FeedbackSettings,
    pub summary: SummarySettings,
    #[serde(default)]
    pub trace: TraceSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommunicationSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub termination_password: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrameSettings {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    pub supported_exercises: Vec<String>,
    pub maximum_clients: usize,
    pub num_of_min_init_ok_frames: u32,
    pub num_of_min_init_correct_phase_frames: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskSettings {
    pub cleanup_interval_minutes: u64,
    pub max_registration_minutes: u64,
    pub max_inactive_minutes: u64,
    pub max_pause_minutes: u64,
    pub max_ended_retention: u64,
    pub retrieve_configuration_minutes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoseSettings {
    pub stability_threshold: f32,
    pub bbox_too_far: f32,
    pub minimum_bbox_area: f32,
    pub visibility_good_threshold: f32,
    pub required_visibility_ratio: f32,
    /// Sidecar executable implementing the landmark extraction seam. Without
    /// it the server runs but classifies every frame as NO_PERSON.
    #[serde(default)]
    pub extractor_command: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SideSettings {
    pub landmark_visibility_threshold: f32,
    pub dominance_ratio_threshold: f32,
    pub front_symmetry_threshold: f32,
    pub min_required_landmark_ratio: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JointSettings {
    pub visibility_threshold: f32,
    pub min_valid_joint_ratio: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhaseSettings {
    pub phase_low_motion_threshold: u32,
    pub phase_detector_config_file: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorSettings {
    pub error_detector_config_file: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistorySettings {
    pub frames_rolling_window_size: usize,
    pub bad_frame_log_size: usize,
    pub recovery_ok_threshold: u32,
    pub bad_stability_limit: u32,
    pub max_consecutive_invalid_before_abort: u32,
    pub low_motion_angle_degrees_threshold: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackSettings {
    pub pose_quality_feedback_threshold: u32,
    pub bio_feedback_threshold: u32,
    pub cooldown_frames: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SummarySettings {
    pub number_of_top_errors: usize,
    pub penalty_per_error: f64,
    pub max_grade: f64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TraceSettings {
    #[serde(default)]
    pub write_frame_traces: bool,
    #[serde(default = "default_trace_dir")]
    pub trace_dir: PathBuf,
}

fn default_trace_dir() -> PathBuf {
    PathBuf::from("output/traces")
}

impl Settings {
    /// Exercises the server will register sessions for. Unknown names in the
    /// configured list are rejected at load.
    pub fn supported_exercises(&self) -> Result<Vec<ExerciseType>, ErrorCode> {
        self.session
            .supported_exercises
            .iter()
            .map(|name| ExerciseType::parse(name))
            .collect()
    }
}

/// Inclusive angle range in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct AngleRange {
    pub min: f64,
    pub max: f64,
}

impl AngleRange {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Parsed and validated phase configuration for one exercise.
#[derive(Debug, Clone)]
pub struct ExercisePhases {
    /// Per phase: joint name to allowed range. A phase matches a frame when
    /// every listed joint is present and inside its range.
    pub rules: HashMap<Phase, HashMap<String, AngleRange>>,
    pub initial_phase: Phase,
    /// First element equals last element; the cycle of one repetition.
    pub transition_order: Vec<Phase>,
    pub low_motion_phases: HashSet<Phase>,
}

/// Per-exercise, per-phase error thresholds. The joint order inside each
/// phase block is the JSON document order and defines detection priority.
pub type ErrorThresholds = HashMap<ExerciseType, HashMap<Phase, Vec<(String, AngleRange)>>>;

/// The complete configuration set the pipeline runs against.
#[derive(Debug, Clone)]
pub struct ConfigSet {
    pub settings: Settings,
    pub phases: HashMap<ExerciseType, ExercisePhases>,
    pub errors: ErrorThresholds,
}

impl ConfigSet {
    /// Loads `server.json` from `dir` plus the two rule files it names.
    /// Relative rule-file paths are resolved against `dir`.
    pub fn load(dir: &Path) -> Result<Self, ErrorCode> {
        let settings = load_settings(&dir.join("server.json"))?;
        settings.supported_exercises()?;

        let phase_path = resolve(dir, &settings.phase.phase_detector_config_file);
        let error_path = resolve(dir, &settings.error.error_detector_config_file);

        let phases = load_phase_config(&phase_path)?;
        let errors = load_error_thresholds(&error_path)?;

        // Every supported exercise needs both rule tables.
        for exercise in settings.supported_exercises()? {
            if !phases.contains_key(&exercise) {
                error!("missing phase config for exercise {exercise}");
                return Err(ErrorCode::PhaseThresholdsConfigFileError);
            }
            if !errors.contains_key(&exercise) {
                error!("missing error thresholds for exercise {exercise}");
                return Err(ErrorCode::ErrorDetectorConfigError);
            }
        }

        info!("configuration loaded from {}", dir.display());
        Ok(ConfigSet {
            settings,
            phases,
            errors,
        })
    }

    pub fn phases_for(&self, exercise: ExerciseType) -> Result<&ExercisePhases, ErrorCode> {
        self.phases
            .get(&exercise)
            .ok_or(ErrorCode::PhaseThresholdsConfigFileError)
    }

    pub fn error_thresholds_for(
        &self,
        exercise: ExerciseType,
        phase: Phase,
    ) -> Result<&[(String, AngleRange)], ErrorCode> {
        self.errors
            .get(&exercise)
            .and_then(|per_phase| per_phase.get(&phase))
            .map(|v| v.as_slice())
            .ok_or(ErrorCode::ErrorDetectorConfigError)
    }
}

fn resolve(dir: &Path, file: &Path) -> PathBuf {
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        dir.join(file)
    }
}

fn read_json(path: &Path) -> Result<Value, ErrorCode> {
    let text = fs::read_to_string(path).map_err(|e| {
        error!("cannot read {}: {e}", path.display());
        ErrorCode::ConfigurationFileDoesNotExist
    })?;
    serde_json::from_str(&text).map_err(|e| {
        error!("cannot parse {}: {e}", path.display());
        ErrorCode::ConfigFileParseError
    })
}

fn load_settings(path: &Path) -> Result<Settings, ErrorCode> {
    let value = read_json(path)?;
    serde_json::from_value(value).map_err(|e| {
        error!("invalid settings in {}: {e}", path.display());
        ErrorCode::ConfigParamDoesNotExist
    })
}

/// Parses and validates the phase rule file. Validation enforces:
/// every non-none phase has a rule block, joints belong to the exercise's
/// schema, min <= max, and the transition order is a cycle starting with the
/// initial phase.
pub fn load_phase_config(path: &Path) -> Result<HashMap<ExerciseType, ExercisePhases>, ErrorCode> {
    let value = read_json(path)?;
    parse_phase_config(&value)
}

pub fn parse_phase_config(
    value: &Value,
) -> Result<HashMap<ExerciseType, ExercisePhases>, ErrorCode> {
    let document = value
        .as_object()
        .filter(|m| !m.is_empty())
        .ok_or(ErrorCode::PhaseThresholdsConfigFileError)?;

    let mut result = HashMap::new();
    for (exercise_name, block) in document {
        let exercise = ExerciseType::parse(exercise_name)?;
        let block = block
            .as_object()
            .ok_or(ErrorCode::PhaseThresholdsConfigFileError)?;

        let rules_value = block
            .get("rules")
            .and_then(Value::as_object)
            .ok_or(ErrorCode::PhaseThresholdsConfigFileError)?;
        let initial_name = block
            .get("initial_phase")
            .and_then(Value::as_str)
            .ok_or(ErrorCode::PhaseThresholdsConfigFileError)?;
        let order_value = block
            .get("transition_order")
            .and_then(Value::as_array)
            .ok_or(ErrorCode::PhaseThresholdsConfigFileError)?;
        let low_motion_value = block
            .get("low_motion_phases")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let initial_phase = Phase::parse(exercise, initial_name)?;

        let allowed_joint_names: HashSet<&'static str> = exercise
            .joints_for_side(PositionSide::Front, true)
            .iter()
            .map(|j| j.name)
            .collect();

        let mut rules: HashMap<Phase, HashMap<String, AngleRange>> = HashMap::new();
        for (phase_name, joints_value) in rules_value {
            let phase = Phase::parse(exercise, phase_name)?;
            let joints = joints_value
                .as_object()
                .filter(|m| !m.is_empty())
                .ok_or(ErrorCode::PhaseThresholdsConfigFileError)?;
            let mut phase_rules = HashMap::new();
            for (joint_name, range_value) in joints {
                if !allowed_joint_names.contains(joint_name.as_str()) {
                    error!("unknown joint '{joint_name}' in phase rules for {exercise_name}");
                    return Err(ErrorCode::PhaseThresholdsConfigFileError);
                }
                let range = parse_range(range_value)?;
                phase_rules.insert(joint_name.clone(), range);
            }
            rules.insert(phase, phase_rules);
        }

        // Every phase of the exercise must carry a rule block.
        for phase in exercise.phases() {
            if !rules.contains_key(phase) {
                error!("missing rules for phase {phase} of {exercise_name}");
                return Err(ErrorCode::PhaseThresholdsConfigFileError);
            }
        }

        let mut transition_order = Vec::with_capacity(order_value.len());
        for entry in order_value {
            let name = entry
                .as_str()
                .ok_or(ErrorCode::PhaseThresholdsConfigFileError)?;
            transition_order.push(Phase::parse(exercise, name)?);
        }
        if transition_order.len() < 2
            || transition_order.first() != transition_order.last()
            || transition_order[0] != initial_phase
        {
            error!("invalid transition order for {exercise_name}");
            return Err(ErrorCode::PhaseThresholdsConfigFileError);
        }

        let mut low_motion_phases = HashSet::new();
        for entry in &low_motion_value {
            let name = entry
                .as_str()
                .ok_or(ErrorCode::PhaseThresholdsConfigFileError)?;
            low_motion_phases.insert(Phase::parse(exercise, name)?);
        }

        result.insert(
            exercise,
            ExercisePhases {
                rules,
                initial_phase,
                transition_order,
                low_motion_phases,
            },
        );
    }
    Ok(result)
}

/// Parses and validates the error-threshold file. Joint order within each
/// phase block is preserved; it is the detector's priority order.
pub fn load_error_thresholds(path: &Path) -> Result<ErrorThresholds, ErrorCode> {
    let value = read_json(path)?;
    parse_error_thresholds(&value)
}

pub fn parse_error_thresholds(value: &Value) -> Result<ErrorThresholds, ErrorCode> {
    let document = value
        .as_object()
        .filter(|m| !m.is_empty())
        .ok_or(ErrorCode::ErrorDetectorConfigError)?;

    let mut result: ErrorThresholds = HashMap::new();
    for (exercise_name, block) in document {
        let exercise = ExerciseType::parse(exercise_name)?;
        let block = block
            .as_object()
            .ok_or(ErrorCode::ErrorDetectorConfigError)?;

        let allowed_joint_names: HashSet<&'static str> = exercise
            .joints_for_side(PositionSide::Front, true)
            .iter()
            .map(|j| j.name)
            .collect();

        let mut per_phase: HashMap<Phase, Vec<(String, AngleRange)>> = HashMap::new();
        for (phase_name, joints_value) in block {
            let phase = Phase::parse(exercise, phase_name)?;
            let joints = joints_value
                .as_object()
                .ok_or(ErrorCode::ErrorDetectorConfigError)?;
            let mut ordered = Vec::with_capacity(joints.len());
            for (joint_name, range_value) in joints {
                if !allowed_joint_names.contains(joint_name.as_str()) {
                    error!("unknown joint '{joint_name}' in error thresholds for {exercise_name}");
                    return Err(ErrorCode::ErrorDetectorConfigError);
                }
                ordered.push((joint_name.clone(), parse_range(range_value)?));
            }
            per_phase.insert(phase, ordered);
        }

        for phase in exercise.phases() {
            if !per_phase.contains_key(phase) {
                error!("missing error thresholds for phase {phase} of {exercise_name}");
                return Err(ErrorCode::ErrorDetectorConfigError);
            }
        }

        result.insert(exercise, per_phase);
    }
    Ok(result)
}

fn parse_range(value: &Value) -> Result<AngleRange, ErrorCode> {
    let range: AngleRange = serde_json::from_value(value.clone())
        .map_err(|_| ErrorCode::PhaseThresholdsConfigFileError)?;
    if range.min > range.max {
        return Err(ErrorCode::PhaseThresholdsConfigFileError);
    }
    Ok(range)
}

/// Atomically swappable configuration handle. Readers clone the inner `Arc`
/// once per request; `refresh` replaces the whole set.
#[derive(Clone)]
pub struct SharedConfig {
    dir: PathBuf,
    inner: Arc<RwLock<Arc<ConfigSet>>>,
}

impl SharedConfig {
    pub fn load(dir: impl Into<PathBuf>) -> Result<Self, ErrorCode> {
        let dir = dir.into();
        let set = ConfigSet::load(&dir)?;
        Ok(SharedConfig {
            dir,
            inner: Arc::new(RwLock::new(Arc::new(set))),
        })
    }

    /// Wraps an already-built set; used by tests that assemble configuration
    /// in memory.
    pub fn from_set(set: ConfigSet) -> Self {
        SharedConfig {
            dir: PathBuf::new(),
            inner: Arc::new(RwLock::new(Arc::new(set))),
        }
    }

    pub fn current(&self) -> Arc<ConfigSet> {
        self.inner.read().expect("config lock poisoned").clone()
    }

    /// Reloads from disk and swaps. On failure the previous set stays in
    /// effect.
    pub fn refresh(&self) -> Result<(), ErrorCode> {
        if self.dir.as_os_str().is_empty() {
            return Ok(());
        }
        let set = ConfigSet::load(&self.dir)?;
        *self.inner.write().expect("config lock poisoned") = Arc::new(set);
        info!("configuration refreshed");
        Ok(())
    }
}
