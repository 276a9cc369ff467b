//! BodyTrack coaching server.
//! The HTTP surface: JSON routes over rocket, one shared session registry.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

#[macro_use]
extern crate rocket;

mod decode;
mod extractor;
mod icd;

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bodytrack_pipeline::config::SharedConfig;
use bodytrack_pipeline::error::ErrorCode;
use bodytrack_pipeline::extract::{PoseExtractor, StubExtractor};
use bodytrack_pipeline::frame::FrameData;
use bodytrack_pipeline::landmarks::{PoseLandmarks, NUM_LANDMARKS};
use bodytrack_pipeline::registry::SessionRegistry;
use bodytrack_pipeline::response::{AnalysisOutcome, ApiError, ManagementCode};
use bodytrack_pipeline::session::ClientInfo;
use bodytrack_pipeline::trace::TraceWriter;
use log::{info, warn};
use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::{Header, Status};
use rocket::request::{FromRequest, Outcome, Request};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rocket::State;
use serde_json::{json, Value};

use crate::extractor::CommandExtractor;
use crate::icd::{
    calibration_response, error_response, feedback_response, management_response, ping_response,
    status_for, summary_response,
};

type ApiResponse = Custom<Json<Value>>;

struct AppState {
    registry: Arc<SessionRegistry>,
}

fn ok(body: Value) -> ApiResponse {
    Custom(Status::Ok, Json(body))
}

fn fail(error: ApiError) -> ApiResponse {
    Custom(status_for(&error), Json(error_response(&error)))
}

fn management(result: Result<ManagementCode, ApiError>) -> ApiResponse {
    match result {
        Ok(code) => ok(management_response(code, None)),
        Err(error) => fail(error),
    }
}

/// Client identity taken from the connection: the first X-Forwarded-For
/// entry when present, otherwise the socket address. A missing User-Agent
/// is rejected.
struct ClientMeta(Result<ClientInfo, ErrorCode>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientMeta {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, ()> {
        let forwarded = request
            .headers()
            .get_one("X-Forwarded-For")
            .and_then(|raw| raw.split(',').next())
            .map(str::trim)
            .map(str::to_string);

        let ip: Result<IpAddr, ErrorCode> = match forwarded {
            Some(raw) => raw.parse().map_err(|_| ErrorCode::ClientIpIsInvalid),
            None => request.client_ip().ok_or(ErrorCode::ClientIpIsInvalid),
        };

        let meta = match ip {
            Err(code) => Err(code),
            Ok(ip) => match request.headers().get_one("User-Agent") {
                None => Err(ErrorCode::ClientAgentIsInvalid),
                Some(agent) => Ok(ClientInfo {
                    ip,
                    user_agent: agent.to_string(),
                }),
            },
        };
        Outcome::Success(ClientMeta(meta))
    }
}

/// Permissive CORS on every response; the mobile clients call from app
/// webviews with arbitrary origins.
struct Cors;

#[rocket::async_trait]
impl Fairing for Cors {
    fn info(&self) -> Info {
        Info {
            name: "cors-headers",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, _req: &'r Request<'_>, res: &mut rocket::Response<'r>) {
        res.set_header(Header::new("Access-Control-Allow-Origin", "*"));
        res.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "GET, POST, OPTIONS",
        ));
        res.set_header(Header::new("Access-Control-Allow-Headers", "Content-Type"));
    }
}

#[options("/<_..>")]
fn cors_preflight() -> Status {
    Status::NoContent
}

fn field_str<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key).and_then(Value::as_str)
}

#[get("/ping")]
fn ping() -> ApiResponse {
    info!("received ping request");
    ok(ping_response())
}

#[post("/register/new/session", data = "<body>")]
fn register_new_session(
    body: Json<Value>,
    client: ClientMeta,
    state: &State<AppState>,
) -> ApiResponse {
    let client = match client.0 {
        Ok(client) => client,
        Err(code) => return fail(code.into()),
    };
    let Some(exercise_type) = field_str(&body, "exercise_type") else {
        return fail(ErrorCode::MissingExerciseTypeInRequest.into());
    };
    match state.registry.register(exercise_type, client) {
        Ok((code, session_id)) => ok(management_response(
            code,
            Some(json!({ "session_id": session_id.to_string() })),
        )),
        Err(error) => fail(error),
    }
}

#[post("/unregister/session", data = "<body>")]
fn unregister_session(body: Json<Value>, state: &State<AppState>) -> ApiResponse {
    let Some(session_id) = field_str(&body, "session_id") else {
        return fail(ErrorCode::MissingSessionIdInRequest.into());
    };
    management(state.registry.unregister(session_id))
}

fn start_session_impl(body: &Value, state: &AppState) -> ApiResponse {
    let Some(session_id) = field_str(body, "session_id") else {
        return fail(ErrorCode::MissingSessionIdInRequest.into());
    };
    let extended = match body.get("extended_evaluation") {
        Some(Value::Bool(flag)) => *flag,
        Some(_) => return fail(ErrorCode::InvalidExtendedEvaluationParam.into()),
        None => false,
    };
    management(state.registry.start(session_id, extended))
}

#[post("/start/session", data = "<body>")]
fn start_session(body: Json<Value>, state: &State<AppState>) -> ApiResponse {
    start_session_impl(&body, state)
}

/// Backward-compatible alias kept for older clients.
#[post("/start_analysis", data = "<body>")]
fn start_analysis(body: Json<Value>, state: &State<AppState>) -> ApiResponse {
    start_session_impl(&body, state)
}

#[post("/pause/session", data = "<body>")]
fn pause_session(body: Json<Value>, state: &State<AppState>) -> ApiResponse {
    let Some(session_id) = field_str(&body, "session_id") else {
        return fail(ErrorCode::MissingSessionIdInRequest.into());
    };
    management(state.registry.pause(session_id))
}

#[post("/resume/session", data = "<body>")]
fn resume_session(body: Json<Value>, state: &State<AppState>) -> ApiResponse {
    let Some(session_id) = field_str(&body, "session_id") else {
        return fail(ErrorCode::MissingSessionIdInRequest.into());
    };
    management(state.registry.resume(session_id))
}

#[post("/end/session", data = "<body>")]
fn end_session(body: Json<Value>, state: &State<AppState>) -> ApiResponse {
    let Some(session_id) = field_str(&body, "session_id") else {
        return fail(ErrorCode::MissingSessionIdInRequest.into());
    };
    management(state.registry.end(session_id))
}

#[post("/analyze", data = "<body>")]
fn analyze(body: Json<Value>, state: &State<AppState>) -> ApiResponse {
    let session_id = field_str(&body, "session_id");
    let frame_id = body.get("frame_id").and_then(Value::as_u64);
    let content = field_str(&body, "frame_content");
    let (Some(session_id), Some(frame_id), Some(content)) = (session_id, frame_id, content) else {
        return fail(ErrorCode::MissingFrameDataInRequest.into());
    };

    let frame_settings = state.registry.config().current().settings.frame.clone();
    let decoded = match decode::decode_frame(content, &frame_settings) {
        Ok(decoded) => decoded,
        Err(code) => return fail(code.into()),
    };
    let frame = FrameData::new(frame_id, decoded.width, decoded.height, decoded.pixels);

    match state.registry.analyze_frame(session_id, frame) {
        Ok(AnalysisOutcome::Calibration(code)) => ok(calibration_response(code)),
        Ok(AnalysisOutcome::Feedback(code)) => ok(feedback_response(code)),
        Err(error) => fail(error),
    }
}

#[post("/session/status", data = "<body>")]
fn session_status(body: Json<Value>, state: &State<AppState>) -> ApiResponse {
    let Some(session_id) = field_str(&body, "session_id") else {
        return fail(ErrorCode::MissingSessionIdInRequest.into());
    };
    management(state.registry.status(session_id))
}

#[post("/session/summary", data = "<body>")]
fn session_summary(body: Json<Value>, state: &State<AppState>) -> ApiResponse {
    let Some(session_id) = field_str(&body, "session_id") else {
        return fail(ErrorCode::MissingSessionIdInRequest.into());
    };
    match state.registry.summary(session_id) {
        Ok(summary) => ok(summary_response(&summary)),
        Err(error) => fail(error),
    }
}

#[get("/internal/telemetry")]
fn telemetry(state: &State<AppState>) -> ApiResponse {
    let mut snapshot = state.registry.debug_state();
    let memory_mb = sysinfo::get_current_pid()
        .ok()
        .and_then(|pid| {
            let mut system = sysinfo::System::new();
            system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
            system
                .process(pid)
                .map(|p| p.memory() as f64 / 1024.0 / 1024.0)
        })
        .unwrap_or(0.0);
    snapshot["memory_mb"] = json!(memory_mb);
    snapshot["timestamp"] = json!(chrono::Utc::now().to_rfc3339());
    ok(snapshot)
}

#[get("/refresh/configurations")]
fn refresh_configurations(state: &State<AppState>) -> ApiResponse {
    match state.registry.refresh_configurations() {
        Ok(()) => ok(management_response(
            ManagementCode::ConfigurationUpdatedSuccessfully,
            None,
        )),
        Err(error) => fail(error),
    }
}

#[post("/terminate/server", data = "<body>")]
fn terminate_server(body: Json<Value>, state: &State<AppState>) -> ApiResponse {
    let Some(password) = field_str(&body, "password") else {
        return fail(ErrorCode::InvalidJsonPayloadInRequest.into());
    };
    let expected = state
        .registry
        .config()
        .current()
        .settings
        .communication
        .termination_password
        .clone();
    if password != expected {
        return fail(ErrorCode::TerminationIncorrectPassword.into());
    }

    warn!("termination requested, shutting down");
    // Let the response flush before the process exits.
    thread::spawn(|| {
        thread::sleep(Duration::from_secs(1));
        std::process::exit(0);
    });
    ok(management_response(
        ManagementCode::ServerIsBeingShutdown,
        None,
    ))
}

#[catch(400)]
fn catch_bad_request() -> Json<Value> {
    Json(error_response(
        &ErrorCode::InvalidJsonPayloadInRequest.into(),
    ))
}

#[catch(422)]
fn catch_unprocessable() -> Json<Value> {
    Json(error_response(
        &ErrorCode::InvalidJsonPayloadInRequest.into(),
    ))
}

#[catch(404)]
fn catch_not_found() -> Json<Value> {
    Json(error_response(
        &ErrorCode::InvalidJsonPayloadInRequest.into(),
    ))
}

#[catch(500)]
fn catch_internal() -> Json<Value> {
    Json(error_response(&ErrorCode::InternalServerError.into()))
}

fn build_extractor(config: &SharedConfig) -> Arc<dyn PoseExtractor> {
    match &config.current().settings.pose.extractor_command {
        Some(program) => {
            info!("pose extractor sidecar: {}", program.display());
            Arc::new(CommandExtractor::new(program.clone()))
        }
        None => {
            warn!("no pose extractor configured; frames will classify as NO_PERSON");
            let empty =
                PoseLandmarks::from_rows(&[[0.0; 4]; NUM_LANDMARKS]).expect("empty matrix");
            Arc::new(StubExtractor::constant(empty))
        }
    }
}

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config_dir = std::env::var("BODYTRACK_CONFIG_DIR").unwrap_or_else(|_| "config".into());
    let config = SharedConfig::load(PathBuf::from(&config_dir))
        .map_err(|code| anyhow::anyhow!("cannot load configuration from {config_dir}: {code}"))?;

    let settings = config.current().settings.clone();
    let trace_writer = if settings.trace.write_frame_traces {
        Arc::new(TraceWriter::new(&settings.trace.trace_dir)?)
    } else {
        Arc::new(TraceWriter::disabled())
    };

    let extractor = build_extractor(&config);
    let registry = Arc::new(SessionRegistry::new(config, extractor, trace_writer));
    registry.spawn_background_tasks();

    let figment = rocket::Config::figment()
        .merge(("address", settings.communication.host.as_str()))
        .merge(("port", settings.communication.port));

    info!(
        "listening on {}:{}",
        settings.communication.host, settings.communication.port
    );

    let _ = rocket::custom(figment)
        .manage(AppState { registry })
        .attach(Cors)
        .mount(
            "/",
            routes![
                cors_preflight,
                ping,
                register_new_session,
                unregister_session,
                start_session,
                start_analysis,
                pause_session,
                resume_session,
                end_session,
                analyze,
                session_status,
                session_summary,
                telemetry,
                refresh_configurations,
                terminate_server,
            ],
        )
        .register(
            "/",
            catchers![
                catch_bad_request,
                catch_unprocessable,
                catch_not_found,
                catch_internal
            ],
        )
        .launch()
        .await?;

    Ok(())
}
