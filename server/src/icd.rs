//! SPDX-License-Identifier: GPL-3.0-or-later

//! The client-server message envelope. Every body carries `message_type`;
//! non-error responses add `response_type` and merge the code payload.

use bodytrack_pipeline::feedback::FeedbackCode;
use bodytrack_pipeline::response::{
    ApiError, CalibrationCode, ManagementCode, SummaryResponse,
};
use rocket::http::Status;
use serde_json::{json, Map, Value};

fn merge(mut base: Map<String, Value>, payload: Value) -> Value {
    if let Value::Object(fields) = payload {
        base.extend(fields);
    }
    Value::Object(base)
}

fn response_base(response_type: &str) -> Map<String, Value> {
    let mut base = Map::new();
    base.insert("message_type".into(), json!("RESPONSE"));
    base.insert("response_type".into(), json!(response_type));
    base
}

pub fn ping_response() -> Value {
    Value::Object(response_base("PING"))
}

pub fn management_response(code: ManagementCode, extra_info: Option<Value>) -> Value {
    let mut payload = json!({
        "code": code.code(),
        "description": code.description(),
    });
    if let Some(extra) = extra_info {
        payload["extra_info"] = extra;
    }
    merge(response_base("MANAGEMENT"), payload)
}

pub fn calibration_response(code: CalibrationCode) -> Value {
    merge(
        response_base("CALIBRATION"),
        json!({
            "code": code.code(),
            "description": code.description(),
        }),
    )
}

pub fn feedback_response(code: FeedbackCode) -> Value {
    merge(
        response_base("FEEDBACK"),
        json!({
            "code": code.code(),
            "description": code.description(),
        }),
    )
}

pub fn summary_response(summary: &SummaryResponse) -> Value {
    let payload = serde_json::to_value(summary).unwrap_or_else(|_| json!({}));
    merge(response_base("SUMMARY"), payload)
}

/// Error envelope: `{message_type: ERROR, code, description, extra_info?}`.
pub fn error_response(error: &ApiError) -> Value {
    let mut body = json!({
        "message_type": "ERROR",
        "code": error.code.code(),
        "description": error.code.description(),
    });
    if let Some(extra) = &error.extra_info {
        body["extra_info"] = extra.clone();
    }
    body
}

/// HTTP status policy: admission failures and internal faults are 500,
/// the wrong termination password is 401, everything else client-side 400.
pub fn status_for(error: &ApiError) -> Status {
    use bodytrack_pipeline::error::ErrorCode;
    match error.code {
        ErrorCode::MaxClientReached | ErrorCode::InternalServerError => {
            Status::InternalServerError
        }
        ErrorCode::TerminationIncorrectPassword => Status::Unauthorized,
        code if code.is_critical() => Status::InternalServerError,
        _ => Status::BadRequest,
    }
}
