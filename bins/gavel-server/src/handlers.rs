//! HTTP route handlers: request shapes, validation, and the response
//! envelope. Everything here is a thin adapter; the engine, queue and
//! evaluator do the real work.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use gavel_common::config::Config;
use gavel_common::languages;
use gavel_common::types::{
    CaseResult, JudgeSummary, Submission, Verdict, MAX_BATCH_SUBMISSIONS, MAX_TEST_CASES,
    MIN_MEMORY_LIMIT_MB, MIN_TIME_LIMIT_S,
};

use crate::evaluator;
use crate::queue::QueueError;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub language: String,
    pub code: String,
    #[serde(default)]
    pub input: String,
    pub time_limit: Option<u64>,
    pub memory_limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseInput {
    pub input: String,
    pub expected_output: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeRequest {
    pub language: String,
    pub code: String,
    pub time_limit: Option<u64>,
    pub memory_limit: Option<u64>,
    pub test_cases: Vec<TestCaseInput>,
}

#[derive(Debug, Deserialize)]
pub struct BatchJudgeRequest {
    pub submissions: Vec<JudgeRequest>,
}

pub fn success(data: impl serde::Serialize) -> Response {
    (StatusCode::OK, Json(json!({ "success": true, "data": data }))).into_response()
}

pub fn error_response(status: StatusCode, message: &str, fields: Option<Vec<String>>) -> Response {
    let mut error = json!({ "message": message });
    if let Some(fields) = fields {
        error["fields"] = json!(fields);
    }
    (status, Json(json!({ "success": false, "error": error }))).into_response()
}

fn bad_payload(rejection: JsonRejection) -> Response {
    let status = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        StatusCode::PAYLOAD_TOO_LARGE
    } else {
        StatusCode::BAD_REQUEST
    };
    error_response(status, &rejection.body_text(), None)
}

/// GET /api/health: liveness plus a queue and memory snapshot.
pub async fn health(State(state): State<AppState>) -> Response {
    success(json!({
        "status": "ok",
        "queue": state.queue.status(),
        "memory": { "rssKb": process_rss_kb() },
    }))
}

/// GET /api/languages: catalogue, limits and the verdict dictionary.
pub async fn languages(State(state): State<AppState>) -> Response {
    let entries: Vec<_> = languages::all()
        .iter()
        .map(|language| {
            json!({
                "tag": language.tag,
                "name": language.display_name,
                "sourceFile": language.source_file,
            })
        })
        .collect();
    let verdicts: serde_json::Map<String, serde_json::Value> = Verdict::ALL
        .iter()
        .map(|verdict| (verdict.tag().to_string(), json!(verdict.description())))
        .collect();

    success(json!({
        "languages": entries,
        "limits": {
            "maxCodeSize": state.config.max_code_size,
            "timeLimit": {
                "min": MIN_TIME_LIMIT_S,
                "default": state.config.default_time_limit_s,
                "max": state.config.max_time_limit_s,
            },
            "memoryLimit": {
                "min": MIN_MEMORY_LIMIT_MB,
                "default": state.config.default_memory_limit_mb,
                "max": state.config.max_memory_limit_mb,
            },
            "maxTestCases": MAX_TEST_CASES,
            "maxBatchSubmissions": MAX_BATCH_SUBMISSIONS,
        },
        "verdicts": verdicts,
    }))
}

/// POST /api/execute: run once against a single stdin payload.
pub async fn execute(
    State(state): State<AppState>,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return bad_payload(rejection),
    };

    let errors = validate_execute(&state.config, &request);
    if !errors.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Invalid request", Some(errors));
    }

    let submission = Submission {
        language: request.language,
        source: request.code,
        time_limit_s: request.time_limit.unwrap_or(state.config.default_time_limit_s),
        memory_limit_mb: request
            .memory_limit
            .unwrap_or(state.config.default_memory_limit_mb),
        inputs: vec![request.input],
    };

    info!(language = %submission.language, "execute request admitted");
    match run_one(&state, submission).await {
        Ok(result) => success(result),
        Err(err) => err.into_response(),
    }
}

/// POST /api/judge: run against test cases and compare outputs.
pub async fn judge(
    State(state): State<AppState>,
    payload: Result<Json<JudgeRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return bad_payload(rejection),
    };

    let errors = validate_judge(&state.config, &request);
    if !errors.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Invalid request", Some(errors));
    }

    info!(
        language = %request.language,
        cases = request.test_cases.len(),
        "judge request admitted"
    );
    match judge_one(&state, request).await {
        Ok(summary) => success(summary),
        Err(err) => err.into_response(),
    }
}

/// POST /api/batch-judge: up to 10 independent judge submissions, run
/// sequentially. Each entry in `results` carries its own success flag, so a
/// transient failure on one submission never discards the others.
pub async fn batch_judge(
    State(state): State<AppState>,
    payload: Result<Json<BatchJudgeRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return bad_payload(rejection),
    };

    let mut errors = Vec::new();
    if request.submissions.is_empty() {
        errors.push("submissions: must contain at least one submission".to_string());
    }
    if request.submissions.len() > MAX_BATCH_SUBMISSIONS {
        errors.push(format!(
            "submissions: at most {MAX_BATCH_SUBMISSIONS} submissions per batch"
        ));
    }
    for (index, submission) in request.submissions.iter().enumerate() {
        for error in validate_judge(&state.config, submission) {
            errors.push(format!("submissions[{index}].{error}"));
        }
    }
    if !errors.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Invalid request", Some(errors));
    }

    info!(count = request.submissions.len(), "batch judge admitted");
    let mut results = Vec::with_capacity(request.submissions.len());
    for submission in request.submissions {
        let entry = match judge_one(&state, submission).await {
            Ok(summary) => json!({ "success": true, "data": summary }),
            Err(err) => err.payload(),
        };
        results.push(entry);
    }

    let total = results.len();
    success(json!({ "results": results, "total": total }))
}

pub async fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "Route not found", None)
}

/// A failed submission, as either a standalone HTTP response or a per-item
/// entry inside a batch result.
struct RequestError {
    status: StatusCode,
    message: &'static str,
}

impl RequestError {
    fn into_response(self) -> Response {
        error_response(self.status, self.message, None)
    }

    fn payload(&self) -> serde_json::Value {
        json!({ "success": false, "error": { "message": self.message } })
    }
}

async fn run_one(state: &AppState, submission: Submission) -> Result<CaseResult, RequestError> {
    let engine = state.engine.clone();
    let receiver = state
        .queue
        .enqueue(move || async move { engine.execute_one(submission).await })
        .map_err(queue_error)?;
    match receiver.await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(err)) => Err(queue_error(err)),
        Err(_) => Err(TASK_DROPPED),
    }
}

async fn judge_one(state: &AppState, request: JudgeRequest) -> Result<JudgeSummary, RequestError> {
    let expected: Vec<String> = request
        .test_cases
        .iter()
        .map(|case| case.expected_output.clone())
        .collect();
    let submission = Submission {
        language: request.language,
        source: request.code,
        time_limit_s: request.time_limit.unwrap_or(state.config.default_time_limit_s),
        memory_limit_mb: request
            .memory_limit
            .unwrap_or(state.config.default_memory_limit_mb),
        inputs: request
            .test_cases
            .into_iter()
            .map(|case| case.input)
            .collect(),
    };

    let engine = state.engine.clone();
    let receiver = state
        .queue
        .enqueue(move || async move { engine.execute_batch(submission).await })
        .map_err(queue_error)?;
    match receiver.await {
        Ok(Ok(results)) => Ok(evaluator::aggregate(&results, &expected)),
        Ok(Err(err)) => Err(queue_error(err)),
        Err(_) => Err(TASK_DROPPED),
    }
}

const TASK_DROPPED: RequestError = RequestError {
    status: StatusCode::INTERNAL_SERVER_ERROR,
    message: "Execution task was dropped",
};

fn queue_error(err: QueueError) -> RequestError {
    match err {
        QueueError::Saturated => RequestError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: "Judge queue is full, try again later",
        },
        QueueError::ShuttingDown => RequestError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: "Judge is shutting down",
        },
        QueueError::Task(err) => {
            error!(error = %err, "execution task failed");
            RequestError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "Execution failed",
            }
        }
    }
}

fn validate_execute(config: &Config, request: &ExecuteRequest) -> Vec<String> {
    let mut errors = validate_common(
        config,
        &request.language,
        &request.code,
        request.time_limit,
        request.memory_limit,
    );
    if request.input.len() > config.max_code_size {
        errors.push(format!(
            "input: exceeds {} bytes",
            config.max_code_size
        ));
    }
    errors
}

fn validate_judge(config: &Config, request: &JudgeRequest) -> Vec<String> {
    let mut errors = validate_common(
        config,
        &request.language,
        &request.code,
        request.time_limit,
        request.memory_limit,
    );
    if request.test_cases.is_empty() {
        errors.push("testCases: must contain at least one test case".to_string());
    }
    if request.test_cases.len() > MAX_TEST_CASES {
        errors.push(format!("testCases: at most {MAX_TEST_CASES} test cases"));
    }
    for (index, case) in request.test_cases.iter().enumerate() {
        if case.input.len() > config.max_code_size {
            errors.push(format!(
                "testCases[{index}].input: exceeds {} bytes",
                config.max_code_size
            ));
        }
        if case.expected_output.len() > config.max_code_size {
            errors.push(format!(
                "testCases[{index}].expectedOutput: exceeds {} bytes",
                config.max_code_size
            ));
        }
    }
    errors
}

fn validate_common(
    config: &Config,
    language: &str,
    code: &str,
    time_limit: Option<u64>,
    memory_limit: Option<u64>,
) -> Vec<String> {
    let mut errors = Vec::new();
    if languages::get(language).is_none() {
        errors.push(format!("language: unsupported '{language}'"));
    }
    if code.is_empty() {
        errors.push("code: must be non-empty".to_string());
    } else if code.len() > config.max_code_size {
        errors.push(format!("code: exceeds {} bytes", config.max_code_size));
    }
    if let Some(seconds) = time_limit {
        if !(MIN_TIME_LIMIT_S..=config.max_time_limit_s).contains(&seconds) {
            errors.push(format!(
                "timeLimit: must be between {MIN_TIME_LIMIT_S} and {} seconds",
                config.max_time_limit_s
            ));
        }
    }
    if let Some(megabytes) = memory_limit {
        if !(MIN_MEMORY_LIMIT_MB..=config.max_memory_limit_mb).contains(&megabytes) {
            errors.push(format!(
                "memoryLimit: must be between {MIN_MEMORY_LIMIT_MB} and {} MB",
                config.max_memory_limit_mb
            ));
        }
    }
    errors
}

fn process_rss_kb() -> u64 {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|status| parse_rss_kb(&status))
        .unwrap_or(0)
}

fn parse_rss_kb(status: &str) -> Option<u64> {
    status
        .lines()
        .find(|line| line.starts_with("VmRSS:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse().ok())
}
