//! Verdict classification
//!
//! The classification rules live here so every stage maps sandbox metadata to
//! verdicts the same way. No path may leave a verdict unset: metadata the
//! sandbox could not account for becomes [`Verdict::UnknownError`], never a
//! silent acceptance.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ExecStatus, ExecutionMetadata, LimitExceeded};

/// Final grading outcome for a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "AC")]
    Accepted,
    #[serde(rename = "WA")]
    WrongAnswer,
    #[serde(rename = "TLE")]
    TimeLimitExceeded,
    #[serde(rename = "MLE")]
    MemoryLimitExceeded,
    #[serde(rename = "RE")]
    RuntimeError,
    #[serde(rename = "CE")]
    CompileError,
    #[serde(rename = "CTLE")]
    CompileTimeLimitExceeded,
    #[serde(rename = "OLE")]
    OutputLimitExceeded,
    #[serde(rename = "SE")]
    SystemError,
    #[serde(rename = "UE")]
    UnknownError,
}

impl Verdict {
    /// Human-readable message for this verdict
    pub fn message(&self) -> &'static str {
        match self {
            Verdict::Accepted => "Accepted",
            Verdict::WrongAnswer => "Wrong Answer",
            Verdict::TimeLimitExceeded => "Time Limit Exceeded",
            Verdict::MemoryLimitExceeded => "Memory Limit Exceeded",
            Verdict::RuntimeError => "Runtime Error",
            Verdict::CompileError => "Compile Error",
            Verdict::CompileTimeLimitExceeded => "Compile Time Limit Exceeded",
            Verdict::OutputLimitExceeded => "Output Limit Exceeded",
            Verdict::SystemError => "System Error",
            Verdict::UnknownError => "Unknown Error",
        }
    }
}

/// The first failing test case, with the output the program produced for it.
///
/// Grading is fail-fast: a report carries at most one of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrongAnswer {
    pub test_case_id: Uuid,
    pub stdout: String,
}

/// Everything the originating system learns about a graded submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeReport {
    pub result: Verdict,
    pub message: String,
    pub stderr: String,
    /// CPU time of the last run-stage invocation, in seconds
    pub time: f64,
    /// Peak memory of the last run-stage invocation, in kilobytes
    pub memory: u64,
    pub exit_code: Option<i32>,
    pub exit_signal: Option<i32>,
    pub compile_output: String,
    pub wrong_answers: Vec<WrongAnswer>,
}

impl JudgeReport {
    /// Report for a submission whose every test case matched
    pub fn accepted() -> Self {
        Self::from_verdict(Verdict::Accepted)
    }

    /// Report carrying only a verdict and its standard message
    pub fn from_verdict(result: Verdict) -> Self {
        Self {
            result,
            message: result.message().to_owned(),
            stderr: String::new(),
            time: 0.0,
            memory: 0,
            exit_code: None,
            exit_signal: None,
            compile_output: String::new(),
            wrong_answers: Vec::new(),
        }
    }

    /// Report for an infrastructure failure. Raw error details stay in the
    /// logs; the payload carries only the generic message.
    pub fn system_error() -> Self {
        let mut report = Self::from_verdict(Verdict::SystemError);
        report.message = "Internal processing error".to_owned();
        report
    }
}

/// Classify the outcome of the compile stage.
///
/// Returns `None` when compilation succeeded and the job may proceed to the
/// run stage.
pub fn classify_compile(meta: &ExecutionMetadata) -> Option<Verdict> {
    match meta.status {
        ExecStatus::TimeLimitExceeded => Some(Verdict::CompileTimeLimitExceeded),
        ExecStatus::Ok if meta.exit_code == Some(0) => None,
        ExecStatus::Ok | ExecStatus::RuntimeError | ExecStatus::Signaled => {
            Some(Verdict::CompileError)
        }
        ExecStatus::InternalError => Some(Verdict::SystemError),
        ExecStatus::Unknown => Some(Verdict::UnknownError),
    }
}

/// Classify the outcome of one run-stage invocation.
///
/// Returns `None` when the program finished normally and its output should be
/// compared against the expected output.
pub fn classify_run(meta: &ExecutionMetadata) -> Option<Verdict> {
    match meta.status {
        ExecStatus::TimeLimitExceeded => Some(Verdict::TimeLimitExceeded),
        ExecStatus::Signaled | ExecStatus::RuntimeError => Some(match meta.limit_exceeded {
            LimitExceeded::Memory => Verdict::MemoryLimitExceeded,
            LimitExceeded::Output => Verdict::OutputLimitExceeded,
            _ => Verdict::RuntimeError,
        }),
        ExecStatus::Ok if meta.exit_code == Some(0) => None,
        ExecStatus::Ok => Some(Verdict::RuntimeError),
        ExecStatus::InternalError => Some(Verdict::SystemError),
        ExecStatus::Unknown => Some(Verdict::UnknownError),
    }
}

/// Whether a produced output matches a test case.
///
/// Comparison is raw and exact: no trimming of trailing whitespace or
/// newlines, and the program must not have written anything to stderr.
pub fn output_matches(expected: &str, stdout: &str, stderr: &str) -> bool {
    stdout == expected && stderr.is_empty()
}
