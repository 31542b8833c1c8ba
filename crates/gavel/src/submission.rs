//! Wire types for the judging queue
//!
//! A [`Submission`] is consumed once from the inbound queue; a
//! [`ResultPayload`] is delivered back through the reply queue or the
//! submission's webhook once grading finishes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::judge::{JudgeReport, Verdict};
use crate::types::ResourceLimits;

/// Score awarded for an accepted solution
const FULL_SCORE: u32 = 100;

/// One code submission pulled off the inbound queue.
///
/// Immutable once dispatched to a worker. Submissions either reference a
/// configured language (and a problem whose test cases live in the store), or
/// carry their own `run_cmd`/`compile_cmd` plus a single inline test case
/// (`stdin`/`stdout`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub submission_id: Uuid,
    pub problem_id: Uuid,
    pub user_id: Uuid,
    pub language: String,
    pub source_code: String,

    #[serde(default)]
    pub source_file_name: Option<String>,

    /// Per-submission resource overrides; limits not supplied here fall back
    /// to the language profile and then the worker defaults
    #[serde(default)]
    pub time_limit: Option<f64>,
    #[serde(default)]
    pub wall_time_limit: Option<f64>,
    #[serde(default)]
    pub memory_limit: Option<u64>,
    #[serde(default)]
    pub stack_limit: Option<u64>,
    #[serde(default)]
    pub output_limit: Option<u64>,

    /// Inline test case input/expected output (self-contained submissions)
    #[serde(default)]
    pub stdin: Option<String>,
    #[serde(default)]
    pub stdout: Option<String>,

    /// Inline compile/run command lines (bypass the language store)
    #[serde(default)]
    pub compile_cmd: Option<String>,
    #[serde(default)]
    pub run_cmd: Option<String>,

    /// Webhook delivery target; takes precedence over the reply queue
    #[serde(default)]
    pub callback_url: Option<String>,

    /// Reply queue address carried in-band on the message
    #[serde(default)]
    pub reply_to: Option<String>,
}

impl Submission {
    /// Resource overrides supplied on this submission, as a partial limit set
    pub fn limit_overrides(&self) -> ResourceLimits {
        ResourceLimits {
            time_limit: self.time_limit,
            wall_time_limit: self.wall_time_limit,
            memory_limit: self.memory_limit,
            stack_limit: self.stack_limit,
            max_output: self.output_limit,
            ..ResourceLimits::none()
        }
    }
}

#[cfg(test)]
impl Submission {
    /// Minimal submission for tests
    pub(crate) fn example() -> Self {
        Self {
            submission_id: Uuid::new_v4(),
            problem_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            language: "python3".to_owned(),
            source_code: "print(input())".to_owned(),
            source_file_name: None,
            time_limit: None,
            wall_time_limit: None,
            memory_limit: None,
            stack_limit: None,
            output_limit: None,
            stdin: None,
            stdout: None,
            compile_cmd: None,
            run_cmd: None,
            callback_url: None,
            reply_to: None,
        }
    }
}

/// The finished verdict as delivered back to the originating system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultPayload {
    pub submission_id: Uuid,
    pub score: u32,
    pub judge_response: JudgeReport,
}

impl ResultPayload {
    /// Wrap a finished report, computing the score
    pub fn new(submission_id: Uuid, judge_response: JudgeReport) -> Self {
        let score = if judge_response.result == Verdict::Accepted {
            FULL_SCORE
        } else {
            0
        };
        Self {
            submission_id,
            score,
            judge_response,
        }
    }
}
