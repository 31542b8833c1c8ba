//! Job orchestration
//!
//! One [`Judge`] drives the full lifecycle of a submission: resolve the
//! language profile and test cases, acquire a sandbox slot, compile, grade,
//! classify, and release the sandbox on every exit path. Expected grading
//! outcomes are verdicts; only infrastructure failures are errors, and those
//! are funneled into a SystemError report so the worker keeps serving.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, instrument, warn};

pub use crate::judge::compile::{CompileOutcome, compile};
pub use crate::judge::grade::{GradeOutcome, grade};
pub use crate::judge::verdict::{
    JudgeReport, Verdict, WrongAnswer, classify_compile, classify_run, output_matches,
};

mod compile;
mod grade;
pub mod verdict;

use crate::config::{Config, LanguageProfile};
use crate::sandbox::{Sandbox, SandboxError, SlotPool};
use crate::store::{JudgeStore, StoreError, TestCase};
use crate::submission::Submission;
use crate::types::ResourceLimits;

/// Infrastructure failures while processing a job.
///
/// All of these classify as [`Verdict::SystemError`]; none of them crash the
/// worker.
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("store lookup failed: {0}")]
    Store(#[from] StoreError),

    #[error("sandbox failure: {0}")]
    Sandbox(#[from] SandboxError),
}

/// Grades submissions, one at a time per caller
pub struct Judge<S> {
    config: Arc<Config>,
    pool: Arc<SlotPool>,
    store: S,
}

impl<S: JudgeStore> Judge<S> {
    pub fn new(config: Arc<Config>, pool: Arc<SlotPool>, store: S) -> Self {
        Self {
            config,
            pool,
            store,
        }
    }

    /// Grade one submission to a finished report.
    ///
    /// Never returns an error: infrastructure failures are logged with full
    /// context and reported as SystemError, so raw error details are never
    /// surfaced to the callback payload.
    #[instrument(skip(self, submission), fields(submission_id = %submission.submission_id))]
    pub async fn process(&self, submission: &Submission) -> JudgeReport {
        match self.try_process(submission).await {
            Ok(report) => {
                info!(result = ?report.result, "submission graded");
                report
            }
            Err(err) => {
                error!(error = %err, "failed to process submission");
                JudgeReport::system_error()
            }
        }
    }

    async fn try_process(&self, submission: &Submission) -> Result<JudgeReport, JudgeError> {
        // Both lookups happen before any sandbox slot is taken, so a missing
        // language or unreachable store never wastes an acquisition
        let profile = self.resolve_profile(submission).await?;
        let tests = self.resolve_tests(submission).await?;

        let limits = self
            .config
            .run_limits(&profile, &submission.limit_overrides());

        let mut sandbox = self.pool.acquire().await?;
        let outcome = self
            .run_stages(&sandbox, submission, &profile, &limits, &tests)
            .await;

        // Release happens on every path, success or failure, before the
        // outcome is propagated; the Sandbox drop backstop covers panics
        if let Err(err) = sandbox.release().await {
            warn!(slot = sandbox.id(), error = %err, "sandbox release failed");
        }

        outcome
    }

    async fn run_stages(
        &self,
        sandbox: &Sandbox,
        submission: &Submission,
        profile: &LanguageProfile,
        limits: &ResourceLimits,
        tests: &[TestCase],
    ) -> Result<JudgeReport, JudgeError> {
        sandbox
            .stage(&profile.source_name, submission.source_code.as_bytes())
            .await?;

        let compiled = compile::compile(sandbox, &self.config, profile).await?;
        if let Some(verdict) = compiled.verdict {
            let mut report = JudgeReport::from_verdict(verdict);
            report.compile_output = compiled.output;
            if let Some(meta) = compiled.metadata {
                report.exit_code = meta.exit_code;
                report.exit_signal = meta.signal;
            }
            return Ok(report);
        }

        let graded = grade::grade(sandbox, &self.config, profile, limits, tests).await?;

        let mut report = JudgeReport::from_verdict(graded.verdict);
        report.compile_output = compiled.output;
        report.stderr = graded.stderr;
        if let Some(wrong) = graded.wrong_answer {
            report.wrong_answers.push(wrong);
        }
        if let Some(meta) = graded.metadata {
            report.time = meta.time;
            report.memory = meta.memory;
            report.exit_code = meta.exit_code;
            report.exit_signal = meta.signal;
        }

        Ok(report)
    }

    /// Resolve the language profile: inline commands on the submission take
    /// precedence over the store.
    async fn resolve_profile(&self, submission: &Submission) -> Result<LanguageProfile, JudgeError> {
        if let Some(run_cmd) = submission.run_cmd.as_deref() {
            return Ok(LanguageProfile::from_inline(submission, run_cmd));
        }
        Ok(self.store.language(&submission.language).await?)
    }

    /// Resolve the test cases: a submission carrying its own run command is
    /// graded against its single inline test case.
    async fn resolve_tests(&self, submission: &Submission) -> Result<Vec<TestCase>, JudgeError> {
        if submission.run_cmd.is_some() {
            return Ok(vec![TestCase {
                id: submission.submission_id,
                problem_id: submission.problem_id,
                input: submission.stdin.clone().unwrap_or_default(),
                output: submission.stdout.clone().unwrap_or_default(),
            }]);
        }
        Ok(self.store.test_cases(submission.problem_id).await?)
    }
}

impl<S> Judge<S> {
    /// The slot pool this judge allocates sandboxes from
    pub fn pool(&self) -> &SlotPool {
        &self.pool
    }
}
