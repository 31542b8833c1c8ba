//! Run stage / grading loop
//!
//! Executes the submitted program once per test case and compares its output
//! against the expected output. Grading is fail-fast: the loop stops at the
//! first test whose run times out, terminates abnormally, or mismatches, so
//! the report names the first failing test only.

use tracing::{debug, instrument};

use crate::config::{Config, LanguageProfile};
use crate::judge::verdict::{Verdict, WrongAnswer, classify_run, output_matches};
use crate::sandbox::{
    IsolateAction, IsolateCommand, RUN_SCRIPT, SANDBOX_HOME, SANDBOX_PATH, STDERR_FILE,
    STDIN_FILE, STDOUT_FILE, Sandbox, SandboxError, run_stage,
};
use crate::store::TestCase;
use crate::types::{ExecutionMetadata, ResourceLimits};

/// Outcome of the grading loop
#[derive(Debug)]
pub struct GradeOutcome {
    pub verdict: Verdict,

    /// Stderr of the last executed test
    pub stderr: String,

    /// The first failing test, when the verdict is WrongAnswer
    pub wrong_answer: Option<WrongAnswer>,

    /// Metadata of the last run-stage invocation
    pub metadata: Option<ExecutionMetadata>,

    /// Number of test cases actually executed
    pub executed: usize,
}

/// Grade a staged, compiled submission against its test cases.
///
/// `limits` are the effective run limits (worker defaults, language limits,
/// and submission overrides already merged).
#[instrument(skip_all, fields(slot = sandbox.id(), tests = tests.len()))]
pub async fn grade(
    sandbox: &Sandbox,
    config: &Config,
    profile: &LanguageProfile,
    limits: &ResourceLimits,
    tests: &[TestCase],
) -> Result<GradeOutcome, SandboxError> {
    sandbox
        .write_file(RUN_SCRIPT, profile.run_command.as_bytes())
        .await?;

    let mut stderr = String::new();
    let mut metadata = None;
    let mut executed = 0;

    for test in tests {
        sandbox.write_file(STDIN_FILE, test.input.as_bytes()).await?;

        let command = IsolateCommand::new(config.isolate_binary(), sandbox.id())
            .action(IsolateAction::Run)
            .cgroup(sandbox.cgroup())
            .limits(limits.clone())
            .working_dir("/box")
            .env("HOME", SANDBOX_HOME)
            .env("PATH", SANDBOX_PATH)
            .mounts(config.sandbox_mounts.iter().cloned())
            .stdin(sandbox.sandbox_path(STDIN_FILE)?)
            .stdout(sandbox.sandbox_path(STDOUT_FILE)?)
            .stderr(sandbox.sandbox_path(STDERR_FILE)?)
            .command(["/bin/bash", RUN_SCRIPT]);

        let meta = run_stage(sandbox, command).await?;
        executed += 1;

        let stdout = sandbox.read_text(STDOUT_FILE).await?;
        stderr = sandbox.read_text(STDERR_FILE).await?;

        debug!(
            test_case = %test.id,
            status = ?meta.status,
            time = meta.time,
            memory = meta.memory,
            "test executed"
        );

        if let Some(verdict) = classify_run(&meta) {
            return Ok(GradeOutcome {
                verdict,
                stderr,
                wrong_answer: None,
                metadata: Some(meta),
                executed,
            });
        }

        if !output_matches(&test.output, &stdout, &stderr) {
            debug!(test_case = %test.id, "output mismatch");
            return Ok(GradeOutcome {
                verdict: Verdict::WrongAnswer,
                stderr,
                wrong_answer: Some(WrongAnswer {
                    test_case_id: test.id,
                    stdout,
                }),
                metadata: Some(meta),
                executed,
            });
        }

        metadata = Some(meta);
    }

    Ok(GradeOutcome {
        verdict: Verdict::Accepted,
        stderr,
        wrong_answer: None,
        metadata,
        executed,
    })
}

