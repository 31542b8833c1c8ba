//! Compile stage
//!
//! Stages the language's compile command line as a script inside the sandbox
//! and executes it under a fixed budget. Languages without a compile command
//! skip this stage entirely.

use tracing::{debug, instrument};

use crate::config::{Config, LanguageProfile};
use crate::judge::verdict::{Verdict, classify_compile};
use crate::sandbox::{
    COMPILE_OUTPUT_FILE, COMPILE_SCRIPT, IsolateAction, IsolateCommand, SANDBOX_HOME,
    SANDBOX_PATH, STDIN_FILE, Sandbox, SandboxError, run_stage,
};
use crate::types::{ExecutionMetadata, ResourceLimits};

/// Outcome of the compile stage
#[derive(Debug)]
pub struct CompileOutcome {
    /// The failure verdict, or `None` when the job may proceed to grading
    pub verdict: Option<Verdict>,

    /// Combined compiler stdout+stderr
    pub output: String,

    /// Metadata of the compile invocation; absent when the stage was skipped
    pub metadata: Option<ExecutionMetadata>,
}

impl CompileOutcome {
    fn skipped() -> Self {
        Self {
            verdict: None,
            output: String::new(),
            metadata: None,
        }
    }

    /// Whether the job may proceed to the run stage
    pub fn succeeded(&self) -> bool {
        self.verdict.is_none()
    }
}

/// Compilation budget: fixed and generous, not configurable per language,
/// distinct from the run-stage limits.
pub(crate) fn compile_limits() -> ResourceLimits {
    ResourceLimits {
        time_limit: Some(30.0),
        wall_time_limit: Some(60.0),
        memory_limit: Some(524288), // 512 MB
        max_processes: Some(16),    // compilers fork
        max_output: Some(65536),    // 64 MB
        ..ResourceLimits::none()
    }
}

/// Run the compile stage for a job.
///
/// The submitted source must already be staged in the sandbox. On success the
/// compiled artifact remains in the box directory for the run stage.
#[instrument(skip_all, fields(slot = sandbox.id(), language = %profile.name))]
pub async fn compile(
    sandbox: &Sandbox,
    config: &Config,
    profile: &LanguageProfile,
) -> Result<CompileOutcome, SandboxError> {
    let Some(compile_cmd) = profile.compile_command.as_deref() else {
        debug!("no compile command; stage skipped");
        return Ok(CompileOutcome::skipped());
    };
    if compile_cmd.trim().is_empty() {
        debug!("empty compile command; stage skipped");
        return Ok(CompileOutcome::skipped());
    }

    sandbox.write_file(COMPILE_SCRIPT, compile_cmd.as_bytes()).await?;

    let command = IsolateCommand::new(config.isolate_binary(), sandbox.id())
        .action(IsolateAction::Run)
        .cgroup(sandbox.cgroup())
        .limits(compile_limits())
        .working_dir("/box")
        .env("HOME", SANDBOX_HOME)
        .env("PATH", SANDBOX_PATH)
        .mounts(config.sandbox_mounts.iter().cloned())
        .stdin(sandbox.sandbox_path(STDIN_FILE)?)
        .stdout(sandbox.sandbox_path(COMPILE_OUTPUT_FILE)?)
        .stderr_to_stdout(true)
        .command(["/bin/bash", COMPILE_SCRIPT]);

    let metadata = run_stage(sandbox, command).await?;

    let mut output = if sandbox.file_exists(COMPILE_OUTPUT_FILE).await? {
        sandbox.read_text(COMPILE_OUTPUT_FILE).await?
    } else {
        String::new()
    };

    // Surface isolate's own account when the compiler produced nothing
    if output.is_empty()
        && let Some(ref msg) = metadata.message
    {
        output = msg.clone();
    }

    let verdict = classify_compile(&metadata);

    debug!(
        success = verdict.is_none(),
        exit_code = ?metadata.exit_code,
        status = ?metadata.status,
        "compile stage complete"
    );

    Ok(CompileOutcome {
        verdict,
        output,
        metadata: Some(metadata),
    })
}
