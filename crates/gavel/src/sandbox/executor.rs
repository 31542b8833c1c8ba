//! Resource-limited stage execution
//!
//! Runs one command inside an initialized sandbox and reads back its typed
//! metadata. The sandboxed process is a child of the isolate utility; this
//! call blocks the invoking worker task until isolate enforces the wall-clock
//! limit, but never blocks other workers.

use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, instrument};

use crate::sandbox::command::IsolateCommand;
use crate::sandbox::meta::MetaFile;
use crate::sandbox::{META_FILE, Sandbox, SandboxError};
use crate::types::ExecutionMetadata;

/// HOME inside the sandbox
pub const SANDBOX_HOME: &str = "/tmp";

/// Fixed PATH inside the sandbox; nothing else is inherited from the host
pub const SANDBOX_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Execute one stage inside the sandbox and parse its metadata.
///
/// The caller provides a fully configured [`IsolateCommand`] except for the
/// meta file, which this function owns: it points isolate at the sandbox meta
/// file, parses it after the invocation, and then removes it so the next
/// stage in the same job cannot read stale data.
///
/// An abnormal exit that isolate accounts for in the meta file (timeout,
/// signal, non-zero exit) is returned as [`ExecutionMetadata`] for the caller
/// to classify. Only an inability to invoke isolate at all is an `Err`.
#[instrument(skip(sandbox, command), fields(slot = sandbox.id()))]
pub async fn run_stage(
    sandbox: &Sandbox,
    command: IsolateCommand,
) -> Result<ExecutionMetadata, SandboxError> {
    let meta_path = sandbox.file_path(META_FILE)?;

    let args = command.meta_file(&meta_path).build();
    debug!(?args, "invoking isolate");

    let program = args
        .first()
        .ok_or_else(|| SandboxError::CommandFailed("empty command arguments".to_string()))?;
    let output = Command::new(program)
        .args(&args[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(SandboxError::SpawnFailed)?;

    // Isolate exits non-zero whenever the sandboxed program fails; the meta
    // file is the authoritative account. Its absence means isolate itself
    // could not run.
    if !meta_path.exists() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SandboxError::CommandFailed(stderr.to_string()));
    }

    let meta = MetaFile::load(&meta_path).await?;

    // Reset the meta file so the next stage in this job starts clean
    tokio::fs::remove_file(&meta_path).await?;

    let metadata = meta.to_metadata();
    debug!(
        status = ?metadata.status,
        time = metadata.time,
        memory = metadata.memory,
        exit_code = ?metadata.exit_code,
        "stage complete"
    );

    Ok(metadata)
}
