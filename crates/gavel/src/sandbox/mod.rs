//! Isolate-backed execution sandbox
//!
//! This module wraps the IOI isolate utility behind a narrow
//! acquire/run/release interface: a [`SlotPool`] hands out collision-free
//! numeric slots, a [`Sandbox`] owns one initialized box for the duration of
//! a job, and [`run_stage`] performs one resource-limited invocation.
//!
//! References for isolate's CLI arguments and meta files:
//! - https://www.ucw.cz/isolate/isolate.1.html
//! - https://github.com/ioi/isolate

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::process::Command;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, instrument, warn};

pub use crate::sandbox::command::{IsolateAction, IsolateCommand};
pub use crate::sandbox::executor::{SANDBOX_HOME, SANDBOX_PATH, run_stage};
pub use crate::sandbox::meta::{MetaFile, MetaParseError};

mod command;
mod executor;
mod meta;

/// File names staged inside each sandbox for one job
pub const STDIN_FILE: &str = "stdin.txt";
pub const STDOUT_FILE: &str = "stdout.txt";
pub const STDERR_FILE: &str = "stderr.txt";
pub const META_FILE: &str = "meta.txt";
pub const COMPILE_SCRIPT: &str = "compile.sh";
pub const RUN_SCRIPT: &str = "run.sh";
pub const COMPILE_OUTPUT_FILE: &str = "compile_output.txt";

/// Errors that occur during sandbox operations
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to initialize box {slot}: {message}")]
    InitFailed { slot: u32, message: String },

    #[error("failed to cleanup box {slot}: {message}")]
    CleanupFailed { slot: u32, message: String },

    #[error("isolate command failed: {0}")]
    CommandFailed(String),

    #[error("failed to spawn isolate process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("slot pool is closed or exhausted")]
    PoolExhausted,

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pool of sandbox slots for concurrent jobs.
///
/// Slot ids are pre-allocated into a fixed arena and handed out through a
/// semaphore-guarded free list, so two concurrently active jobs can never
/// hold the same slot. This is the load-bearing invariant of the whole
/// worker: isolate's isolation guarantees are keyed by slot id.
#[derive(Debug)]
pub struct SlotPool {
    /// Slot ids not currently held by any job
    free: Arc<Mutex<Vec<u32>>>,

    /// Bounds concurrently held slots to the arena size
    semaphore: Arc<Semaphore>,

    /// Number of slots in the arena
    count: u32,

    /// Path to the isolate binary
    isolate_path: PathBuf,

    /// Whether cgroup support is enabled
    cgroup: bool,
}

impl SlotPool {
    /// Create a pool covering slot ids `first_slot..first_slot + count`
    pub fn new(first_slot: u32, count: u32, isolate_path: impl Into<PathBuf>, cgroup: bool) -> Self {
        let ids: Vec<u32> = (first_slot..first_slot + count).collect();
        Self {
            free: Arc::new(Mutex::new(ids)),
            semaphore: Arc::new(Semaphore::new(count as usize)),
            count,
            isolate_path: isolate_path.into(),
            cgroup,
        }
    }

    /// Reserve a slot id without touching isolate.
    ///
    /// The id returns to the pool when the [`Slot`] is dropped.
    pub async fn acquire_slot(&self) -> Result<Slot, SandboxError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SandboxError::PoolExhausted)?;

        let id = self
            .free
            .lock()
            .expect("slot free list poisoned")
            .pop()
            .ok_or(SandboxError::PoolExhausted)?;

        debug!(slot = id, "acquired sandbox slot");

        Ok(Slot {
            id,
            free: Arc::clone(&self.free),
            _permit: permit,
        })
    }

    /// Reserve a slot and initialize its isolate box
    #[instrument(skip(self))]
    pub async fn acquire(&self) -> Result<Sandbox, SandboxError> {
        let slot = self.acquire_slot().await?;
        Sandbox::init(slot, &self.isolate_path, self.cgroup).await
    }

    /// Number of slots currently available
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Total number of slots in the arena
    pub fn capacity(&self) -> u32 {
        self.count
    }
}

/// One reserved sandbox slot.
///
/// Holding a `Slot` guarantees exclusive use of its id; dropping it returns
/// the id to the pool.
#[derive(Debug)]
pub struct Slot {
    id: u32,
    free: Arc<Mutex<Vec<u32>>>,
    _permit: OwnedSemaphorePermit,
}

impl Slot {
    /// The slot id
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        // The permit releases after this, so the id is back before the next
        // acquirer can proceed
        self.free
            .lock()
            .expect("slot free list poisoned")
            .push(self.id);
    }
}

/// An initialized isolate box bound to a reserved slot.
///
/// Exactly one exists per in-flight job. Call [`release()`](Self::release)
/// when the job finishes; the `Drop` implementation only performs
/// best-effort cleanup via a spawned thread and logs a warning, so it is a
/// backstop for panics and bugs rather than the normal cleanup path.
#[derive(Debug)]
pub struct Sandbox {
    /// Reserved slot; returns to the pool when the sandbox is dropped
    slot: Slot,

    /// Path to the box directory
    box_path: PathBuf,

    /// Path to the isolate binary
    isolate_path: PathBuf,

    /// Whether the box still needs cleanup
    initialized: bool,

    /// Whether cgroup support is enabled
    cgroup: bool,
}

impl Sandbox {
    /// Initialize an isolate box on a reserved slot
    #[instrument(skip(slot, isolate_path), fields(slot = slot.id()))]
    pub async fn init(
        slot: Slot,
        isolate_path: impl Into<PathBuf>,
        cgroup: bool,
    ) -> Result<Self, SandboxError> {
        let isolate_path = isolate_path.into();

        let args = IsolateCommand::new(&isolate_path, slot.id())
            .action(IsolateAction::Init)
            .cgroup(cgroup)
            .build();

        debug!(?args, "initializing isolate box");

        let program = args
            .first()
            .ok_or_else(|| SandboxError::CommandFailed("empty command arguments".to_string()))?;
        let output = Command::new(program)
            .args(&args[1..])
            .output()
            .await
            .map_err(SandboxError::SpawnFailed)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // A failed init can leave a half-created box behind
            cleanup_slot(&isolate_path, slot.id(), cgroup).await;
            return Err(SandboxError::InitFailed {
                slot: slot.id(),
                message: stderr.to_string(),
            });
        }

        // Isolate prints the box working directory on stdout
        let stdout = String::from_utf8_lossy(&output.stdout);
        let box_path = PathBuf::from(stdout.trim());

        if !box_path.exists() {
            cleanup_slot(&isolate_path, slot.id(), cgroup).await;
            return Err(SandboxError::InitFailed {
                slot: slot.id(),
                message: format!("box path does not exist: {}", box_path.display()),
            });
        }

        debug!(?box_path, "box initialized");

        Ok(Self {
            slot,
            box_path,
            isolate_path,
            initialized: true,
            cgroup,
        })
    }

    /// The slot id this sandbox is bound to
    pub fn id(&self) -> u32 {
        self.slot.id()
    }

    /// Host path of the box directory
    pub fn path(&self) -> &Path {
        &self.box_path
    }

    /// Path to the isolate binary
    pub fn isolate_path(&self) -> &Path {
        &self.isolate_path
    }

    /// Whether cgroup support is enabled for this box
    pub fn cgroup(&self) -> bool {
        self.cgroup
    }

    /// Host path to a file inside the box.
    ///
    /// Returns an error if the name contains path traversal attempts.
    pub fn file_path(&self, name: &str) -> Result<PathBuf, SandboxError> {
        if name.contains("..") || name.starts_with('/') {
            return Err(SandboxError::InvalidPath(format!(
                "path traversal not allowed: {name}"
            )));
        }
        Ok(self.box_path.join("box").join(name))
    }

    /// Sandbox-internal path for a file inside the box.
    ///
    /// The box directory is mounted at `/box/` inside the sandbox; use this
    /// for isolate's `--stdin`, `--stdout`, and `--stderr` flags which are
    /// opened inside the sandbox.
    pub fn sandbox_path(&self, name: &str) -> Result<PathBuf, SandboxError> {
        if name.contains("..") || name.starts_with('/') {
            return Err(SandboxError::InvalidPath(format!(
                "path traversal not allowed: {name}"
            )));
        }
        Ok(PathBuf::from("/box").join(name))
    }

    /// Write a file into the box
    #[instrument(skip(self, content))]
    pub async fn write_file(&self, name: &str, content: &[u8]) -> Result<(), SandboxError> {
        let path = self.file_path(name)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&path, content).await?;
        debug!(?path, len = content.len(), "wrote file to box");
        Ok(())
    }

    /// Read a file from the box
    #[instrument(skip(self))]
    pub async fn read_file(&self, name: &str) -> Result<Vec<u8>, SandboxError> {
        let path = self.file_path(name)?;
        let content = tokio::fs::read(&path).await?;
        debug!(?path, len = content.len(), "read file from box");
        Ok(content)
    }

    /// Read a file from the box as (lossy) UTF-8 text
    pub async fn read_text(&self, name: &str) -> Result<String, SandboxError> {
        let content = self.read_file(name).await?;
        Ok(String::from_utf8_lossy(&content).into_owned())
    }

    /// Check if a file exists in the box
    pub async fn file_exists(&self, name: &str) -> Result<bool, SandboxError> {
        let path = self.file_path(name)?;
        Ok(tokio::fs::metadata(&path).await.is_ok())
    }

    /// Stage the per-job files: the submitted source plus empty
    /// stdin/stdout/stderr/meta files the sandboxed process can write to.
    pub async fn stage(&self, source_name: &str, source: &[u8]) -> Result<(), SandboxError> {
        self.write_file(source_name, source).await?;
        for name in [STDIN_FILE, STDOUT_FILE, STDERR_FILE, META_FILE] {
            self.write_file(name, b"").await?;
        }
        Ok(())
    }

    /// Release the box.
    ///
    /// Idempotent: safe to call again after a successful release. Must be
    /// called exactly once per job on the normal path; the `Drop` backstop
    /// covers abnormal exits.
    #[must_use = "cleanup errors should be handled"]
    #[instrument(skip(self), fields(slot = self.id()))]
    pub async fn release(&mut self) -> Result<(), SandboxError> {
        if !self.initialized {
            return Ok(());
        }

        let args = IsolateCommand::new(&self.isolate_path, self.id())
            .action(IsolateAction::Cleanup)
            .cgroup(self.cgroup)
            .build();

        debug!(?args, "cleaning up isolate box");

        let program = args
            .first()
            .ok_or_else(|| SandboxError::CommandFailed("empty command arguments".to_string()))?;
        let output = Command::new(program)
            .args(&args[1..])
            .output()
            .await
            .map_err(SandboxError::SpawnFailed)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(slot = self.id(), stderr = %stderr, "cleanup failed");
            return Err(SandboxError::CleanupFailed {
                slot: self.id(),
                message: stderr.to_string(),
            });
        }

        self.initialized = false;
        debug!("box released");
        Ok(())
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        if self.initialized {
            // Best-effort cleanup on drop is unreliable; the normal path must
            // call release() explicitly
            warn!(
                slot = self.id(),
                box_path = %self.box_path.display(),
                "sandbox dropped without explicit release; attempting best-effort cleanup"
            );

            let args = IsolateCommand::new(&self.isolate_path, self.id())
                .action(IsolateAction::Cleanup)
                .cgroup(self.cgroup)
                .build();
            let slot = self.id();

            std::thread::spawn(move || {
                if let Some(program) = args.first() {
                    match std::process::Command::new(program).args(&args[1..]).output() {
                        Ok(output) if output.status.success() => {
                            debug!(slot, "best-effort cleanup succeeded");
                        }
                        Ok(output) => {
                            let stderr = String::from_utf8_lossy(&output.stderr);
                            warn!(slot, stderr = %stderr, "best-effort cleanup failed");
                        }
                        Err(e) => {
                            warn!(slot, error = %e, "best-effort cleanup spawn failed");
                        }
                    }
                }
            });
        }
    }
}

/// Best-effort cleanup of a box that may be half-created
async fn cleanup_slot(isolate_path: &Path, slot: u32, cgroup: bool) {
    let args = IsolateCommand::new(isolate_path, slot)
        .action(IsolateAction::Cleanup)
        .cgroup(cgroup)
        .build();

    let Some(program) = args.first() else {
        return;
    };
    match Command::new(program).args(&args[1..]).output().await {
        Ok(output) if output.status.success() => {}
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(slot, stderr = %stderr, "cleanup after failed init failed");
        }
        Err(e) => {
            warn!(slot, error = %e, "cleanup after failed init could not spawn");
        }
    }
}

/// Attempt to set up the cgroup v2 hierarchy for isolate.
///
/// In container environments, `isolate-cg-keeper` (the systemd service that
/// normally manages isolate's cgroup) is not available. This function
/// replicates its job: creating the cgroup directory at `cg_root` and
/// enabling the memory and pids controllers so that per-box child cgroups
/// work.
///
/// Returns `Ok(true)` if cgroups are ready, `Ok(false)` if setup failed and
/// the caller should fall back to non-cgroup mode (RLIMIT_AS).
pub fn prepare_cgroup(cg_root: &Path) -> Result<bool, SandboxError> {
    let cg_base = Path::new("/sys/fs/cgroup");

    // Check if cgroup v2 is available
    let controllers_path = cg_base.join("cgroup.controllers");
    if !controllers_path.exists() {
        return Ok(false);
    }

    // Check if the memory controller is available in this namespace
    let controllers = fs::read_to_string(&controllers_path)?;
    if !controllers.split_whitespace().any(|c| c == "memory") {
        return Ok(false);
    }

    // If cg_root already has the memory controller enabled, nothing to do
    if cg_root.exists() {
        let subtree = cg_root.join("cgroup.subtree_control");
        if let Ok(content) = fs::read_to_string(&subtree)
            && content.split_whitespace().any(|c| c == "memory")
        {
            return Ok(true);
        }
    }

    // Move our process out of the root cgroup into a leaf cgroup.
    // cgroup v2's "no internal process" rule prevents enabling controllers
    // in a cgroup that has processes directly in it.
    let init_cg = cg_base.join("init");
    if !init_cg.exists() {
        fs::create_dir(&init_cg)?;
    }
    fs::write(init_cg.join("cgroup.procs"), std::process::id().to_string())?;

    // Enable memory and pids controllers at the root
    fs::write(cg_base.join("cgroup.subtree_control"), "+memory +pids")?;

    // Create the isolate cgroup directory
    if !cg_root.exists() {
        fs::create_dir(cg_root)?;
    }

    // Enable controllers for per-box children
    fs::write(cg_root.join("cgroup.subtree_control"), "+memory +pids")?;

    Ok(true)
}
