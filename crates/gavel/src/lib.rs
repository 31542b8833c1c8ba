//! A sandboxed compile-and-grade engine for untrusted code submissions.
//!
//! Gavel grades code submissions against problem test cases inside IOI
//! Isolate sandboxes: it allocates a collision-free sandbox slot per job,
//! compiles and runs the submitted program under CPU/wall/memory/stack/output
//! limits, compares output fail-fast against expected output, and classifies
//! the result into a closed verdict enumeration.
//!
//! # Features
//!
//! - **Sandboxed execution** — slot-pooled sandbox lifecycle with guaranteed
//!   release on every exit path.
//! - **Multi-language** — compiled and interpreted languages via TOML
//!   profiles or inline per-submission commands.
//! - **Fail-fast grading** — stops at the first failing test case and reports
//!   exactly that one.
//! - **Typed verdicts** — Accepted through UnknownError; unclassifiable
//!   sandbox output never passes silently.
//! - **Resource limits** — layered worker/language/submission limits, with
//!   cgroup v2 memory limiting for container environments.

pub use config::{Config, ConfigError, EXAMPLE_CONFIG, LanguageProfile, QueueConfig};
pub use judge::{Judge, JudgeError, JudgeReport, Verdict, WrongAnswer};
pub use sandbox::{Sandbox, SandboxError, SlotPool, prepare_cgroup};
pub use store::{JudgeStore, MemoryStore, StoreError, TestCase};
pub use submission::{ResultPayload, Submission};
pub use types::{ExecStatus, ExecutionMetadata, LimitExceeded, MountConfig, ResourceLimits};

pub mod config;
pub mod judge;
pub mod sandbox;
pub mod store;
pub mod submission;
pub mod types;
