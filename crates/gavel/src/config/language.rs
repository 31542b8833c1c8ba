use serde::{Deserialize, Serialize};

use crate::submission::Submission;
use crate::types::ResourceLimits;

/// Default file name for source code submitted with inline run commands
pub const DEFAULT_SOURCE_NAME: &str = "main.txt";

/// Configuration for a programming language.
///
/// Compile and run commands are shell command lines; they are staged into the
/// sandbox as `compile.sh` / `run.sh` and executed via `/bin/bash` with the
/// box directory as the working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageProfile {
    /// Human-readable name for the language (e.g., "C++ 17 (GCC)")
    pub name: String,

    /// Source file name in the sandbox (e.g., "main.cpp")
    pub source_name: String,

    /// Compilation command line (None for interpreted languages)
    #[serde(default)]
    pub compile_command: Option<String>,

    /// Execution command line
    pub run_command: String,

    /// Resource limits for execution (overrides worker defaults)
    #[serde(default)]
    pub limits: Option<ResourceLimits>,
}

impl LanguageProfile {
    /// Check if the language requires a compile stage
    pub fn is_compiled(&self) -> bool {
        self.compile_command
            .as_deref()
            .is_some_and(|cmd| !cmd.trim().is_empty())
    }

    /// Build a profile from the commands carried inline on a submission.
    ///
    /// Submissions that bring their own `run_cmd` (and optionally
    /// `compile_cmd`) are self-contained and bypass the language store.
    pub fn from_inline(submission: &Submission, run_cmd: &str) -> Self {
        Self {
            name: submission.language.clone(),
            source_name: submission
                .source_file_name
                .clone()
                .unwrap_or_else(|| DEFAULT_SOURCE_NAME.to_string()),
            compile_command: submission.compile_cmd.clone(),
            run_command: run_cmd.to_string(),
            limits: None,
        }
    }
}
