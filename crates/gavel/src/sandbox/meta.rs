//! Meta file parsing
//!
//! Parses the meta file isolate writes after each invocation and converts it
//! into typed [`ExecutionMetadata`]. The meta file is `key:value` lines; a
//! meta file that lacks the fields a finished run must have is flagged as
//! [`ExecStatus::Unknown`] instead of being zero-filled.

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

use crate::sandbox::SandboxError;
use crate::types::{ExecStatus, ExecutionMetadata, LimitExceeded};

/// Error that occurs during meta file parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("meta file parse error at line {line_number}: {message} (line: {line:?})")]
pub struct MetaParseError {
    /// Line number (1-indexed) where the error occurred
    pub line_number: usize,
    /// The problematic line content
    pub line: String,
    /// Description of the error
    pub message: String,
}

/// Parsed meta file
#[derive(Debug, Clone, Default)]
pub struct MetaFile {
    /// Raw key-value pairs from the meta file
    pub entries: HashMap<String, String>,
}

impl MetaFile {
    /// Parse meta file content from a string
    ///
    /// This is a lenient parser that skips malformed lines. For strict parsing
    /// that reports errors, use [`try_parse`](Self::try_parse).
    pub fn parse(content: &str) -> Self {
        let mut entries = HashMap::new();

        // Meta-file entries are key-value pairs separated by colons
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some((key, value)) = line.split_once(':') {
                let key = key.trim();
                // The value is everything after the first colon; messages may
                // themselves contain colons
                let value = value.trim();
                if !key.is_empty() {
                    entries.insert(key.to_string(), value.to_string());
                }
            }
        }

        Self { entries }
    }

    /// Parse meta file content with strict error handling
    ///
    /// Returns an error if any line is malformed (non-empty but missing colon).
    /// Empty lines are ignored.
    pub fn try_parse(content: &str) -> Result<Self, MetaParseError> {
        let mut entries = HashMap::new();

        for (line_idx, line) in content.lines().enumerate() {
            let line_number = line_idx + 1;
            let trimmed = line.trim();

            if trimmed.is_empty() {
                continue;
            }

            match trimmed.split_once(':') {
                Some((key, value)) => {
                    let key = key.trim();
                    let value = value.trim();

                    if key.is_empty() {
                        return Err(MetaParseError {
                            line_number,
                            line: line.to_string(),
                            message: "empty key before colon".to_string(),
                        });
                    }

                    entries.insert(key.to_string(), value.to_string());
                }
                None => {
                    return Err(MetaParseError {
                        line_number,
                        line: line.to_string(),
                        message: "missing colon separator".to_string(),
                    });
                }
            }
        }

        Ok(Self { entries })
    }

    /// Load and parse a meta file from disk
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SandboxError> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        Ok(Self::parse(&content))
    }

    /// Get a string value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Get a float value
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    /// Get an integer value
    pub fn get_i32(&self, key: &str) -> Option<i32> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    /// Get an unsigned integer value
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    /// Get the exit code
    pub fn exit_code(&self) -> Option<i32> {
        self.get_i32("exitcode")
    }

    /// Get the signal that killed the process
    pub fn signal(&self) -> Option<i32> {
        self.get_i32("exitsig")
    }

    /// Get the message from isolate
    pub fn message(&self) -> Option<String> {
        self.get("message").map(String::from)
    }

    /// Get the peak memory usage in kilobytes
    ///
    /// Prefers cgroup memory (cg-mem) over the process's resident set size
    /// (max-rss) when both are present.
    fn memory(&self) -> Option<u64> {
        self.get_u64("cg-mem").or_else(|| self.get_u64("max-rss"))
    }

    /// Determine the invocation status, flagging incomplete meta files.
    ///
    /// Isolate omits the `status` key on normal exits, so its absence alone
    /// does not make a run unclassifiable; but a meta file without status,
    /// timing, or exit information tells us nothing and must not pass as a
    /// clean run.
    fn status(&self) -> ExecStatus {
        match self.get("status") {
            Some(status) => ExecStatus::from_isolate_status(status),
            None => {
                if self.get_f64("time").is_some() && self.exit_code().is_some() {
                    ExecStatus::Ok
                } else {
                    ExecStatus::Unknown
                }
            }
        }
    }

    /// Determine which limit was exceeded based on status and message
    fn limit_exceeded(&self) -> LimitExceeded {
        let message = self.message();

        // The message identifies the limit most precisely
        let from_message = LimitExceeded::from_message(message.as_deref());
        if from_message.is_exceeded() {
            return from_message;
        }

        // Status TO without a wall-time message means the CPU limit
        if self.status() == ExecStatus::TimeLimitExceeded {
            return LimitExceeded::Time;
        }

        LimitExceeded::NotExceeded
    }

    /// Convert to typed execution metadata
    pub fn to_metadata(&self) -> ExecutionMetadata {
        ExecutionMetadata {
            status: self.status(),
            limit_exceeded: self.limit_exceeded(),
            time: self.get_f64("time").unwrap_or(0.0),
            wall_time: self.get_f64("time-wall").unwrap_or(0.0),
            memory: self.memory().unwrap_or(0),
            exit_code: self.exit_code(),
            signal: self.signal(),
            message: self.message(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_success_meta() {
        let content = r#"
time:0.042
time-wall:0.050
max-rss:3456
exitcode:0
"#;
        let meta = MetaFile::parse(content).to_metadata();

        assert_eq!(meta.status, ExecStatus::Ok);
        assert!((meta.time - 0.042).abs() < 0.001);
        assert!((meta.wall_time - 0.050).abs() < 0.001);
        assert_eq!(meta.memory, 3456);
        assert_eq!(meta.exit_code, Some(0));
        assert_eq!(meta.signal, None);
        assert!(meta.is_clean_exit());
    }

    #[test]
    fn parse_tle_meta() {
        let content = r#"
time:2.001
time-wall:2.500
max-rss:1234
status:TO
message:Time limit exceeded
"#;
        let meta = MetaFile::parse(content).to_metadata();

        assert_eq!(meta.status, ExecStatus::TimeLimitExceeded);
        assert_eq!(meta.message.as_deref(), Some("Time limit exceeded"));
        assert_eq!(meta.limit_exceeded, LimitExceeded::Time);
    }

    #[test]
    fn tle_without_message_still_flags_time_limit() {
        let content = "time:2.001\nstatus:TO";
        let meta = MetaFile::parse(content).to_metadata();

        assert_eq!(meta.status, ExecStatus::TimeLimitExceeded);
        assert_eq!(meta.limit_exceeded, LimitExceeded::Time);
    }

    #[test]
    fn wall_time_limit_detected_from_message() {
        let content = r#"
time:1.000
time-wall:5.001
status:TO
message:Wall time limit exceeded
"#;
        let meta = MetaFile::parse(content).to_metadata();

        assert_eq!(meta.status, ExecStatus::TimeLimitExceeded);
        assert_eq!(meta.limit_exceeded, LimitExceeded::WallTime);
    }

    #[test]
    fn oom_kill_detected_from_message() {
        let content = r#"
time:0.100
cg-mem:262144
status:SG
exitsig:9
message:Out of memory
"#;
        let meta = MetaFile::parse(content).to_metadata();

        assert_eq!(meta.status, ExecStatus::Signaled);
        assert_eq!(meta.limit_exceeded, LimitExceeded::Memory);
        assert_eq!(meta.signal, Some(9));
    }

    #[test]
    fn signal_meta() {
        let content = r#"
time:0.010
time-wall:0.020
max-rss:1000
exitsig:11
status:SG
message:Caught fatal signal 11
"#;
        let meta = MetaFile::parse(content).to_metadata();

        assert_eq!(meta.status, ExecStatus::Signaled);
        assert_eq!(meta.signal, Some(11));
        assert_eq!(meta.limit_exceeded, LimitExceeded::NotExceeded);
    }

    #[test]
    fn cgroup_memory_preferred_over_rss() {
        let content = r#"
time:0.100
time-wall:0.150
exitcode:0
cg-mem:524288
max-rss:512000
"#;
        let meta = MetaFile::parse(content).to_metadata();
        assert_eq!(meta.memory, 524288);
    }

    #[test]
    fn empty_meta_is_unknown_not_clean() {
        let meta = MetaFile::parse("").to_metadata();
        assert_eq!(meta.status, ExecStatus::Unknown);
        assert!(!meta.is_clean_exit());
    }

    #[test]
    fn meta_missing_timing_is_unknown() {
        // An exit code with no timing data means the sandbox never finished
        // writing the meta file; don't treat it as a clean run
        let meta = MetaFile::parse("exitcode:0").to_metadata();
        assert_eq!(meta.status, ExecStatus::Unknown);
    }

    #[test]
    fn meta_missing_exit_information_is_unknown() {
        let meta = MetaFile::parse("time:0.042\ntime-wall:0.050").to_metadata();
        assert_eq!(meta.status, ExecStatus::Unknown);
    }

    #[test]
    fn unrecognized_status_string_is_unknown() {
        let meta = MetaFile::parse("time:0.042\nstatus:WHAT").to_metadata();
        assert_eq!(meta.status, ExecStatus::Unknown);
    }

    #[test]
    fn try_parse_success() {
        let content = "time:0.042\ntime-wall:0.050";
        let meta = MetaFile::try_parse(content).unwrap();
        assert!((meta.get_f64("time").unwrap() - 0.042).abs() < 0.001);
    }

    #[test]
    fn try_parse_value_with_colon() {
        // Values can contain colons (e.g., timestamps in messages)
        let content = "message:Error at 12:30:45";
        let meta = MetaFile::try_parse(content).unwrap();
        assert_eq!(meta.message().as_deref(), Some("Error at 12:30:45"));
    }

    #[test]
    fn try_parse_missing_colon() {
        let content = "time:0.042\ninvalid line\nexitcode:0";
        let err = MetaFile::try_parse(content).unwrap_err();
        assert_eq!(err.line_number, 2);
        assert_eq!(err.line, "invalid line");
        assert!(err.message.contains("missing colon"));
    }

    #[test]
    fn try_parse_empty_key() {
        let err = MetaFile::try_parse(":value").unwrap_err();
        assert_eq!(err.line_number, 1);
        assert!(err.message.contains("empty key"));
    }

    #[test]
    fn parse_lenient_skips_invalid() {
        let content = "time:0.042\ninvalid line\nexitcode:0";
        let meta = MetaFile::parse(content);
        assert!((meta.get_f64("time").unwrap() - 0.042).abs() < 0.001);
        assert_eq!(meta.exit_code(), Some(0));
    }

    #[test]
    fn whitespace_around_keys_and_values() {
        let meta = MetaFile::try_parse("  time  :  0.042  ").unwrap();
        assert!((meta.get_f64("time").unwrap() - 0.042).abs() < 0.001);
    }
}
