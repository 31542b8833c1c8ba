//! Command builder for the isolate CLI
//!
//! Builds command-line arguments for the isolate sandbox utility.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::types::{MountConfig, ResourceLimits};

/// Builder for isolate command-line arguments
#[derive(Debug)]
pub struct IsolateCommand {
    /// Path to the isolate binary
    isolate_path: PathBuf,
    /// One of --init, --run, --cleanup
    action: IsolateAction,
    /// -b, --box-id
    box_id: u32,
    /// Resource limits
    limits: ResourceLimits,
    mounts: Vec<MountConfig>,
    /// -E, --env
    env: HashMap<String, String>,
    /// -M, --meta
    meta_file: Option<PathBuf>,
    /// -i, --stdin
    stdin: Option<PathBuf>,
    /// -o, --stdout
    stdout: Option<PathBuf>,
    /// -r, --stderr
    stderr: Option<PathBuf>,
    /// --stderr-to-stdout (for combined compiler output)
    stderr_to_stdout: bool,
    working_dir: Option<String>,
    command: Vec<String>,
    cgroup: bool,
}

impl IsolateCommand {
    /// Create a new isolate command builder
    pub fn new(isolate_path: impl Into<PathBuf>, box_id: u32) -> Self {
        Self {
            isolate_path: isolate_path.into(),
            action: IsolateAction::Run,
            box_id,
            limits: ResourceLimits::none(),
            mounts: Vec::new(),
            env: HashMap::new(),
            meta_file: None,
            stdin: None,
            stdout: None,
            stderr: None,
            stderr_to_stdout: false,
            working_dir: None,
            command: Vec::new(),
            cgroup: false,
        }
    }

    /// Set the action to perform
    pub fn action(mut self, action: IsolateAction) -> Self {
        self.action = action;
        self
    }

    /// Set resource limits
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Add multiple directory mounts
    pub fn mounts(mut self, mounts: impl IntoIterator<Item = MountConfig>) -> Self {
        self.mounts.extend(mounts);
        self
    }

    /// Set an environment variable inside the sandbox
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the meta file path for execution results
    pub fn meta_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.meta_file = Some(path.into());
        self
    }

    /// Set stdin file path
    pub fn stdin(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    /// Set stdout file path
    pub fn stdout(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout = Some(path.into());
        self
    }

    /// Set stderr file path
    pub fn stderr(mut self, path: impl Into<PathBuf>) -> Self {
        self.stderr = Some(path.into());
        self
    }

    /// Redirect stderr into stdout (used to capture combined compiler output)
    pub fn stderr_to_stdout(mut self, enable: bool) -> Self {
        self.stderr_to_stdout = enable;
        self
    }

    /// Set the working directory inside the sandbox
    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the command to run
    pub fn command(mut self, cmd: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.command = cmd.into_iter().map(Into::into).collect();
        self
    }

    /// Enable cgroup support for memory limiting
    pub fn cgroup(mut self, enable: bool) -> Self {
        self.cgroup = enable;
        self
    }

    /// Build the command-line arguments
    ///
    /// Consumes self to avoid cloning the command vector.
    pub fn build(self) -> Vec<String> {
        let mut args = vec![self.isolate_path.to_string_lossy().into_owned()];

        // Box ID
        args.push(format!("--box-id={}", self.box_id));

        // Cgroup support
        if self.cgroup {
            args.push("--cg".to_string());
        }

        match self.action {
            IsolateAction::Init => {
                args.push("--init".to_string());
            }
            IsolateAction::Cleanup => {
                args.push("--cleanup".to_string());
            }
            IsolateAction::Run => {
                args.push("--run".to_string());

                // Resource limits
                if let Some(time) = self.limits.time_limit {
                    args.push(format!("--time={time}"));
                }
                if let Some(wall_time) = self.limits.wall_time_limit {
                    args.push(format!("--wall-time={wall_time}"));
                }
                if let Some(extra_time) = self.limits.extra_time {
                    args.push(format!("--extra-time={extra_time}"));
                }
                if let Some(memory) = self.limits.memory_limit {
                    if self.cgroup {
                        args.push(format!("--cg-mem={memory}"));
                    } else {
                        args.push(format!("--mem={memory}"));
                    }
                }
                if let Some(stack) = self.limits.stack_limit {
                    args.push(format!("--stack={stack}"));
                }
                if let Some(procs) = self.limits.max_processes {
                    args.push(format!("--processes={procs}"));
                }
                if let Some(fsize) = self.limits.max_output {
                    args.push(format!("--fsize={fsize}"));
                }
                if let Some(open_files) = self.limits.max_open_files {
                    args.push(format!("--open-files={open_files}"));
                }

                // Mounts
                for mount in &self.mounts {
                    // Skip optional mounts whose source doesn't exist
                    if mount.optional && !Path::new(&mount.source).exists() {
                        continue;
                    }
                    let mut opts = String::new();
                    if mount.writable {
                        opts.push_str(":rw");
                    }
                    if mount.optional {
                        opts.push_str(":maybe");
                    }
                    args.push(format!("--dir={}={}{}", mount.target, mount.source, opts));
                }

                // Environment: only what was explicitly set, nothing inherited
                for (key, value) in &self.env {
                    args.push(format!("--env={key}={value}"));
                }

                // Meta file
                if let Some(ref meta) = self.meta_file {
                    args.push(format!("--meta={}", meta.display()));
                }

                // I/O redirection
                if let Some(ref stdin) = self.stdin {
                    args.push(format!("--stdin={}", stdin.display()));
                }
                if let Some(ref stdout) = self.stdout {
                    args.push(format!("--stdout={}", stdout.display()));
                }
                if self.stderr_to_stdout {
                    args.push("--stderr-to-stdout".to_string());
                } else if let Some(ref stderr) = self.stderr {
                    args.push(format!("--stderr={}", stderr.display()));
                }

                // Working directory
                if let Some(ref dir) = self.working_dir {
                    args.push(format!("--chdir={dir}"));
                }

                // Separator and command
                args.push("--".to_string());
                args.extend(self.command);
            }
        }

        args
    }

    /// Get the box ID
    pub fn box_id(&self) -> u32 {
        self.box_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolateAction {
    /// Initialize a new box
    Init,
    /// Run a command in the box
    Run,
    /// Clean up a box
    Cleanup,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_command() {
        let cmd = IsolateCommand::new("isolate", 0).action(IsolateAction::Init);
        assert_eq!(cmd.build(), vec!["isolate", "--box-id=0", "--init"]);
    }

    #[test]
    fn cleanup_command() {
        let cmd = IsolateCommand::new("isolate", 5).action(IsolateAction::Cleanup);
        assert_eq!(cmd.build(), vec!["isolate", "--box-id=5", "--cleanup"]);
    }

    #[test]
    fn run_command_with_limits() {
        let limits = ResourceLimits::none()
            .with_time_limit(2.0)
            .with_memory_limit(262144);
        let args = IsolateCommand::new("isolate", 0)
            .action(IsolateAction::Run)
            .limits(limits)
            .command(vec!["/bin/bash", "run.sh"])
            .build();

        assert!(args.contains(&"--time=2".to_string()));
        assert!(args.contains(&"--mem=262144".to_string()));
        assert!(args.contains(&"--".to_string()));
        assert!(args.contains(&"run.sh".to_string()));
    }

    #[test]
    fn run_command_with_cgroup() {
        let limits = ResourceLimits::none().with_memory_limit(262144);
        let args = IsolateCommand::new("isolate", 0)
            .action(IsolateAction::Run)
            .limits(limits)
            .cgroup(true)
            .command(vec!["./main"])
            .build();

        assert!(args.contains(&"--cg".to_string()));
        assert!(args.contains(&"--cg-mem=262144".to_string()));
    }

    #[test]
    fn all_resource_limits() {
        let limits = ResourceLimits {
            time_limit: Some(2.0),
            wall_time_limit: Some(5.0),
            memory_limit: Some(262144),
            stack_limit: Some(131072),
            max_processes: Some(4),
            max_output: Some(65536),
            max_open_files: Some(128),
            extra_time: Some(0.5),
        };
        let args = IsolateCommand::new("isolate", 0)
            .action(IsolateAction::Run)
            .limits(limits)
            .command(vec!["./main"])
            .build();

        assert!(args.contains(&"--time=2".to_string()));
        assert!(args.contains(&"--wall-time=5".to_string()));
        assert!(args.contains(&"--mem=262144".to_string()));
        assert!(args.contains(&"--stack=131072".to_string()));
        assert!(args.contains(&"--processes=4".to_string()));
        assert!(args.contains(&"--fsize=65536".to_string()));
        assert!(args.contains(&"--open-files=128".to_string()));
        assert!(args.contains(&"--extra-time=0.5".to_string()));
    }

    #[test]
    fn no_limits_set() {
        let args = IsolateCommand::new("isolate", 0)
            .action(IsolateAction::Run)
            .command(vec!["./main"])
            .build();

        assert!(!args.iter().any(|a| a.starts_with("--time=")));
        assert!(!args.iter().any(|a| a.starts_with("--wall-time=")));
        assert!(!args.iter().any(|a| a.starts_with("--mem=")));
        assert!(!args.iter().any(|a| a.starts_with("--stack=")));
    }

    #[test]
    fn mount_read_only() {
        let mount = MountConfig {
            source: "/etc".to_string(),
            target: "/etc".to_string(),
            writable: false,
            optional: false,
        };
        let args = IsolateCommand::new("isolate", 0)
            .action(IsolateAction::Run)
            .mounts(vec![mount])
            .command(vec!["./main"])
            .build();

        assert!(args.contains(&"--dir=/etc=/etc".to_string()));
    }

    #[test]
    fn mount_read_write() {
        let mount = MountConfig {
            source: "/tmp/work".to_string(),
            target: "/work".to_string(),
            writable: true,
            optional: false,
        };
        let args = IsolateCommand::new("isolate", 0)
            .action(IsolateAction::Run)
            .mounts(vec![mount])
            .command(vec!["./main"])
            .build();

        assert!(args.contains(&"--dir=/work=/tmp/work:rw".to_string()));
    }

    #[test]
    fn env_is_explicit_only() {
        let args = IsolateCommand::new("isolate", 0)
            .action(IsolateAction::Run)
            .env("HOME", "/tmp")
            .env("PATH", "/usr/bin:/bin")
            .command(vec!["./main"])
            .build();

        assert!(args.iter().any(|a| a == "--env=HOME=/tmp"));
        assert!(args.iter().any(|a| a == "--env=PATH=/usr/bin:/bin"));
        // The full host environment is never forwarded
        assert!(!args.contains(&"--full-env".to_string()));
    }

    #[test]
    fn io_redirects() {
        let args = IsolateCommand::new("isolate", 0)
            .action(IsolateAction::Run)
            .stdin("/box/stdin.txt")
            .stdout("/box/stdout.txt")
            .stderr("/box/stderr.txt")
            .command(vec!["./main"])
            .build();

        assert!(args.contains(&"--stdin=/box/stdin.txt".to_string()));
        assert!(args.contains(&"--stdout=/box/stdout.txt".to_string()));
        assert!(args.contains(&"--stderr=/box/stderr.txt".to_string()));
    }

    #[test]
    fn stderr_to_stdout_replaces_stderr_redirect() {
        let args = IsolateCommand::new("isolate", 0)
            .action(IsolateAction::Run)
            .stderr("/box/stderr.txt")
            .stderr_to_stdout(true)
            .command(vec!["/bin/bash", "compile.sh"])
            .build();

        assert!(args.contains(&"--stderr-to-stdout".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--stderr=")));
    }

    #[test]
    fn meta_file_and_working_dir() {
        let args = IsolateCommand::new("isolate", 0)
            .action(IsolateAction::Run)
            .meta_file("/var/local/lib/isolate/0/box/meta.txt")
            .working_dir("/box")
            .command(vec!["./main"])
            .build();

        assert!(args.contains(&"--meta=/var/local/lib/isolate/0/box/meta.txt".to_string()));
        assert!(args.contains(&"--chdir=/box".to_string()));
    }

    #[test]
    fn command_follows_separator() {
        let args = IsolateCommand::new("isolate", 0)
            .action(IsolateAction::Run)
            .command(vec!["/bin/bash", "run.sh"])
            .build();

        let sep_pos = args.iter().position(|a| a == "--").unwrap();
        assert_eq!(args[sep_pos + 1], "/bin/bash");
        assert_eq!(args[sep_pos + 2], "run.sh");
    }

    #[test]
    fn init_ignores_run_options() {
        let args = IsolateCommand::new("isolate", 0)
            .action(IsolateAction::Init)
            .env("PATH", "/usr/bin")
            .stdin("/box/stdin.txt")
            .working_dir("/box")
            .command(vec!["./main"])
            .build();

        assert_eq!(args, vec!["isolate", "--box-id=0", "--init"]);
    }

    #[test]
    fn cgroup_with_init() {
        let args = IsolateCommand::new("isolate", 0)
            .action(IsolateAction::Init)
            .cgroup(true)
            .build();

        assert!(args.contains(&"--cg".to_string()));
        assert!(args.contains(&"--init".to_string()));
    }

    #[test]
    fn box_id_accessor() {
        let cmd = IsolateCommand::new("isolate", 42);
        assert_eq!(cmd.box_id(), 42);
    }
}
