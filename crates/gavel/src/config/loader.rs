//! Configuration file loading
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;

use config::{Config as ConfigBuilder, File, FileFormat};

use crate::config::{Config, ConfigError};

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        for (id, lang) in &self.languages {
            if lang.name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty name"
                )));
            }
            if lang.source_name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty source file name"
                )));
            }
            if lang.source_name.contains("..") || lang.source_name.starts_with('/') {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' source file name escapes the sandbox"
                )));
            }
            if lang.run_command.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty run command"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let toml = r#"
[languages.test]
name = "Test Language"
source_name = "main.t"
run_command = "./test"
"#;

        let config = Config::parse_toml(toml).unwrap();
        assert!(config.languages.contains_key("test"));
        assert_eq!(config.languages["test"].name, "Test Language");
        assert!(!config.languages["test"].is_compiled());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
isolate_path = "/usr/local/bin/isolate"

[queue]
submissions_key = "judge:pending"

[default_limits]
time_limit = 2.0
memory_limit = 262144

[languages.cpp17]
name = "C++ 17 (GCC)"
source_name = "main.cpp"
compile_command = "g++ -std=c++17 -O2 -o main main.cpp"
run_command = "./main"
"#;

        let config = Config::parse_toml(toml).unwrap();
        assert_eq!(
            config.isolate_path,
            Some(std::path::PathBuf::from("/usr/local/bin/isolate"))
        );
        assert_eq!(config.queue.submissions_key, "judge:pending");
        assert_eq!(config.default_limits.time_limit, Some(2.0));
        assert_eq!(config.default_limits.memory_limit, Some(262144));
        assert!(config.languages["cpp17"].is_compiled());
    }

    #[test]
    fn partial_limits_dont_override_unspecified_fields() {
        let toml = r#"
[languages.go]
name = "Go"
source_name = "main.go"
compile_command = "go build -o main main.go"
run_command = "./main"

[languages.go.limits]
max_processes = 50
"#;

        let config = Config::parse_toml(toml).unwrap();
        let limits = config.languages["go"].limits.as_ref().unwrap();

        // Only max_processes was specified; other fields stay None so they
        // don't clobber worker defaults via with_overrides
        assert_eq!(limits.max_processes, Some(50));
        assert_eq!(limits.time_limit, None);
        assert_eq!(limits.memory_limit, None);
    }

    #[test]
    fn invalid_empty_name() {
        let toml = r#"
[languages.test]
name = ""
source_name = "main.t"
run_command = "./test"
"#;

        assert!(Config::parse_toml(toml).is_err());
    }

    #[test]
    fn invalid_empty_run_command() {
        let toml = r#"
[languages.test]
name = "Test"
source_name = "main.t"
run_command = "  "
"#;

        assert!(Config::parse_toml(toml).is_err());
    }

    #[test]
    fn invalid_escaping_source_name() {
        let toml = r#"
[languages.test]
name = "Test"
source_name = "../escape.t"
run_command = "./test"
"#;

        assert!(Config::parse_toml(toml).is_err());
    }
}
