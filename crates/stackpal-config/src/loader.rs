//! Configuration loader with multi-source merging

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::{PalConfig, Paths};

const ENV_PREFIX: &str = "STACKPAL";

/// Separator between the prefix and nested keys in environment variables.
/// Single underscores are part of field names (`tcp_mss`).
const ENV_SEPARATOR: &str = "__";

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    user_config: bool,
    env_vars: Option<HashMap<String, String>>,
}

impl ConfigLoader {
    /// Create a new config loader with default project directory (current dir)
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            user_config: true,
            env_vars: None,
        }
    }

    /// Set the project directory
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Skip ~/.config/stackpal/config.toml
    pub fn without_user_config(mut self) -> Self {
        self.user_config = false;
        self
    }

    /// Read variables from `vars` instead of the process environment
    pub fn with_env_vars(mut self, vars: HashMap<String, String>) -> Self {
        self.env_vars = Some(vars);
        self
    }

    /// Load configuration from all sources with proper precedence, then validate
    pub fn load(self) -> Result<PalConfig> {
        let mut builder = config::Config::builder();

        // 1. Start with built-in defaults
        let defaults = PalConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2. User config (~/.config/stackpal/config.toml)
        if self.user_config
            && let Ok(user_config_file) = Paths::new().user_config_file()
            && user_config_file.exists()
        {
            builder = builder.add_source(toml_file(user_config_file));
        }

        // 3. Project config (stackpal.toml)
        let project_config_file = Paths::project_config_file(&self.project_dir);
        if project_config_file.exists() {
            builder = builder.add_source(toml_file(project_config_file));
        }

        // 4. Local config (stackpal.local.toml, gitignored)
        let local_config_file = Paths::local_config_file(&self.project_dir);
        if local_config_file.exists() {
            builder = builder.add_source(toml_file(local_config_file));
        }

        // 5. Environment variables (STACKPAL__SECTION__KEY)
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true)
                .source(self.env_vars),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let pal_config: PalConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        pal_config.validate()?;
        Ok(pal_config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default(self) -> PalConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn toml_file(path: PathBuf) -> config::File<config::FileSourceFile, config::FileFormat> {
    config::File::from(path)
        .required(false)
        .format(config::FileFormat::Toml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackpal::{AllocationStrategy, DiagTarget, GuardChecks};
    use std::fs;
    use tempfile::tempdir;

    use crate::{ClockSource, ConfigError};

    fn loader(project_dir: &Path) -> ConfigLoader {
        ConfigLoader::new()
            .with_project_dir(project_dir)
            .without_user_config()
            .with_env_vars(HashMap::new())
    }

    #[test]
    fn test_load_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let config = loader(temp_dir.path())
            .load()
            .expect("Failed to load config");

        assert_eq!(config, PalConfig::default());
    }

    #[test]
    fn test_load_project_config() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        let config_content = r#"
[guard]
nested = true
scheduling = false

[clock]
source = "wall"

[diagnostics]
target = "tracing"

[stack]
allocation = "static-pools"

[stack.sizing]
tcp_mss = 536
max_tcp_pcbs = 64
"#;
        fs::write(project_dir.join("stackpal.toml"), config_content)
            .expect("Failed to write config");

        let config = loader(project_dir).load().expect("Failed to load config");

        assert_eq!(
            config.guard,
            GuardChecks {
                nested: true,
                scheduling: false
            }
        );
        assert_eq!(config.clock.source, ClockSource::Wall);
        assert_eq!(config.diagnostics.target, DiagTarget::Tracing);
        assert_eq!(config.stack.allocation, AllocationStrategy::StaticPools);
        assert_eq!(config.stack.sizing.tcp_mss, 536);
        assert_eq!(config.stack.sizing.max_tcp_pcbs, 64);
        // Untouched keys keep their defaults.
        assert_eq!(config.stack.sizing.tcp_wnd, 32 * 1024);
        assert!(config.stack.protocols.ipv6);
    }

    #[test]
    fn test_local_overrides() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("stackpal.toml"),
            r#"
[diagnostics]
target = "stdout"
"#,
        )
        .expect("Failed to write project config");

        fs::write(
            project_dir.join("stackpal.local.toml"),
            r#"
[diagnostics]
target = "stderr"
"#,
        )
        .expect("Failed to write local config");

        let config = loader(project_dir).load().expect("Failed to load config");

        // Local config should override project config
        assert_eq!(config.diagnostics.target, DiagTarget::Stderr);
    }

    #[test]
    fn test_env_overrides_files() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("stackpal.toml"),
            "[guard]\nnested = true\nscheduling = true\n",
        )
        .expect("Failed to write config");

        let vars = HashMap::from([
            ("STACKPAL__GUARD__NESTED".to_string(), "false".to_string()),
            (
                "STACKPAL__STACK__TIMING__POLL_INTERVAL_MS".to_string(),
                "100".to_string(),
            ),
        ]);
        let config = loader(project_dir)
            .with_env_vars(vars)
            .load()
            .expect("Failed to load config");

        assert!(!config.guard.nested);
        assert!(config.guard.scheduling);
        assert_eq!(config.stack.timing.poll_interval_ms, 100);
    }

    #[test]
    fn test_only_stackpal_prefix_is_read() {
        let temp_dir = tempdir().expect("Failed to create temp dir");

        let vars = HashMap::from([
            ("OTHERAPP__GUARD__NESTED".to_string(), "false".to_string()),
            ("STACKPAL_GUARD__SCHEDULING".to_string(), "false".to_string()),
            (
                "STACKPAL__DIAGNOSTICS__TARGET".to_string(),
                "tracing".to_string(),
            ),
        ]);
        let config = loader(temp_dir.path())
            .with_env_vars(vars)
            .load()
            .expect("Failed to load config");

        assert_eq!(config.guard, PalConfig::default().guard);
        assert_eq!(config.diagnostics.target, DiagTarget::Tracing);
    }

    #[test]
    fn test_invalid_file_fails_validation() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("stackpal.toml"),
            "[stack.protocols]\ntcp = false\nudp = false\n",
        )
        .expect("Failed to write config");

        let err = loader(project_dir).load().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::ValidationError(_))
        ));
        assert_eq!(loader(project_dir).load_or_default(), PalConfig::default());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(project_dir.join("stackpal.toml"), "[clock]\nsource = \"sundial\"\n")
            .expect("Failed to write config");

        assert!(loader(project_dir).load().is_err());
    }
}
