//! # Engine Configuration
//!
//! [`EngineConfig`] is read from YAML and then overridden from the
//! environment:
//!
//! | Variable                  | Field           | Default    |
//! |---------------------------|-----------------|------------|
//! | `SAFETRACE_RULES_PATH`    | `rules_path`    | unset      |
//! | `SAFETRACE_SCOPE_FIELD`   | `scope_field`   | `category` |
//! | `SAFETRACE_ALERT_PREFIX`  | `alert_prefix`  | `ALT`      |
//! | `SAFETRACE_RECALL_PREFIX` | `recall_prefix` | `RCL`      |
//!
//! Rule files are YAML documents of the form `{rules: [...]}`.

use std::path::{Path, PathBuf};

use safetrace_rules::{RuleDefinition, RuleSet, DEFAULT_SCOPE_FIELD};
use serde::{Deserialize, Serialize};

/// Identity recorded on alerts raised by detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomatedActor {
    /// Reporter / initiator id.
    pub id: String,
    /// Reporter / initiator name.
    pub name: String,
}

impl Default for AutomatedActor {
    fn default() -> Self {
        Self {
            id: "system".to_string(),
            name: "detector".to_string(),
        }
    }
}

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rule file loaded at startup.
    pub rules_path: Option<PathBuf>,
    /// Product field holding the detection category.
    pub scope_field: String,
    /// Prefix of generated alert codes.
    pub alert_prefix: String,
    /// Prefix of generated recall codes.
    pub recall_prefix: String,
    /// Reporter of detection-raised alerts.
    pub automated_reporter: AutomatedActor,
    /// Attach evaluation traces to proposed alerts.
    pub include_trace: bool,
    /// Complete a recall when its progress reaches 100%.
    pub auto_complete: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rules_path: None,
            scope_field: DEFAULT_SCOPE_FIELD.to_string(),
            alert_prefix: "ALT".to_string(),
            recall_prefix: "RCL".to_string(),
            automated_reporter: AutomatedActor::default(),
            include_trace: false,
            auto_complete: true,
        }
    }
}

impl EngineConfig {
    /// Parse YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text).map_err(|e| ConfigError::Yaml {
            path: PathBuf::from("<inline>"),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read a YAML file.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = read(path)?;
        let config: Self = serde_yaml::from_str(&text).map_err(|e| ConfigError::Yaml {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides(|var| std::env::var(var).ok())
    }

    /// Load `path` if given (defaults otherwise), then apply the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(p) => Self::from_yaml_file(p)?,
            None => Self::default(),
        };
        base.with_env_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        if let Some(path) = get("SAFETRACE_RULES_PATH") {
            self.rules_path = Some(PathBuf::from(path));
        }
        if let Some(field) = get("SAFETRACE_SCOPE_FIELD") {
            self.scope_field = field;
        }
        if let Some(prefix) = get("SAFETRACE_ALERT_PREFIX") {
            self.alert_prefix = prefix;
        }
        if let Some(prefix) = get("SAFETRACE_RECALL_PREFIX") {
            self.recall_prefix = prefix;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check field values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scope_field.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "scope_field",
                reason: "must not be blank".to_string(),
            });
        }
        let prefixes = [
            ("alert_prefix", &self.alert_prefix),
            ("recall_prefix", &self.recall_prefix),
        ];
        for (field, prefix) in prefixes {
            let allowed = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-';
            if prefix.is_empty() || !prefix.chars().all(allowed) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!(
                        "{prefix:?} must be non-empty ASCII letters, digits, '-' or '_'"
                    ),
                });
            }
        }
        if self.automated_reporter.id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "automated_reporter.id",
                reason: "must not be blank".to_string(),
            });
        }
        Ok(())
    }

    /// Read the configured rule file.
    pub fn load_rules(&self) -> Result<Vec<RuleDefinition>, ConfigError> {
        let path = self.rules_path.as_deref().ok_or(ConfigError::MissingRulesPath)?;
        load_rule_file(path)
    }
}

/// Read a `{rules: [...]}` YAML (or JSON) document.
pub fn load_rule_file(path: &Path) -> Result<Vec<RuleDefinition>, ConfigError> {
    let text = read(path)?;
    parse_rule_set(&text).map_err(|e| ConfigError::Yaml {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Parse a `{rules: [...]}` document.
pub fn parse_rule_set(text: &str) -> Result<Vec<RuleDefinition>, serde_yaml::Error> {
    serde_yaml::from_str::<RuleSet>(text).map(|set| set.rules)
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A file is not valid YAML for its shape.
    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: serde_yaml::Error,
    },

    /// A field has an unusable value.
    #[error("invalid configuration value for {field}: {reason}")]
    Invalid {
        /// Field name.
        field: &'static str,
        /// What is wrong.
        reason: String,
    },

    /// Rules were requested but no rule file is configured.
    #[error("no rule file configured (set rules_path or SAFETRACE_RULES_PATH)")]
    MissingRulesPath,
}
