//! Cli settings

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use loanflow::{Address, Deployment, PostFlowCheckSettings};
use loanflow_fake_chain::FakeChainConfig;
use serde::{Deserialize, Serialize};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "LOANFLOW";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Connected account when `--account` is not given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<Address>,
    pub deployment: Deployment,
    pub post_flow_check: PostFlowCheckSettings,
    pub fake_chain: FakeChainConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            account: None,
            deployment: loanflow_fake_chain::deployment(),
            post_flow_check: PostFlowCheckSettings {
                poll_interval: Duration::from_millis(100),
                max_attempts: 30,
            },
            // The chain does not outlive the process, hashes stored by an earlier run are unknown
            fake_chain: FakeChainConfig {
                confirm_unknown_transactions: true,
                ..Default::default()
            },
        }
    }
}

impl Settings {
    /// Load settings: defaults, then the file, then `LOANFLOW_*` variables
    ///
    /// A missing file is only an error when `required` is set.
    pub fn new(config_file: &Path, required: bool) -> Result<Self, ConfigError> {
        let default = Settings::default();

        Config::builder()
            // use defaults
            .add_source(Config::try_from(&default)?)
            // override with file contents
            .add_source(File::from(config_file).required(required))
            // override with environment
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::new(&dir.path().join("config.toml"), false).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_missing_required_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::new(&dir.path().join("config.toml"), true).is_err());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
account = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"

[post_flow_check]
max_attempts = 5

[fake_chain]
confirmation_delay = 250
"#,
        )
        .unwrap();

        let settings = Settings::new(&path, true).unwrap();
        assert_eq!(settings.account, Some(Address::repeat_byte(0xaa)));
        assert_eq!(settings.post_flow_check.max_attempts, 5);
        assert_eq!(
            settings.post_flow_check.poll_interval,
            Duration::from_millis(100)
        );
        assert_eq!(
            settings.fake_chain.confirmation_delay,
            Duration::from_millis(250)
        );
        assert!(settings.fake_chain.confirm_unknown_transactions);
        assert_eq!(settings.deployment, loanflow_fake_chain::deployment());
    }
}
