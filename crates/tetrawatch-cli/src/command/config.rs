use std::path::PathBuf;

use clap::Subcommand;
use tetrawatch_pipeline::SessionConfig;
use tracing::info;

use crate::util::{Output, read_json_file};

#[derive(Debug, Clone, Subcommand)]
pub enum ConfigMode {
    /// Write the default configuration as JSON
    Create {
        /// Output file path (stdout if omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Load a configuration file and check every setting
    Validate {
        /// Configuration file to check
        #[arg(long)]
        config: PathBuf,
    },
}

pub fn run(mode: &ConfigMode) -> anyhow::Result<()> {
    match mode {
        ConfigMode::Create { output } => {
            Output::save_json(&SessionConfig::default(), output.clone())?;
            if let Some(path) = output {
                info!(path = %path.display(), "default configuration written");
            }
        }
        ConfigMode::Validate { config } => {
            let session_config: SessionConfig = read_json_file("configuration", config)?;
            session_config.validate()?;
            eprintln!("{}: configuration is valid", config.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_created_config_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        run(&ConfigMode::Create {
            output: Some(path.clone()),
        })
        .unwrap();
        run(&ConfigMode::Validate { config: path }).unwrap();
    }

    #[test]
    fn test_validate_reports_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = serde_json::to_value(SessionConfig::default()).unwrap();
        config["pipeline"]["target_fps"] = serde_json::json!(0);
        fs::write(&path, serde_json::to_vec(&config).unwrap()).unwrap();
        let err = run(&ConfigMode::Validate { config: path }).unwrap_err();
        assert!(err.to_string().contains("target_fps"), "{err}");
    }

    #[test]
    fn test_validate_reports_unreadable_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(run(&ConfigMode::Validate { config: path }).is_err());
    }
}
