//! Config command implementation.

use crate::core::config::Config;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

/// Configuration operations.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Validate configuration file.
    Validate,
    /// Print configuration with defaults applied.
    Show {
        /// Output format (toml, json).
        #[arg(long, default_value = "toml")]
        format: String,
    },
    /// Generate a configuration template.
    Generate {
        /// Output file path.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Config file read when the global `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "config/kvbridge.toml";

/// Run the config command against `config_path`, or the default path.
pub fn run_config(config_path: Option<&Path>, args: ConfigArgs) -> Result<()> {
    let config = config_path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
    match args.command {
        ConfigCommand::Validate => validate_config(config),
        ConfigCommand::Show { format } => {
            println!("{}", render_config(config, &format)?);
            Ok(())
        }
        ConfigCommand::Generate { output } => generate_config(output.as_deref()),
    }
}

fn validate_config(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("Config file not found: {:?}", path);
    }
    let config = Config::from_file(path)?;
    println!("✓ Configuration is valid");
    println!("  listener.bind = {}", config.listener.bind);
    println!("  backend.kind  = {}", config.backend.kind);
    Ok(())
}

/// Render the effective configuration in `format`.
fn render_config(path: &Path, format: &str) -> Result<String> {
    if !path.exists() {
        anyhow::bail!("Config file not found: {:?}", path);
    }
    let config = Config::from_file(path)?;

    match format {
        "json" => serde_json::to_string_pretty(&config).context("failed to render JSON"),
        "toml" => toml::to_string_pretty(&config).context("failed to render TOML"),
        other => anyhow::bail!("unknown format: {other} (expected toml or json)"),
    }
}

fn generate_config(output: Option<&Path>) -> Result<()> {
    let template = config_template();
    match output {
        Some(path) => {
            std::fs::write(path, template)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Generated config template: {:?}", path);
        }
        None => println!("{template}"),
    }
    Ok(())
}

fn config_template() -> &'static str {
    r#"# kvbridge configuration

[listener]
bind = "127.0.0.1:2379"

[cluster]
cluster_id = 1
member_id = 1

[backend]
kind = "memory"

[telemetry]
log_level = "info"
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_is_valid_config() {
        let config = Config::from_toml(config_template()).unwrap();
        assert_eq!(config.listener.bind, "127.0.0.1:2379");
        assert_eq!(config.backend.kind, "memory");
    }

    #[test]
    fn test_render_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.toml");
        std::fs::write(&path, "[cluster]\nmember_id = 3\n").unwrap();

        let json = render_config(&path, "json").unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["cluster"]["member_id"], 3);
        assert_eq!(value["listener"]["bind"], "127.0.0.1:2379");
    }

    #[test]
    fn test_validate_uses_given_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.toml");
        std::fs::write(&path, "[backend]\nkind = \"memory\"\n").unwrap();

        let args = ConfigArgs {
            command: ConfigCommand::Validate,
        };
        run_config(Some(&path), args).unwrap();

        let missing = ConfigArgs {
            command: ConfigCommand::Validate,
        };
        assert!(run_config(Some(&dir.path().join("absent.toml")), missing).is_err());
    }

    #[test]
    fn test_render_unknown_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.toml");
        std::fs::write(&path, "").unwrap();
        assert!(render_config(&path, "yaml").is_err());
    }
}
