//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use std::path::Path;

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, workspace).await,
    }
}

async fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".scholar");
            tokio::fs::create_dir_all(&config_dir).await?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = scholar_core::ScholarConfig::default().to_toml()?;
            tokio::fs::write(&config_path, &toml_str).await?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = scholar_core::config::load_config(Some(workspace), None)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            println!("{}", config.to_toml()?);

            let key_status = |present: bool| if present { "set" } else { "not set" };
            println!(
                "# {}: {}",
                config.llm.api_key_env,
                key_status(config.llm.api_key.is_some())
            );
            println!(
                "# {}: {}",
                config.search.tavily_api_key_env,
                key_status(config.search.tavily_api_key.is_some())
            );
            println!(
                "# {}: {}",
                config.search.serpapi_api_key_env,
                key_status(config.search.serpapi_api_key.is_some())
            );
            for warning in config.validate()? {
                println!("# warning: {warning}");
            }
            Ok(())
        }
    }
}
