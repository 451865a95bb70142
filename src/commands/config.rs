//! Config command handler - neural setup wizard and settings display

use crate::cli::{Cli, ConfigArgs, ConfigOperation};
use crate::commands::render;
use crate::config::wizard::NeuralWizard;
use crate::config::Settings;
use crate::error::{NarsilError, Result};

pub fn run_config(cli: &Cli, settings: &Settings, args: &ConfigArgs) -> Result<String> {
    match args.operation {
        ConfigOperation::Neural => run_neural_wizard(),
        ConfigOperation::Show => run_show(cli, settings),
    }
}

fn run_neural_wizard() -> Result<String> {
    let runtime = tokio::runtime::Runtime::new().map_err(|e| NarsilError::ConfigError {
        message: format!("Failed to create tokio runtime: {}", e),
    })?;
    runtime
        .block_on(NeuralWizard::new().run())
        .map_err(|e| NarsilError::ConfigError {
            message: format!("{:#}", e),
        })?;
    Ok(String::new())
}

fn run_show(cli: &Cli, settings: &Settings) -> Result<String> {
    let path = cli.config.clone().or_else(Settings::default_path);
    let body = toml::to_string_pretty(settings).map_err(|e| NarsilError::ConfigError {
        message: format!("failed to serialize settings: {}", e),
    })?;
    let text = match &path {
        Some(p) if p.exists() => format!("# {}\n{}", p.display(), body),
        Some(p) => format!("# {} (not found, defaults)\n{}", p.display(), body),
        None => format!("# defaults\n{}", body),
    };
    render(cli.format, text, settings)
}
