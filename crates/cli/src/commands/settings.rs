//! Local CLI settings commands

use anyhow::Result;

use crate::config::Config;
use crate::output::{print_info, print_json, print_success, OutputFormat};

/// Show the effective settings file
pub fn show_settings(format: OutputFormat) -> Result<()> {
    let path = Config::config_path()?;
    let config = Config::load_from(&path)?;

    match format {
        OutputFormat::Json => print_json(&config)?,
        OutputFormat::Table => {
            print_info(&format!("Settings file: {}", path.display()));
            println!(
                "api_url:        {}",
                config.api_url.as_deref().unwrap_or("(unset)")
            );
            println!(
                "default_format: {}",
                config
                    .default_format
                    .map(|f| format!("{:?}", f).to_lowercase())
                    .unwrap_or_else(|| "(unset)".to_string())
            );
        }
    }

    Ok(())
}

/// Update the settings file; unset arguments keep their stored value
pub fn set_settings(api_url: Option<String>, default_format: Option<OutputFormat>) -> Result<()> {
    let path = Config::config_path()?;
    let mut config = Config::load_from(&path)?;

    if let Some(url) = api_url {
        url::Url::parse(&url)?;
        config.api_url = Some(url);
    }
    if let Some(format) = default_format {
        config.default_format = Some(format);
    }

    config.save_to(&path)?;
    print_success(&format!("Settings saved to {}", path.display()));
    Ok(())
}
