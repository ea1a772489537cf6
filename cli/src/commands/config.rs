use color_eyre::eyre::Result;

use crate::config::{config_path, SessionConfig, UserConfig};

pub fn run(path: bool, reset: bool, edit: bool) -> Result<()> {
    let config_file = config_path();

    if path {
        println!("{}", config_file.display());
        return Ok(());
    }

    if reset {
        UserConfig::default().save()?;
        println!("Config reset to defaults at: {}", config_file.display());
        return Ok(());
    }

    if edit {
        let editor = std::env::var("EDITOR").unwrap_or_else(|_| "nano".to_string());

        if !config_file.exists() {
            UserConfig::default().save()?;
        }

        std::process::Command::new(editor)
            .arg(&config_file)
            .status()?;

        if let Err(e) = SessionConfig::from_user(&UserConfig::load()).validate() {
            eprintln!("Warning: {}", e);
        }
        return Ok(());
    }

    let config = UserConfig::load();
    println!("Config file: {}", config_file.display());
    if !config_file.exists() {
        println!("(not created yet, showing defaults)");
    }
    println!();
    println!("{}", toml::to_string_pretty(&config)?);

    Ok(())
}
