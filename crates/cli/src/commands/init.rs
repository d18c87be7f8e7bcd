//! `stepwise init`: write a default config file.

use std::path::Path;

use stepwise_config::AppConfig;

pub fn run(config: Option<&Path>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = match config {
        Some(path) => path.to_path_buf(),
        None => AppConfig::config_dir().join("config.toml"),
    };

    if path.exists() && !force {
        eprintln!("Config already exists at {} (use --force to overwrite)", path.display());
        return Ok(());
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, AppConfig::default_toml())?;
    eprintln!("Wrote {}", path.display());
    eprintln!("Set api_key (or STEPWISE_API_KEY) and the models, then try: stepwise run \"2+2?\"");
    Ok(())
}
