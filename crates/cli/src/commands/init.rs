//! `tandem init` — write the default configuration file.

use std::path::Path;

use tandem_config::AppConfig;

pub fn run(path: Option<&Path>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));

    if config_path.exists() && !force {
        println!("⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or re-run with --force to overwrite.");
        return Ok(());
    }

    if let Some(dir) = config_path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("✅ Created config.toml at: {}", config_path.display());

    println!("\n📝 Next steps:");
    println!("   1. Set OPENAI_API_KEY, or point `default_backend` at `local`");
    println!("   2. Run: tandem");
    Ok(())
}
