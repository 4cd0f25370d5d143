//! `tandem config` — configuration inspection commands.

use std::path::Path;

use tandem_config::AppConfig;

use super::run::load_config;

pub fn validate(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    let config = match load_config(path) {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ {e}");
            return Err(e);
        }
    };
    println!("   ✅ Config parsed successfully");

    let mut warnings = Vec::new();
    for agent in config.agents.all() {
        let Some(llm) = &agent.llm else { continue };
        let (name, _) = config.backend_for(llm)?;
        if config.require_api_key(name).is_err() {
            warnings.push(format!(
                "Agent '{}' uses backend '{name}' which has no API key",
                agent.name
            ));
        }
    }
    if config.execution.use_docker {
        warnings.push("Code runs in docker; make sure the daemon is reachable".to_string());
    }

    if warnings.is_empty() {
        println!("   ✅ All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   ⚠️  {w}");
        }
    }

    println!();
    println!("   Backend:    {}", config.default_backend);
    for (name, backend) in &config.backends {
        println!("     {name:<10} {} @ {}", backend.model, backend.api_base);
    }
    println!("   Agents:");
    for agent in config.agents.all() {
        let model = match &agent.llm {
            Some(llm) => config
                .backend_for(llm)
                .map(|(name, backend)| {
                    format!("{} ({name})", llm.model.as_deref().unwrap_or(&backend.model))
                })
                .unwrap_or_else(|e| e.to_string()),
            None => "no model".to_string(),
        };
        println!(
            "     {:<12} max auto-replies {:<3} human input {:<9} {model}",
            agent.name,
            agent.max_consecutive_auto_reply,
            format!("{:?}", agent.human_input_mode).to_lowercase(),
        );
    }
    println!(
        "   Retrieval:  {}",
        if config.retrieval.enabled {
            format!("{} ({})", config.retrieval.docs_path, config.retrieval.task)
        } else {
            "disabled".to_string()
        }
    );
    println!(
        "   Execution:  {}",
        if config.execution.enabled {
            format!(
                "{} in {}",
                if config.execution.use_docker { "docker" } else { "local" },
                config.execution.work_dir.display()
            )
        } else {
            "disabled".to_string()
        }
    );

    Ok(())
}

pub fn show(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(path)?;
    for backend in config.backends.values_mut() {
        if backend.api_key.is_some() {
            backend.api_key = Some("***".into());
        }
    }
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub fn path(path: Option<&Path>) {
    let config_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));
    println!("{}", config_path.display());
}
