//! `mindthread config` — Configuration management commands.

use mindthread_config::AppConfig;

const REDACTED: &str = "***";

/// Copy of `config` with every API key masked.
fn redacted(config: &AppConfig) -> AppConfig {
    let mut config = config.clone();
    if config.api_key.is_some() {
        config.api_key = Some(REDACTED.into());
    }
    for provider in config.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some(REDACTED.into());
        }
    }
    config
}

/// Problems that do not stop the agent from starting.
fn warnings(config: &AppConfig) -> Vec<&'static str> {
    let mut warnings = Vec::new();

    if !config.has_api_key() {
        warnings.push("No API key set (set OPENROUTER_API_KEY, OPENAI_API_KEY or MINDTHREAD_API_KEY)");
    }

    if config.clustering.enabled && !config.memory.enabled {
        warnings.push("Clustering is enabled but memory is disabled; clustering will not run");
    }

    if config.embedding_model.is_none() && config.clustering.enabled {
        warnings.push("No embedding_model set; memories are stored without embeddings and cannot be clustered");
    }

    let speech = &config.speech;
    if speech.transcribe_command.is_some() != speech.synthesize_command.is_some() {
        warnings.push("Only one speech command is configured; audio input or output will be unavailable");
    }

    warnings
}

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let warnings = warnings(&config);
            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Provider:    {}", config.default_provider);
            println!("   Model:       {}", config.default_model);
            println!("   Memory:      {}", if config.memory.enabled { "enabled" } else { "disabled" });
            println!(
                "   Clustering:  {} (every {}s, on failure: {:?})",
                if config.clustering.enabled { "enabled" } else { "disabled" },
                config.clustering.refresh_interval_secs,
                config.clustering.failure_policy
            );
            println!("   Speech:      {}", if config.speech.is_configured() { "configured" } else { "off" });
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&redacted(&config))?;
    println!("{toml_str}");
    Ok(())
}

pub async fn print_default() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", AppConfig::default_toml());
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}
