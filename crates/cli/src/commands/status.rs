//! `mindthread status` — Show system status.

use mindthread_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let agent = config.to_agent_config();

    println!("🧵 MindThread Status");
    println!("====================");
    println!("  Config dir:    {}", AppConfig::config_dir().display());
    println!("  Agent:         {}", agent.name);
    println!("  Provider:      {}", config.default_provider);
    println!("  Model:         {}", agent.model);
    println!(
        "  Embeddings:    {}",
        agent.embedding_model.as_deref().unwrap_or("none")
    );
    println!("  Temperature:   {}", agent.temperature);
    println!("  History:       {} messages per session", agent.max_conversation_history);
    println!("  Sessions:      up to {}", agent.max_sessions);
    println!("  Deadline:      {} ms", agent.max_processing_time_ms);
    println!(
        "  Memory:        {}",
        if config.memory.enabled { "in-process graph" } else { "disabled" }
    );
    println!(
        "  Clustering:    {}",
        if config.clustering.enabled && config.memory.enabled {
            format!("every {}s", config.clustering.refresh_interval_secs)
        } else {
            "disabled".to_string()
        }
    );
    println!(
        "  Speech:        {}",
        if config.speech.is_configured() { "configured" } else { "off" }
    );
    println!("  API key:       {}", if config.has_api_key() { "set" } else { "missing" });

    // Check config file existence
    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  ✅ Config file found");
    } else {
        println!("\n  ⚠️  No config file — run `mindthread config default > {}`", config_path.display());
    }

    Ok(())
}
