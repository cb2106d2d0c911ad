//! `mindthread agent` — Interactive or single-message chat mode.

use std::path::PathBuf;
use std::sync::Arc;
use mindthread_agent::AgentRuntime;
use mindthread_config::AppConfig;
use mindthread_core::agent::{AgentInput, AgentResponse, PartialContext};
use mindthread_core::memory::MemoryEngine;
use mindthread_memory::InMemoryGraph;
use mindthread_providers::CommandSpeechEngine;
use mindthread_telemetry::AgentMetrics;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

pub struct AgentArgs {
    pub message: Option<String>,
    pub audio: Option<PathBuf>,
    pub speak: bool,
    pub session: Option<String>,
}

/// Wire provider, memory graph, capabilities, and speech into a runtime.
async fn build_runtime(config: &AppConfig) -> Result<AgentRuntime, Box<dyn std::error::Error>> {
    let provider = mindthread_providers::default_from_config(config)?;

    let memory: Option<Arc<dyn MemoryEngine>> = if config.memory.enabled {
        Some(Arc::new(InMemoryGraph::new()))
    } else {
        None
    };

    let workspace = AppConfig::config_dir().join("workspace");
    if let Err(e) = tokio::fs::create_dir_all(&workspace).await {
        warn!(path = %workspace.display(), error = %e, "Could not create workspace directory");
    }
    let registry = mindthread_tools::default_registry(memory.clone(), Some(workspace))?;

    let mut runtime = AgentRuntime::from_config(config, provider).with_registry(registry);
    if let Some(engine) = memory {
        runtime = runtime.with_memory(engine);
    }
    if let Some(speech) = CommandSpeechEngine::from_config(&config.speech) {
        runtime = runtime.with_speech(Arc::new(speech));
    }
    Ok(runtime)
}

fn print_response(response: &AgentResponse) {
    for line in response.content.lines() {
        println!("  Assistant > {line}");
    }
    if let Some(path) = &response.audio_path {
        println!("  Audio:      {}", path.display());
    }
    if !response.capabilities_used.is_empty() {
        eprintln!("  [used: {}]", response.capabilities_used.join(", "));
    }
    if let Some(kind) = response.metadata.error_kind {
        eprintln!("  [{kind} error, confidence {:.2}]", response.confidence);
    }
}

fn print_metrics(metrics: &AgentMetrics) {
    eprintln!("  {}", metrics.summary());
}

pub async fn run(args: AgentArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Fail before building anything when no key is set
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    export OPENROUTER_API_KEY='sk-or-v1-...'   (recommended)");
        eprintln!("    export OPENAI_API_KEY='sk-...'             (for OpenAI direct)");
        eprintln!("    export MINDTHREAD_API_KEY='sk-...'         (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let runtime = build_runtime(&config).await?;
    runtime.initialize().await?;

    let session_id = args
        .session
        .unwrap_or_else(|| format!("cli-{}", std::process::id()));
    info!(session = %session_id, "Starting agent session");
    let partial = PartialContext {
        session_id: Some(session_id.clone()),
        source: Some("cli".into()),
        synthesize_audio: args.speak,
        ..PartialContext::default()
    };

    let single = match (args.audio, args.message) {
        (Some(path), _) => Some(AgentInput::Audio(path)),
        (None, Some(msg)) => Some(AgentInput::Text(msg)),
        (None, None) => None,
    };

    if let Some(input) = single {
        eprint!("  Thinking...");
        let response = runtime.process_request(input, partial).await;
        eprint!("\r              \r");
        print_response(&response);
        print_metrics(&runtime.metrics());
        return Ok(());
    }

    // Interactive mode
    let capabilities = runtime.registry().ids().join(", ");
    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║       MindThread Agent — Interactive Mode    ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Provider:      {}", config.default_provider);
    println!("  Model:         {}", config.default_model);
    println!("  Capabilities:  {capabilities}");
    println!(
        "  Memory:        {}",
        if config.memory.enabled { "in-process graph" } else { "disabled" }
    );
    println!("  Session:       {session_id}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  '/metrics' shows statistics, '/clear' resets the session.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        use std::io::Write;
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "exit" | "quit" => break,
            "/metrics" => {
                print_metrics(&runtime.metrics());
                continue;
            }
            "/clear" => {
                if runtime.clear_session(&session_id).await {
                    println!("  Session cleared.");
                }
                continue;
            }
            _ => {}
        }

        eprint!("  ...");
        let response = runtime.process_request(line, partial.clone()).await;
        eprint!("\r     \r");
        print_response(&response);
        println!();
    }

    println!();
    print_metrics(&runtime.metrics());
    Ok(())
}
