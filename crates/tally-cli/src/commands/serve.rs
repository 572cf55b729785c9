//! Server command implementation

use anyhow::Result;
use tally_core::Config;

use super::load_models;

pub async fn cmd_serve(config: &Config, host: &str, port: u16, no_auth: bool) -> Result<()> {
    println!("🚀 Starting Tally categorization server...");
    println!(
        "   Embedding: {} via {}",
        config.embedding.model, config.embedding.backend
    );
    println!("   Listening: http://{}:{}", host, port);

    // Parse API keys from environment (comma-separated)
    let api_keys = parse_list(&std::env::var("TALLY_API_KEYS").unwrap_or_default());
    let allowed_origins = parse_list(&std::env::var("TALLY_ALLOWED_ORIGINS").unwrap_or_default());

    if no_auth {
        println!();
        println!("   ⚠️  Authentication DISABLED - do not expose to network!");
    } else if api_keys.is_empty() {
        println!("   🔒 Authentication: no API keys configured (set TALLY_API_KEYS)");
    } else {
        println!(
            "   🔑 API keys: {} configured (TALLY_API_KEYS)",
            api_keys.len()
        );
    }
    if !allowed_origins.is_empty() {
        println!("   🌐 CORS origins: {}", allowed_origins.join(", "));
    }
    println!();
    println!("   Press Ctrl+C to stop");

    let models = load_models(config)?;

    let server_config = tally_server::ServerConfig {
        require_auth: !no_auth,
        allowed_origins,
        api_keys,
    };
    tally_server::serve_with_config(models, config, host, port, server_config).await?;

    Ok(())
}

/// Split a comma-separated environment value, dropping blanks
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
