//! Model readiness check command

use anyhow::Result;
use tally_core::Config;

use super::load_models;

pub async fn cmd_check(config: &Config) -> Result<()> {
    println!("🔍 Checking models...");
    match &config.source {
        Some(source) => println!("   Config: {}", source.display()),
        None => println!("   Config: built-in defaults"),
    }
    println!(
        "   Embedding: {} via {} ({})",
        config.embedding.model, config.embedding.backend, config.embedding.host
    );

    let state = load_models(config)?;
    let classifier = state.classifier();
    println!(
        "   Classifier: {} categories, input width {}",
        classifier.num_categories(),
        classifier.input_dim()
    );
    if !classifier.fingerprint().is_empty() {
        println!("   Fingerprint: {}", &classifier.fingerprint()[..12]);
    }

    let readiness = state.ensure_ready().await?;
    println!();
    println!(
        "✅ Ready: {} produces {}-dimensional embeddings",
        readiness.embedding_model, readiness.dimensions
    );
    Ok(())
}
