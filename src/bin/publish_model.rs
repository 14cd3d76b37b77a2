use anyhow::Context;

use iris_model_service::{ModelStore, PublishConfig, init_tracing, publish};

fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = PublishConfig::from_env()?;
    let store = ModelStore::open(&config.store_path)?;
    let info = publish(&config.model_path, &config.model_name, &store)
        .with_context(|| format!("cannot publish {}", config.model_path.display()))?;

    println!("Model tag = {}", info.tag);
    Ok(())
}
