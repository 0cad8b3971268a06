//! `cpmagent download`: Fetch the configured GGUF files from the Hugging Face Hub.

use anyhow::Context;
use cpmagent_config::AppConfig;
use cpmagent_providers::{LocalModelSpec, download_model_files};

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let spec = LocalModelSpec::from_config(&config.model);
    eprintln!("Downloading {} into {}", spec.repo, spec.cache_dir.display());

    // hf-hub's sync API blocks on network I/O.
    let paths = tokio::task::spawn_blocking(move || download_model_files(&spec))
        .await
        .context("Download task panicked")??;

    for path in paths {
        println!("{}", path.display());
    }
    Ok(())
}
