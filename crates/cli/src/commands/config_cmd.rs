//! `cpmagent config`: Print the effective configuration.

use cpmagent_config::AppConfig;

pub fn show(mut config: AppConfig) -> anyhow::Result<()> {
    if config.model.api_key.is_some() {
        config.model.api_key = Some("***".into());
    }
    println!("{}", config.to_toml()?);
    Ok(())
}
