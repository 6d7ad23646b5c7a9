use anyhow::{Context, Result, bail};
use barb_pipeline::app::secret_store;
use barb_pipeline::config::{DEFAULT_CONFIG_PATH, PipelineConfig};
use barb_pipeline::gcp::token_provider;
use std::env;

const USAGE: &str = "usage: manage_secret <get NAME | create NAME VALUE | update NAME VALUE>";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let config = PipelineConfig::load(DEFAULT_CONFIG_PATH)?;
    let secrets = secret_store(&config, token_provider(&config.gcp)?)?;

    match args.iter().map(|s| s.as_str()).collect::<Vec<_>>().as_slice() {
        ["get", name] => {
            let value = secrets
                .get_secret(name)
                .await
                .with_context(|| format!("Failed to read secret {}", name))?;
            println!("{}", value);
        }
        ["create", name, value] => {
            secrets
                .create_secret(name, value)
                .await
                .with_context(|| format!("Failed to create secret {}", name))?;
            println!("Created secret {}", name);
        }
        ["update", name, value] => {
            secrets
                .update_secret(name, value)
                .await
                .with_context(|| format!("Failed to update secret {}", name))?;
            println!("Added a new version of secret {}", name);
        }
        _ => bail!(USAGE),
    }
    Ok(())
}
