use anyhow::{Result, bail};
use barb_pipeline::app::{barb_client, secret_store};
use barb_pipeline::config::{DEFAULT_CONFIG_PATH, PipelineConfig};
use barb_pipeline::gcp::token_provider;
use std::env;

const USAGE: &str = "usage: list_reference_data <stations | viewing_stations | panels | buyers | advertisers> [name regex]";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(kind) = args.first() else {
        bail!(USAGE);
    };
    let filter = args.get(1).map(|s| s.as_str());

    let config = PipelineConfig::load(DEFAULT_CONFIG_PATH)?;
    let secrets = secret_store(&config, token_provider(&config.gcp)?)?;
    let client = barb_client(&config, secrets.as_ref()).await?;

    println!("=== BARB {} ===\n", kind.to_uppercase());
    let rows: Vec<(String, String)> = match kind.as_str() {
        "stations" => client
            .list_stations(filter)
            .await?
            .into_iter()
            .map(|s| (s.station_code.to_string(), s.station_name))
            .collect(),
        "viewing_stations" => client
            .list_viewing_stations(filter)
            .await?
            .into_iter()
            .map(|s| (s.viewing_station_code.to_string(), s.viewing_station_name))
            .collect(),
        "panels" => client
            .list_panels(filter)
            .await?
            .into_iter()
            .map(|p| {
                let region = if p.is_macro_region {
                    format!("{} (macro)", p.panel_region)
                } else {
                    p.panel_region
                };
                (p.panel_code.to_string(), region)
            })
            .collect(),
        "buyers" => client
            .list_buyers(filter)
            .await?
            .into_iter()
            .map(|b| (b.buyer_code.map(|c| c.to_string()).unwrap_or_default(), b.buyer_name))
            .collect(),
        "advertisers" => client
            .list_advertisers(filter)
            .await?
            .into_iter()
            .map(|a| {
                (
                    a.advertiser_code.map(|c| c.to_string()).unwrap_or_default(),
                    a.advertiser_name,
                )
            })
            .collect(),
        _ => bail!(USAGE),
    };

    for (code, name) in &rows {
        println!("{:>8}  {}", code, name);
    }
    println!("\nTotal: {}", rows.len());
    Ok(())
}
