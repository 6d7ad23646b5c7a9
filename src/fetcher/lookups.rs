use regex::RegexBuilder;
use serde::de::DeserializeOwned;
use tracing::warn;

use super::barb_client::BarbClient;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{Advertiser, Buyer, Code, Named, Panel, Station, ViewingStation};

/// Keeps entries whose display name matches `filter`, case-insensitively.
pub fn filter_by_name<T: Named>(entries: Vec<T>, filter: Option<&str>) -> PipelineResult<Vec<T>> {
    let Some(pattern) = filter else {
        return Ok(entries);
    };
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| PipelineError::Config(format!("invalid {} filter: {}", T::KIND, e)))?;
    Ok(entries
        .into_iter()
        .filter(|entry| regex.is_match(entry.display_name()))
        .collect())
}

/// The single entry named `name` (case-insensitive), or NotFound.
pub fn find_unique<'a, T: Named>(entries: &'a [T], name: &str) -> PipelineResult<&'a T> {
    let wanted = name.to_lowercase();
    let matches: Vec<&T> = entries
        .iter()
        .filter(|entry| entry.display_name().to_lowercase() == wanted)
        .collect();
    match matches.as_slice() {
        [only] => Ok(*only),
        _ => Err(PipelineError::NotFound {
            kind: T::KIND,
            name: name.to_string(),
            matches: matches.len(),
        }),
    }
}

impl BarbClient {
    async fn list_reference<T: Named + DeserializeOwned>(
        &self,
        endpoint: &str,
        filter: Option<&str>,
    ) -> PipelineResult<Vec<T>> {
        let raw = self.fetch_bulk(endpoint, &Vec::new()).await?;
        if raw.is_empty() {
            return Err(PipelineError::transport(
                endpoint,
                None,
                format!("no {} entries returned", T::KIND),
            ));
        }

        let mut entries = Vec::with_capacity(raw.len());
        for item in raw {
            match serde_json::from_value::<T>(item) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("Skipping malformed {} entry: {}", T::KIND, e),
            }
        }
        filter_by_name(entries, filter)
    }

    pub async fn list_stations(&self, filter: Option<&str>) -> PipelineResult<Vec<Station>> {
        self.list_reference("stations", filter).await
    }

    pub async fn list_viewing_stations(
        &self,
        filter: Option<&str>,
    ) -> PipelineResult<Vec<ViewingStation>> {
        self.list_reference("viewing_stations", filter).await
    }

    pub async fn list_panels(&self, filter: Option<&str>) -> PipelineResult<Vec<Panel>> {
        self.list_reference("panels", filter).await
    }

    pub async fn list_buyers(&self, filter: Option<&str>) -> PipelineResult<Vec<Buyer>> {
        self.list_reference("buyers", filter).await
    }

    pub async fn list_advertisers(&self, filter: Option<&str>) -> PipelineResult<Vec<Advertiser>> {
        self.list_reference("advertisers", filter).await
    }

    pub async fn station_code(&self, name: &str) -> PipelineResult<Code> {
        let stations = self.list_stations(None).await?;
        Ok(find_unique(&stations, name)?.station_code.clone())
    }

    pub async fn panel_code(&self, region: &str) -> PipelineResult<Code> {
        let panels = self.list_panels(None).await?;
        Ok(find_unique(&panels, region)?.panel_code.clone())
    }

    pub async fn viewing_station_code(&self, name: &str) -> PipelineResult<Code> {
        let stations = self.list_viewing_stations(None).await?;
        Ok(find_unique(&stations, name)?.viewing_station_code.clone())
    }
}
