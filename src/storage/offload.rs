use serde_json::Value;
use tracing::{info, warn};

use super::BlobStore;
use crate::error::PipelineResult;
use crate::fetcher::BarbClient;
use crate::models::events::BulkFileResult;
use crate::models::ReportType;

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "unknown".to_string(),
        other => other.to_string(),
    }
}

/// File name for the `index`-th link of a result item: the link's last path segment
/// when it names a parquet file, `part_{index}.parquet` otherwise.
pub fn blob_file_name(link: &str, index: usize) -> String {
    url::Url::parse(link)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back().map(|s| s.to_string()))
        })
        .filter(|name| name.ends_with(".parquet"))
        .unwrap_or_else(|| format!("part_{}.parquet", index))
}

/// Partitioned object key of an offloaded file.
pub fn blob_key(report_type: ReportType, session_date: &str, panel_code: &str, file_name: &str) -> String {
    format!(
        "{}/date={}/panel_code={}/{}",
        report_type.blob_prefix(),
        session_date,
        panel_code,
        file_name
    )
}

/// Downloads every file link of the bulk result items and uploads it to the blob store.
pub async fn offload_bulk_results(
    client: &BarbClient,
    store: &dyn BlobStore,
    report_type: ReportType,
    items: Vec<Value>,
) -> PipelineResult<Vec<String>> {
    let mut keys = Vec::new();

    for item in items {
        let result: BulkFileResult = match serde_json::from_value(item) {
            Ok(result) => result,
            Err(e) => {
                warn!("Skipping malformed {} result item: {}", report_type, e);
                continue;
            }
        };
        let session_date = as_text(&result.session_date);
        let panel_code = as_text(&result.panel_code);

        for (index, link) in result.results.iter().enumerate() {
            let bytes = client.download(link).await?;
            let key = blob_key(
                report_type,
                &session_date,
                &panel_code,
                &blob_file_name(link, index),
            );
            store.put(&key, &bytes).await?;
            keys.push(key);
        }
    }

    info!("Offloaded {} {} files", keys.len(), report_type);
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_key_layout() {
        assert_eq!(
            blob_key(ReportType::Viewing, "2023-12-12", "50", "part_0.parquet"),
            "viewing/date=2023-12-12/panel_code=50/part_0.parquet"
        );
    }

    #[test]
    fn test_file_name_from_link() {
        assert_eq!(
            blob_file_name("https://files.example/bulk/abc123.parquet?sig=x", 4),
            "abc123.parquet"
        );
        assert_eq!(blob_file_name("https://files.example/download?id=9", 2), "part_2.parquet");
        assert_eq!(blob_file_name("not a url", 0), "part_0.parquet");
    }
}
