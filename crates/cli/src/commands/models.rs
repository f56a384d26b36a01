//! Model listing command

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, ModelInfo};
use crate::output::{color_status, print_info, print_json, print_table, OutputFormat};

/// Row for models table
#[derive(Tabled)]
struct ModelRow {
    #[tabled(rename = "Algorithm")]
    algorithm: String,
    #[tabled(rename = "Artifact")]
    stem: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Format")]
    format: String,
    #[tabled(rename = "Features")]
    features: String,
}

impl From<&ModelInfo> for ModelRow {
    fn from(m: &ModelInfo) -> Self {
        let dash = || "-".to_string();
        Self {
            algorithm: m.algorithm.clone(),
            stem: format!("{}_model.json", m.stem),
            status: color_status(if m.loaded { "loaded" } else { "not loaded" }),
            version: m.version.clone().unwrap_or_else(dash),
            format: m.format.clone().unwrap_or_else(dash),
            features: m.features.map(|n| n.to_string()).unwrap_or_else(dash),
        }
    }
}

pub async fn list_models(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let models = client.models().await?;

    match format {
        OutputFormat::Json => print_json(&models)?,
        OutputFormat::Table => {
            let rows: Vec<ModelRow> = models.iter().map(ModelRow::from).collect();
            print_table(&rows);
            if models.iter().any(|m| !m.loaded) {
                print_info("Models that are not loaded yet load on their first prediction");
            }
        }
    }

    Ok(())
}
