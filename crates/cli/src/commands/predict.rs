//! Price prediction command

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use tabled::Tabled;

use crate::client::{ApiClient, PredictOutcome, ValidationFailure};
use crate::output::{format_currency, print_json, print_success, print_table, OutputFormat};

/// Property to price, from a JSON file or individual flags
///
/// Values are sent as given; the service reports every missing or invalid
/// field at once.
#[derive(Debug, Default, Args)]
pub struct PredictArgs {
    /// JSON file containing the property record
    #[arg(long, short, conflicts_with_all = FIELD_FLAGS)]
    pub file: Option<PathBuf>,

    #[arg(long)]
    pub host_id: Option<i64>,
    #[arg(long)]
    pub host_name: Option<String>,
    #[arg(long)]
    pub borough: Option<String>,
    #[arg(long)]
    pub district: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    pub latitude: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    pub longitude: Option<f64>,
    #[arg(long)]
    pub room_type: Option<String>,
    #[arg(long)]
    pub min_nights: Option<i64>,
    /// Total number of reviews
    #[arg(long)]
    pub reviews: Option<i64>,
    /// Date of the last review (YYYY-MM-DD)
    #[arg(long)]
    pub last_review: Option<String>,
    #[arg(long)]
    pub monthly_reviews: Option<f64>,
    /// Number of listings the host has
    #[arg(long)]
    pub host_listings: Option<i64>,
    /// Days available per year
    #[arg(long)]
    pub availability: Option<i64>,
    /// Model to score with (LightGBM or XGBoost)
    #[arg(long, short)]
    pub algorithm: Option<String>,
}

const FIELD_FLAGS: &[&str] = &[
    "host_id",
    "host_name",
    "borough",
    "district",
    "latitude",
    "longitude",
    "room_type",
    "min_nights",
    "reviews",
    "last_review",
    "monthly_reviews",
    "host_listings",
    "availability",
];

#[derive(Tabled)]
struct FieldErrorRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Problem")]
    problem: String,
    #[tabled(rename = "Hint")]
    hint: String,
}

impl PredictArgs {
    /// Build the request record; `default_algorithm` fills a missing algorithm
    pub fn to_record(&self, default_algorithm: &str) -> Result<Map<String, Value>> {
        let mut record = match &self.file {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                match serde_json::from_str(&content)
                    .with_context(|| format!("{} is not valid JSON", path.display()))?
                {
                    Value::Object(record) => record,
                    _ => anyhow::bail!("{} must contain a JSON object", path.display()),
                }
            }
            None => self.flags_record(),
        };

        record
            .entry("algorithm")
            .or_insert_with(|| json!(self.algorithm.as_deref().unwrap_or(default_algorithm)));
        Ok(record)
    }

    fn flags_record(&self) -> Map<String, Value> {
        let mut record = Map::new();
        let mut put = |key: &str, value: Option<Value>| {
            if let Some(value) = value {
                record.insert(key.to_string(), value);
            }
        };
        put("host_id", self.host_id.map(Value::from));
        put("host_name", self.host_name.clone().map(Value::from));
        put("borough", self.borough.clone().map(Value::from));
        put("district", self.district.clone().map(Value::from));
        put("latitude", self.latitude.map(Value::from));
        put("longitude", self.longitude.map(Value::from));
        put("room_type", self.room_type.clone().map(Value::from));
        put("min_nights", self.min_nights.map(Value::from));
        put("reviews", self.reviews.map(Value::from));
        put("last_review", self.last_review.clone().map(Value::from));
        put("monthly_reviews", self.monthly_reviews.map(Value::from));
        put("host_listings", self.host_listings.map(Value::from));
        put("availability", self.availability.map(Value::from));
        record
    }
}

pub async fn predict(
    client: &ApiClient,
    args: &PredictArgs,
    default_algorithm: &str,
    format: OutputFormat,
) -> Result<()> {
    let record = args.to_record(default_algorithm)?;

    match client.predict(&record).await? {
        PredictOutcome::Priced(prediction) => match format {
            OutputFormat::Json => print_json(&prediction)?,
            OutputFormat::Table => {
                print_success(&format!(
                    "Predicted price: {}",
                    format_currency(prediction.price, &prediction.currency).bold()
                ));
                println!(
                    "  Model: {} ({})",
                    prediction.algorithm.cyan(),
                    prediction.model_version
                );
            }
        },
        PredictOutcome::Rejected(failure) => {
            match format {
                OutputFormat::Json => print_json(&failure)?,
                OutputFormat::Table => {
                    println!("{}", "Property record rejected".red().bold());
                    print_table(&error_rows(&failure));
                }
            }
            anyhow::bail!("{} field(s) failed validation", failure.fields.len());
        }
    }

    Ok(())
}

fn error_rows(failure: &ValidationFailure) -> Vec<FieldErrorRow> {
    failure
        .fields
        .iter()
        .map(|(field, messages)| FieldErrorRow {
            field: field.clone(),
            problem: messages.join(", "),
            hint: failure.hints.get(field).cloned().unwrap_or_default(),
        })
        .collect()
}
