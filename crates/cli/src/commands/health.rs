//! Service health command

use anyhow::Result;
use colored::Colorize;
use serde_json::json;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_status, format_timestamp, print_json, print_table, print_warning, OutputFormat,
};

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Last Check")]
    last_check: String,
}

pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;
    let readiness = client.readiness().await?;

    match format {
        OutputFormat::Json => {
            print_json(&json!({ "health": health, "readiness": readiness }))?;
        }
        OutputFormat::Table => {
            println!("{}", "Rent Pricing Service".bold());
            println!("{}", "=".repeat(40));
            println!("Status: {}", color_status(&health.status));
            let ready = if readiness.ready { "ready" } else { "not ready" };
            println!("Ready:  {}", color_status(ready));
            if let Some(reason) = &readiness.reason {
                print_warning(reason);
            }
            println!();

            let rows: Vec<ComponentRow> = health
                .components
                .iter()
                .map(|(name, component)| ComponentRow {
                    name: name.clone(),
                    status: color_status(&component.status),
                    message: component.message.clone().unwrap_or_default(),
                    last_check: format_timestamp(component.last_check_timestamp),
                })
                .collect();
            print_table(&rows);
        }
    }

    Ok(())
}
