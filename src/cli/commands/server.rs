use clap::Subcommand;
use serde_json::Value;

use crate::cli::utils::output_table;
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum ServerCommands {
    #[command(about = "Check server health from the /health endpoint")]
    Health {
        #[arg(long, default_value = "http://localhost:3000", help = "Server base URL")]
        url: String,
    },

    #[command(about = "Show server information from the API root endpoint")]
    Info {
        #[arg(long, default_value = "http://localhost:3000", help = "Server base URL")]
        url: String,
    },
}

async fn fetch(url: &str) -> anyhow::Result<(reqwest::StatusCode, Value)> {
    let response = reqwest::get(url).await?;
    let status = response.status();
    let body = response.json::<Value>().await?;
    Ok((status, body))
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub async fn handle(cmd: ServerCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        ServerCommands::Health { url } => {
            let (status, body) = fetch(&format!("{}/health", url.trim_end_matches('/'))).await?;
            output_table(
                &output_format,
                &[
                    ("HTTP", status.as_u16().to_string()),
                    ("Status", text(&body["status"])),
                    ("Database", text(&body["database"])),
                    ("Store", text(&body["store"])),
                ],
                &body,
            )?;
            if !status.is_success() {
                anyhow::bail!("server at {} is degraded", url);
            }
            Ok(())
        }
        ServerCommands::Info { url } => {
            let (_, body) = fetch(url.trim_end_matches('/')).await?;
            let data = &body["data"];
            output_table(
                &output_format,
                &[
                    ("Name", text(&data["name"])),
                    ("Version", text(&data["version"])),
                    ("Environment", text(&data["environment"])),
                    ("Google Drive", text(&data["integrations"]["google_drive"])),
                    ("WhatsApp", text(&data["integrations"]["whatsapp"])),
                ],
                &body,
            )
        }
    }
}
