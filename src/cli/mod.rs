pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "buffrlend")]
#[command(about = "BuffrLend CLI - loan calculator, tokens and operator utilities")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Loan calculator")]
    Calc {
        #[command(subcommand)]
        cmd: commands::calc::CalcCommands,
    },

    #[command(about = "Document type a file name would be filed under")]
    Classify {
        #[arg(help = "File name, e.g. march_payslip.pdf")]
        file_name: String,
    },

    #[command(about = "Normalise a phone number to +264 form")]
    Phone {
        #[arg(help = "Phone number")]
        number: String,
    },

    #[command(about = "Issue an access token signed with JWT_SECRET")]
    Token {
        #[command(flatten)]
        args: commands::token::TokenArgs,
    },

    #[command(about = "Database maintenance")]
    Db {
        #[command(subcommand)]
        cmd: commands::db::DbCommands,
    },

    #[command(about = "Query a running API server")]
    Server {
        #[command(subcommand)]
        cmd: commands::server::ServerCommands,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Calc { cmd } => commands::calc::handle(cmd, output_format),
        Commands::Classify { file_name } => commands::tools::classify(&file_name, output_format),
        Commands::Phone { number } => commands::tools::phone(&number, output_format),
        Commands::Token { args } => commands::token::handle(args, output_format).await,
        Commands::Db { cmd } => commands::db::handle(cmd, output_format).await,
        Commands::Server { cmd } => commands::server::handle(cmd, output_format).await,
    }
}
