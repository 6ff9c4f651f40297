#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use futures::StreamExt;
use std::io::Write;
use tracing::debug;
use tracing_subscriber::{
    prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use ::docchat::{Config, Pipeline};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Answers a question, streaming the answer to stdout.
    Ask { question: String },
    /// Prints the passages retrieved for a question.
    Query { question: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "cli=info,docchat=warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env()?;
    let pipeline = Pipeline::from_config(&config).await?;

    match cli.command {
        Commands::Query { question } => {
            let context = pipeline.retrieve(&question).await?;

            println!("{}", serde_json::to_string_pretty(&context)?);
        }
        Commands::Ask { question } => {
            let mut answer = pipeline.ask(question).await?;
            debug!("Answering with {} passages", answer.context.len());

            let mut stdout = std::io::stdout().lock();
            while let Some(fragment) = answer.fragments.next().await {
                stdout.write_all(fragment?.as_bytes())?;
                stdout.flush()?;
            }
            writeln!(stdout)?;
        }
    }

    Ok(())
}
