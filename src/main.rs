//! saas-adapters - tool surface over error monitoring and test management APIs

use std::process::ExitCode;

use async_trait::async_trait;
use clap::Parser;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::error;

use saas_adapters::{
    app::Adapters,
    cli::{Cli, Command},
    config::Config,
    endpoint, setup_tracing,
    tools::{DeclineAll, ElicitPrompt, Elicitation, Elicitor, error_payload},
};

/// Asks on stderr, reads the answer from stdin. An empty answer declines.
struct StdinElicitor;

#[async_trait]
impl Elicitor for StdinElicitor {
    async fn elicit(&self, prompt: ElicitPrompt) -> saas_adapters::Result<Elicitation> {
        let mut stderr = tokio::io::stderr();
        let options = if prompt.options.is_empty() {
            String::new()
        } else {
            format!(" [{}]", prompt.options.join("/"))
        };
        stderr
            .write_all(format!("{}{options} (empty to skip): ", prompt.message).as_bytes())
            .await?;
        stderr.flush().await?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        let answer = line.trim();

        Ok(if answer.is_empty() {
            Elicitation::Declined
        } else {
            Elicitation::Accepted(Value::String(answer.to_string()))
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    if let Command::Resolve {
        subdomain,
        key,
        endpoint,
    } = &cli.command
    {
        return match endpoint::resolve(subdomain, key.as_deref(), endpoint.as_deref()) {
            Ok(url) => {
                println!("{url}");
                ExitCode::SUCCESS
            }
            Err(e) => fail(&e),
        };
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let adapters = match Adapters::from_config(&config) {
        Ok(a) => a,
        Err(e) => {
            error!("Failed to build adapters: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Command::Tools => print_json(&adapters.registry().list()),
        Command::Context => match adapters.context_report().await {
            Ok(report) => print_json(&report),
            Err(e) => fail(&e),
        },
        Command::Call {
            name,
            args,
            no_prompt,
        } => {
            let args: Value = match serde_json::from_str(&args) {
                Ok(v) => v,
                Err(e) => {
                    error!("Arguments are not valid JSON: {e}");
                    return ExitCode::FAILURE;
                }
            };

            adapters.initialize().await;

            let result = if no_prompt {
                adapters.registry().call(&name, args, &DeclineAll).await
            } else {
                adapters.registry().call(&name, args, &StdinElicitor).await
            };
            match result {
                Ok(value) => print_json(&value),
                Err(e) => fail(&e),
            }
        }
        Command::Resolve { .. } => ExitCode::SUCCESS,
    }
}

fn print_json<T: Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to serialize output: {e}");
            ExitCode::FAILURE
        }
    }
}

fn fail(e: &saas_adapters::Error) -> ExitCode {
    println!("{:#}", error_payload(e));
    ExitCode::FAILURE
}
