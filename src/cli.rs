//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Adapters for error monitoring and test management REST APIs
#[derive(Parser, Debug)]
#[command(name = "saas-adapters")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "SAAS_ADAPTERS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "SAAS_ADAPTERS_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "SAAS_ADAPTERS_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the tools of the configured backends
    Tools,

    /// Call a tool
    Call {
        /// Tool name, e.g. `bugsnag_list_project_errors`
        #[arg(required = true)]
        name: String,

        /// JSON arguments
        #[arg(short, long, default_value = "{}")]
        args: String,

        /// Never prompt for missing input
        #[arg(long)]
        no_prompt: bool,
    },

    /// Show the resolved organization and project context
    Context,

    /// Print the API base URL an endpoint configuration resolves to
    Resolve {
        /// Subdomain (api, app, ...)
        #[arg(long, default_value = "api")]
        subdomain: String,

        /// Project API key (hub keys select the hub domain)
        #[arg(long)]
        key: Option<String>,

        /// Endpoint override
        #[arg(long)]
        endpoint: Option<String>,
    },
}
