use std::path::PathBuf;

use clap::Parser;

/// Ask the agent backend a question and stream the answer to stdout.
#[derive(Parser, Debug, Clone)]
#[command(version)]
pub struct Cli {
    /// Backend base URL. Defaults to `MAS_BACKEND_URL`, then `http://localhost:8010`.
    #[arg(long)]
    pub url: Option<String>,

    /// Bearer token for the backend.
    #[arg(long, env = "MAS_ACCESS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// JSON file with prior turns: `[{"role": "user", "content": "..."}, ...]`.
    #[arg(long, value_name = "FILE")]
    pub history: Option<PathBuf>,

    /// Seconds without frames before giving up while waiting for the answer.
    #[arg(long = "idle-timeout", value_name = "SECS")]
    pub idle_timeout: Option<u64>,

    /// Hard limit on the whole run, in seconds.
    #[arg(long = "overall-timeout", value_name = "SECS")]
    pub overall_timeout: Option<u64>,

    /// The question to ask.
    pub message: String,
}
