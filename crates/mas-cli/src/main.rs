mod cli;

use std::io::Write as _;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser as _;
use mas_stream::prelude::*;
use tracing::debug;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    mas_stream::init_observability();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Streams one run; returns whether it completed.
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut config = StreamConfig::from_env()?;
    if let Some(url) = cli.url {
        config = config.base_url(url);
    }
    if let Some(secs) = cli.idle_timeout {
        config = config.idle_timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = cli.overall_timeout {
        config = config.overall_timeout(Duration::from_secs(secs));
    }

    let sessions = Arc::new(SessionStore::new());
    if let Some(token) = cli.token {
        sessions.set(mas_stream::AuthSession::new(token));
    }

    let history = match &cli.history {
        Some(path) => load_history(path)?,
        None => Vec::new(),
    };

    let coordinator = Coordinator::builder()
        .config(config)
        .sessions(sessions)
        .build()?;

    let cancel = CancelToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("ctrl-c received; cancelling run");
            ctrl_c.cancel();
        }
    });

    let conversation = Conversation::new(history, Turn::user(cli.message));
    let mut run = coordinator.run(conversation, cancel).await?;
    let mut printer = SnapshotPrinter::default();
    while let Some(snapshot) = run.next_snapshot().await {
        printer.show(&snapshot?)?;
    }
    printer.end_line()?;

    let report = run.finish().await?;
    debug!(
        run_id = %report.run_id,
        server_run_id = report.server_run_id.as_deref().unwrap_or("-"),
        snapshots = report.snapshots,
        "run report"
    );
    Ok(match report.outcome {
        RunOutcome::Completed { .. } => true,
        RunOutcome::Aborted => {
            eprintln!("cancelled");
            false
        }
        RunOutcome::Failed { reason, .. } => {
            debug!(%reason, "run failed");
            false
        }
    })
}

fn load_history(path: &Path) -> anyhow::Result<Vec<Turn>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read history file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("history file {} is not a list of turns", path.display()))
}

/// Renders cumulative snapshots on a terminal.
///
/// Answer text is appended to stdout as it grows; the activity banner goes to
/// stderr so piping stdout captures only the answer.
#[derive(Default)]
struct SnapshotPrinter {
    printed: String,
    last_status: String,
}

impl SnapshotPrinter {
    fn show(&mut self, snapshot: &TextSnapshot) -> std::io::Result<()> {
        if snapshot.activity {
            let status = snapshot
                .text
                .lines()
                .skip(1)
                .find(|line| !line.trim().is_empty())
                .unwrap_or_default()
                .to_string();
            if status != self.last_status {
                eprintln!("… {status}");
                self.last_status = status;
            }
            return Ok(());
        }

        let mut stdout = std::io::stdout().lock();
        match snapshot.text.strip_prefix(self.printed.as_str()) {
            Some(suffix) => stdout.write_all(suffix.as_bytes())?,
            None => {
                // Replaced rather than extended.
                stdout.write_all(b"\n")?;
                stdout.write_all(snapshot.text.as_bytes())?;
            }
        }
        stdout.flush()?;
        self.printed.clone_from(&snapshot.text);
        Ok(())
    }

    fn end_line(&self) -> std::io::Result<()> {
        if !self.printed.is_empty() && !self.printed.ends_with('\n') {
            println!();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_flags_and_message() {
        let cli = Cli::try_parse_from([
            "mas-cli",
            "--url",
            "http://backend:8010",
            "--token",
            "abc",
            "--idle-timeout",
            "10",
            "What is the capital of France?",
        ])
        .expect("parse");
        assert_eq!(cli.url.as_deref(), Some("http://backend:8010"));
        assert_eq!(cli.token.as_deref(), Some("abc"));
        assert_eq!(cli.idle_timeout, Some(10));
        assert_eq!(cli.overall_timeout, None);
        assert_eq!(cli.message, "What is the capital of France?");
    }

    #[test]
    fn cli_requires_a_message() {
        assert!(Cli::try_parse_from(["mas-cli", "--url", "http://x"]).is_err());
    }

    #[test]
    fn history_file_is_a_list_of_turns() {
        let path = std::env::temp_dir().join(format!("mas-cli-history-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"[{"role":"user","content":"hi"},{"role":"assistant","content":"hello"}]"#,
        )
        .expect("write");
        let turns = load_history(&path).expect("history");
        std::fs::remove_file(&path).ok();
        assert_eq!(turns, vec![Turn::user("hi"), Turn::assistant("hello")]);
    }

    #[test]
    fn malformed_history_is_reported() {
        let path = std::env::temp_dir().join(format!("mas-cli-bad-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"role":"user"}"#).expect("write");
        let err = load_history(&path).expect_err("invalid");
        std::fs::remove_file(&path).ok();
        assert!(err.to_string().contains("not a list of turns"));
    }
}
