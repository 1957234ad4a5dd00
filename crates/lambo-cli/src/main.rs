use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use lambo_entry::{EntryKind, EntryPoint};
use lambo_runtime::{Broker, LaunchOptions, Supervisor, parse_duration};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt};

mod config;

use config::{DEFAULT_MAX_DURATION, LamboConfig};

#[derive(Parser)]
#[command(
    name = "lambo",
    version,
    about = "lambo: run a serverless function locally behind an emulated runtime API"
)]
struct Cli {
    /// Path to the function executable
    function: PathBuf,

    /// Arguments passed to the function
    #[arg(last = true)]
    args: Vec<String>,

    /// Address the front end listens on for requests to route to the function
    #[arg(short, long)]
    listen_addr: Option<String>,

    /// Environment variable to expose to the function (KEY=VALUE, repeatable)
    #[arg(short = 'e', long = "env-var", value_parser = parse_env_var)]
    env_vars: Vec<(String, String)>,

    /// Maximum duration of a single invocation, advertised to the function
    #[arg(short, long, value_parser = parse_duration)]
    timeout: Option<Duration>,

    /// Give up on an invocation after this long (default: wait forever)
    #[arg(long, value_parser = parse_duration)]
    invoke_timeout: Option<Duration>,

    /// Front end to run: gateway or proxy
    #[arg(short, long)]
    kind: Option<String>,

    /// Working directory for the function (default: its own directory)
    #[arg(short, long)]
    working_dir: Option<PathBuf>,

    /// Path to a lambo.toml config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn parse_env_var(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

fn init_logging(debug: bool, format: LogFormat) {
    // Logs go to stderr so the function's own stdout passes through untouched
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_env("LAMBO_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug, cli.log_format);

    let config_path = LamboConfig::locate(cli.config.as_deref());
    let mut config = match &config_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading config");
            LamboConfig::from_file(path)?
        }
        None => {
            let mut config = LamboConfig::default();
            config.runtime.max_duration = DEFAULT_MAX_DURATION;
            config
        }
    };

    if let Some(timeout) = cli.timeout {
        config.runtime.max_duration = timeout;
    }
    if cli.invoke_timeout.is_some() {
        config.runtime.invoke_timeout = cli.invoke_timeout;
    }
    let kind: EntryKind = cli
        .kind
        .as_deref()
        .unwrap_or(config.entry.kind.as_str())
        .parse()?;
    let listen_addr = cli
        .listen_addr
        .clone()
        .unwrap_or_else(|| config.entry.listen_addr.clone());

    let mut options = LaunchOptions::new(&cli.function).with_args(config.function.args.clone());
    options.args.extend(cli.args.iter().cloned());
    if let Some(dir) = cli.working_dir.clone().or(config.function.working_dir.clone()) {
        options = options.with_working_dir(dir);
    }
    // Command-line variables come last so they override the config file
    for (key, value) in &config.function.env {
        options = options.with_env(key.as_str(), value.as_str());
    }
    for (key, value) in &cli.env_vars {
        options = options.with_env(key.as_str(), value.as_str());
    }

    tracing::info!(
        function = %cli.function.display(),
        %kind,
        max_duration = ?config.runtime.max_duration,
        "Starting lambo"
    );

    let broker = Arc::new(Broker::new(&config.runtime));
    let mut supervisor = Supervisor::launch(options, broker.clone(), &config.runtime)
        .await
        .context("failed to launch function")?;

    let shutdown = CancellationToken::new();
    let entry = EntryPoint::new(kind, broker);
    let mut server = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { entry.listen_and_serve(&listen_addr, shutdown).await })
    };

    let early_exit = tokio::select! {
        result = &mut server => Some(result),
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            tracing::info!("Shutting down");
            None
        }
    };

    shutdown.cancel();
    supervisor.close().await.context("failed to stop runtime API")?;

    let result = match early_exit {
        Some(result) => result,
        None => server.await,
    };
    result.context("front end task panicked")??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_var_splits_on_first_equals() {
        assert_eq!(
            parse_env_var("DSN=postgres://u:p@h/db?x=1").unwrap(),
            ("DSN".to_string(), "postgres://u:p@h/db?x=1".to_string())
        );
        assert_eq!(parse_env_var("EMPTY=").unwrap(), ("EMPTY".into(), "".into()));
    }

    #[test]
    fn env_var_requires_key_and_equals() {
        assert!(parse_env_var("NOVALUE").is_err());
        assert!(parse_env_var("=value").is_err());
    }

    #[test]
    fn cli_parses_function_args_after_separator() {
        let cli = Cli::try_parse_from([
            "lambo", "-e", "A=1", "-t", "5s", "-k", "proxy", "./fn", "--", "--flag",
        ])
        .unwrap();
        assert_eq!(cli.function, PathBuf::from("./fn"));
        assert_eq!(cli.args, vec!["--flag"]);
        assert_eq!(cli.env_vars, vec![("A".to_string(), "1".to_string())]);
        assert_eq!(cli.timeout, Some(Duration::from_secs(5)));
        assert_eq!(cli.kind.as_deref(), Some("proxy"));
    }
}
