use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use elba::app::{self, DownloadArgs, TransactionsArgs};
use elba::config::{default_config_path, ResolvedConfig};
use elba::error::exit_code;
use elba::output::{write_output, write_outputs, OutputFormat, TransactionsFormat};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "elba")]
#[command(about = "Raiffeisen ELBA online banking from the command line")]
struct Cli {
    /// Path to config file (default: <config dir>/elba/elba.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Show the browser window during login
    #[arg(long, global = true)]
    visible: bool,

    /// Log output format on stderr
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Store ELBA ID and PIN in the credentials file
    Setup,

    /// Log in with pushTAN and cache the session
    Login,

    /// Remove the cached session and browser profile
    Logout,

    /// Show the cached session without contacting the bank
    Status,

    /// List accounts and balances
    Accounts {
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Fetch transactions of one account
    Transactions {
        /// IBAN of the account
        #[arg(long, visible_alias = "iban")]
        account: String,

        /// First booking date (YYYY-MM-DD)
        #[arg(long)]
        from: String,

        /// Last booking date (YYYY-MM-DD)
        #[arg(long)]
        until: String,

        /// `both` writes <output>.csv and <output>.json
        #[arg(long, value_enum, default_value_t = TransactionsFormat::Json)]
        format: TransactionsFormat,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show depot positions
    Portfolio {
        /// Depot number
        #[arg(long)]
        depot_id: String,

        /// Positions as of this date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Download mailbox documents as PDF
    Download {
        /// First creation date (default: 1 January of this year)
        #[arg(long)]
        from: Option<String>,

        /// Last creation date (default: today)
        #[arg(long)]
        until: Option<String>,

        /// Target directory (default: <workspace>/elba-documents)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Print the download report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,chromiumoxide=warn,chromiumoxide::conn=off,chromiumoxide::handler=off")
    });

    let (text, json) = match format {
        LogFormat::Text => (
            Some(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            ),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true)
                    .json(),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let mut config = ResolvedConfig::load(&config_path)
        .with_context(|| format!("Failed to load elba config: {}", config_path.display()))?;
    if cli.visible {
        config.browser.headless = false;
    }

    let workspace = config.workspace_dir.clone();
    let service = app::build_service(config);

    match cli.command {
        Command::Setup => print!("{}", app::setup(service.config()).await?),
        Command::Login => print!("{}", app::login(&service).await?),
        Command::Logout => print!("{}", app::logout(&service).await?),
        Command::Status => print!("{}", app::status(&service).await?),
        Command::Accounts { format, output } => {
            let content = app::accounts(&service, format).await?;
            report_written(write_output(&content, output.as_deref(), &workspace)?);
        }
        Command::Transactions {
            account,
            from,
            until,
            format,
            output,
        } => {
            let export = app::transactions(
                &service,
                TransactionsArgs {
                    account,
                    from,
                    until,
                    format,
                },
            )
            .await?;
            match export.rendered.as_slice() {
                [(_, content)] => {
                    report_written(write_output(content, output.as_deref(), &workspace)?)
                }
                rendered => {
                    let base = output.unwrap_or_else(|| workspace.join(&export.stem));
                    for path in write_outputs(rendered, &base, &workspace)? {
                        report_written(Some(path));
                    }
                }
            }
        }
        Command::Portfolio {
            depot_id,
            date,
            output,
        } => {
            let content = app::portfolio(&service, &depot_id, date.as_deref()).await?;
            report_written(write_output(&content, output.as_deref(), &workspace)?);
        }
        Command::Download {
            from,
            until,
            output_dir,
            json,
        } => {
            let content = app::download(
                &service,
                DownloadArgs {
                    from,
                    until,
                    output_dir,
                    json,
                },
            )
            .await?;
            print!("{content}");
        }
    }

    Ok(())
}

fn report_written(path: Option<PathBuf>) {
    if let Some(path) = path {
        eprintln!("Wrote {}", path.display());
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}
