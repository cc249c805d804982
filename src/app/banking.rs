use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use super::{default_download_dir, parse_date, parse_optional_date};
use crate::auth::Authenticator;
use crate::output::{
    render_accounts, render_transactions, safe_output_path, to_json, to_pruned_json, OutputFormat,
    TransactionsFormat,
};
use crate::service::{DownloadReport, DownloadStatus, ElbaService};

pub struct TransactionsArgs {
    pub account: String,
    pub from: String,
    pub until: String,
    pub format: TransactionsFormat,
}

/// Transactions rendered once per requested format.
pub struct TransactionsExport {
    /// File stem used when several files are written and no output was given.
    pub stem: String,
    pub rendered: Vec<(OutputFormat, String)>,
}

pub struct DownloadArgs {
    pub from: Option<String>,
    pub until: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub json: bool,
}

pub async fn accounts<A: Authenticator>(
    service: &ElbaService<A>,
    format: OutputFormat,
) -> Result<String> {
    let report = service.accounts().await?;
    if let Some(raw_path) = &report.raw_path {
        tracing::debug!(path = %raw_path, "Raw products payload saved");
    }
    render_accounts(&report, format)
}

pub async fn transactions<A: Authenticator>(
    service: &ElbaService<A>,
    args: TransactionsArgs,
) -> Result<TransactionsExport> {
    let from = parse_date(&args.from)?;
    let until = parse_date(&args.until)?;
    let transactions = service.transactions(&args.account, from, until).await?;
    if transactions.is_empty() {
        tracing::info!("No transactions found in date range");
    }

    let rendered: Vec<(OutputFormat, String)> = args
        .format
        .formats()
        .iter()
        .map(|&format| Ok((format, render_transactions(&transactions, format)?)))
        .collect::<Result<_>>()?;
    Ok(TransactionsExport {
        stem: transactions_file_stem(&args.account, from, until),
        rendered,
    })
}

/// `transactions_<IBAN without country code>_<from>_<until>`.
pub fn transactions_file_stem(iban: &str, from: NaiveDate, until: NaiveDate) -> String {
    let compact: String = iban.chars().filter(|c| !c.is_whitespace()).collect();
    let account = compact.strip_prefix("AT").unwrap_or(&compact);
    format!("transactions_{account}_{from}_{until}")
}

/// Depot positions as JSON with empty fields removed.
pub async fn portfolio<A: Authenticator>(
    service: &ElbaService<A>,
    depot_id: &str,
    date: Option<&str>,
) -> Result<String> {
    let date = parse_optional_date(date)?;
    let positions = service.portfolio(depot_id, date).await?;
    to_pruned_json(positions)
}

/// Download mailbox documents. Prints the report as JSON when `json` is set,
/// otherwise a one-line summary.
pub async fn download<A: Authenticator>(
    service: &ElbaService<A>,
    args: DownloadArgs,
) -> Result<String> {
    let config = service.config();
    let from = match parse_optional_date(args.from.as_deref())? {
        Some(date) => date,
        None => service.clock().start_of_year(),
    };
    let until = match parse_optional_date(args.until.as_deref())? {
        Some(date) => date,
        None => service.clock().today(),
    };

    let requested = args
        .output_dir
        .unwrap_or_else(|| default_download_dir(config));
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let directory = safe_output_path(&requested, &config.workspace_dir, &cwd)?;

    let report = service.download_documents(from, until, &directory).await?;
    if args.json {
        to_json(&report)
    } else {
        Ok(summary(&report))
    }
}

fn summary(report: &DownloadReport) -> String {
    let mut out = format!(
        "Downloaded {}, skipped {}, failed {} -> {}\n",
        report.downloaded,
        report.skipped,
        report.failed,
        report.directory.display()
    );
    for doc in report
        .documents
        .iter()
        .filter(|d| d.status == DownloadStatus::Failed)
    {
        out.push_str(&format!(
            "  failed: {} ({})\n",
            doc.file,
            doc.error.as_deref().unwrap_or("unknown error")
        ));
    }
    out
}
