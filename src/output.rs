//! Rendering of reports as JSON, CSV or tables, and sandboxed output files.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;

use crate::error::ElbaError;
use crate::format::{eu_amount, eu_money, eu_percent, iban_short, prune_nulls, MISSING};
use crate::models::{AccountsReport, Transaction, TRANSACTION_CSV_COLUMNS};

/// Column order of the accounts CSV export.
pub const ACCOUNT_CSV_COLUMNS: [&str; 10] = [
    "id",
    "type",
    "name",
    "iban",
    "currency",
    "booked",
    "available",
    "value",
    "profitLoss",
    "profitLossPercent",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum OutputFormat {
    Json,
    Csv,
    Table,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Table => "txt",
        }
    }
}

/// Formats of the `transactions` command. `Both` exports CSV and JSON files
/// from the same fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum TransactionsFormat {
    Json,
    Csv,
    Table,
    Both,
}

impl TransactionsFormat {
    pub fn formats(self) -> &'static [OutputFormat] {
        match self {
            TransactionsFormat::Json => &[OutputFormat::Json],
            TransactionsFormat::Csv => &[OutputFormat::Csv],
            TransactionsFormat::Table => &[OutputFormat::Table],
            TransactionsFormat::Both => &[OutputFormat::Csv, OutputFormat::Json],
        }
    }
}

/// Pretty JSON with a trailing newline.
pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    let mut out = serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;
    out.push('\n');
    Ok(out)
}

/// Pretty JSON with `null`s and empty containers removed.
pub fn to_pruned_json(value: Value) -> Result<String> {
    to_json(&prune_nulls(value).unwrap_or_else(|| Value::Object(Default::default())))
}

fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn amount_cell(text: String) -> Cell {
    Cell::new(text).set_alignment(CellAlignment::Right)
}

fn opt_number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

pub fn render_accounts(report: &AccountsReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => to_json(report),
        OutputFormat::Csv => accounts_csv(report),
        OutputFormat::Table => Ok(accounts_table(report)),
    }
}

fn accounts_csv(report: &AccountsReport) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(ACCOUNT_CSV_COLUMNS)?;

    for account in &report.accounts {
        let balances = account.balances.as_ref();
        let securities = account.securities.as_ref();
        let profit_loss = securities.and_then(|s| s.profit_loss.as_ref());

        writer.write_record([
            account.id.clone(),
            account.account_type.to_string(),
            account.name.clone(),
            account.iban.clone().unwrap_or_default(),
            account.currency.clone(),
            opt_number(balances.and_then(|b| b.booked.as_ref()).map(|m| m.amount)),
            opt_number(balances.and_then(|b| b.available.as_ref()).map(|m| m.amount)),
            opt_number(securities.and_then(|s| s.value.as_ref()).map(|m| m.amount)),
            opt_number(profit_loss.and_then(|p| p.amount)),
            opt_number(profit_loss.and_then(|p| p.percent)),
        ])?;
    }

    finish_csv(writer)
}

fn accounts_table(report: &AccountsReport) -> String {
    let mut table = create_table();
    table.set_header(vec!["Name", "IBAN", "Type", "Balance", "Available / P&L"]);

    for account in &report.accounts {
        let headline = account
            .headline_amount()
            .map(|m| eu_money(Some(m.amount), &m.currency))
            .unwrap_or_else(|| MISSING.to_string());

        let secondary = match account.securities.as_ref().and_then(|s| s.profit_loss.as_ref()) {
            Some(pl) => {
                let mut text = eu_money(pl.amount, &pl.currency);
                if let Some(percent) = pl.percent {
                    text.push_str(&format!(" ({})", eu_percent(percent)));
                }
                text
            }
            None => account
                .available_amount()
                .map(|m| eu_money(Some(m.amount), &m.currency))
                .unwrap_or_default(),
        };

        table.add_row(vec![
            Cell::new(&account.name),
            Cell::new(iban_short(account.iban.as_deref())),
            Cell::new(account.account_type),
            amount_cell(headline),
            amount_cell(secondary),
        ]);
    }

    let mut out = table.to_string();
    out.push('\n');
    out
}

pub fn render_transactions(transactions: &[Transaction], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => transactions_json(transactions),
        OutputFormat::Csv => transactions_csv(transactions),
        OutputFormat::Table => Ok(transactions_table(transactions)),
    }
}

fn transactions_json(transactions: &[Transaction]) -> Result<String> {
    let pruned = transactions
        .iter()
        .filter_map(|tx| prune_nulls(tx.raw().clone()))
        .collect::<Vec<_>>();
    to_json(&pruned)
}

fn transactions_csv(transactions: &[Transaction]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(TRANSACTION_CSV_COLUMNS)?;
    for tx in transactions {
        writer.write_record(tx.csv_record())?;
    }
    finish_csv(writer)
}

fn transactions_table(transactions: &[Transaction]) -> String {
    let mut table = create_table();
    table.set_header(vec!["Date", "Amount", "Currency", "Counterparty", "Purpose"]);

    for tx in transactions {
        let amount = tx.amount();
        table.add_row(vec![
            Cell::new(tx.booking_date()),
            amount_cell(
                amount
                    .and_then(|a| a.value())
                    .map(eu_amount)
                    .unwrap_or_else(|| MISSING.to_string()),
            ),
            Cell::new(amount.and_then(|a| a.currency()).unwrap_or_default()),
            Cell::new(tx.description()),
            Cell::new(tx.purpose()),
        ]);
    }

    let mut out = table.to_string();
    out.push('\n');
    out
}

fn finish_csv(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV: {e}"))?;
    String::from_utf8(bytes).context("CSV output is not UTF-8")
}

/// Resolve `.` and `..` without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Check that `path` stays inside `workspace` or the system temp directory.
///
/// Relative paths are taken relative to `cwd`. Returns the normalized path.
pub fn safe_output_path(path: &Path, workspace: &Path, cwd: &Path) -> Result<PathBuf, ElbaError> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };
    let normalized = normalize_lexically(&absolute);

    let allowed = [
        normalize_lexically(workspace),
        normalize_lexically(&std::env::temp_dir()),
    ];
    if allowed.iter().any(|root| normalized.starts_with(root)) {
        Ok(normalized)
    } else {
        Err(ElbaError::UnsafeOutputPath(normalized))
    }
}

/// Write `content` to `output` (sandboxed) or to stdout when no file is given.
///
/// Returns the path written, if any.
pub fn write_output(
    content: &str,
    output: Option<&Path>,
    workspace: &Path,
) -> Result<Option<PathBuf>> {
    let Some(output) = output else {
        print!("{content}");
        return Ok(None);
    };
    write_file_output(content, output, workspace).map(Some)
}

/// Write each rendering next to `base`, named by its format's extension
/// (`base.csv`, `base.json`). Returns the paths written.
pub fn write_outputs(
    rendered: &[(OutputFormat, String)],
    base: &Path,
    workspace: &Path,
) -> Result<Vec<PathBuf>> {
    rendered
        .iter()
        .map(|(format, content)| {
            write_file_output(content, &base.with_extension(format.extension()), workspace)
        })
        .collect()
}

fn write_file_output(content: &str, output: &Path, workspace: &Path) -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let path = safe_output_path(output, workspace, &cwd)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
