use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// One item pulled off a client stream by `serve`.
#[derive(Debug, Serialize)]
pub struct ReceivedItem<'a> {
    pub connection: &'a str,
    pub index: usize,
    pub item: &'a Value,
}

/// Outcome of one `send` invocation.
#[derive(Debug, Serialize)]
pub struct SendReport<'a> {
    pub endpoint: String,
    pub connection: &'a str,
    pub sent: usize,
    pub reply: &'a Value,
}

pub fn print_item(item: &ReceivedItem<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", to_json_line(item)),
        OutputFormat::Table => {
            let table = single_row_table(
                ["CONNECTION", "INDEX", "ITEM"],
                [
                    item.connection.to_string(),
                    item.index.to_string(),
                    compact(item.item),
                ],
            );
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("[{}] #{} {}", item.connection, item.index, compact(item.item));
        }
    }
}

pub fn print_report(report: &SendReport<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", to_json_line(report)),
        OutputFormat::Table => {
            let table = single_row_table(
                ["ENDPOINT", "SENT", "REPLY"],
                [
                    report.endpoint.clone(),
                    report.sent.to_string(),
                    compact(report.reply),
                ],
            );
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("sent {} items to {}", report.sent, report.endpoint);
            println!("server replied: {}", compact(report.reply));
        }
    }
}

fn single_row_table<const N: usize>(header: [&str; N], row: [String; N]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec())
        .add_row(row.to_vec());
    table
}

fn to_json_line<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

/// Strings print bare; everything else prints as compact JSON.
pub fn compact(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
