use localipc_conn::{connect_with_config, ConnectConfig, ConnectionConfig};
use serde_json::Value;
use tracing::debug;

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{ipc_error, CliResult, SUCCESS};
use crate::output::{print_report, OutputFormat, SendReport};

/// Items streamed when neither explicit items nor `--count` are given.
const DEFAULT_COUNT: usize = 20;

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let config = ConnectConfig {
        timeout,
        connection: ConnectionConfig {
            read_timeout: timeout,
            write_timeout: timeout,
            ..ConnectionConfig::default()
        },
        ..ConnectConfig::default()
    };

    let items = resolve_items(&args);
    let mut conn = connect_with_config(&args.endpoint, &config)
        .map_err(|err| ipc_error("connect failed", err))?;

    let sent = conn
        .xwrite(&items)
        .map_err(|err| ipc_error("send failed", err))?;
    debug!(connection = %conn.id(), sent, "waiting for reply");

    let reply: Value = conn
        .read()
        .map_err(|err| ipc_error("reply failed", err))?;
    conn.close();

    print_report(
        &SendReport {
            endpoint: args.endpoint.display().to_string(),
            connection: conn.id(),
            sent,
            reply: &reply,
        },
        format,
    );
    Ok(SUCCESS)
}

fn resolve_items(args: &SendArgs) -> Vec<Value> {
    if let Some(count) = args.count {
        return (0..count).map(Value::from).collect();
    }
    if args.items.is_empty() {
        return (0..DEFAULT_COUNT).map(Value::from).collect();
    }
    args.items.iter().map(|raw| parse_item(raw)).collect()
}

fn parse_item(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
