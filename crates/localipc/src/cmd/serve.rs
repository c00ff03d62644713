use std::sync::Arc;

use localipc_conn::{Connection, ConnectionConfig, Listener, ListenerConfig, ListenerStats};
use localipc_transport::{Endpoint, EndpointCleanup};
use serde_json::{json, Value};
use tracing::info;

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{ipc_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_item, OutputFormat, ReceivedItem};

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let read_timeout = parse_duration(&args.read_timeout)?;
    let config = ListenerConfig {
        endpoint_mode: args.mode,
        connection: ConnectionConfig {
            read_timeout,
            ..ConnectionConfig::default()
        },
    };

    let listener = Listener::bind_with_config(Endpoint::new(&args.endpoint), config)
        .map_err(|err| ipc_error("bind failed", err))?;
    install_ctrlc_handler(listener.cleanup(), listener.stats())?;

    match listener.serve(move |conn| handle_connection(conn, format)) {
        Ok(never) => match never {},
        Err(err) => Err(ipc_error("serve failed", err)),
    }
}

/// Drain one client stream, then acknowledge it with the item count.
fn handle_connection(mut conn: Connection, format: OutputFormat) -> localipc_conn::Result<()> {
    let id = conn.id().to_string();
    info!(connection = %id, "client connected");

    let mut received = 0usize;
    for item in conn.xread::<Value>() {
        let item = item?;
        print_item(
            &ReceivedItem {
                connection: &id,
                index: received,
                item: &item,
            },
            format,
        );
        received += 1;
    }

    conn.write(&json!({ "received": received }))?;
    conn.close();
    info!(connection = %id, received, "stream acknowledged");
    Ok(())
}

fn install_ctrlc_handler(cleanup: EndpointCleanup, stats: Arc<ListenerStats>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        info!(
            accepted = stats.accepted(),
            active = stats.active(),
            failed = stats.failed(),
            "shutting down"
        );
        cleanup.run();
        std::process::exit(SUCCESS);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
