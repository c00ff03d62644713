//! Echo server: every client gets its own thread, and every streamed item
//! is sent straight back.
//!
//! Run with:
//!   cargo run --example echo-server
//!
//! In another terminal:
//!   cargo run --example stream-client

use localipc::{listen, Connection, Endpoint};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let endpoint = Endpoint::from_name("localipc-echo");
    eprintln!("Listening on {endpoint}");

    let never = listen(endpoint, |mut conn: Connection| -> localipc::Result<()> {
        let items: Vec<serde_json::Value> = conn.xread().collect::<localipc::Result<_>>()?;
        eprintln!("{}: echoing {} items", conn.id(), items.len());
        conn.xwrite(items)?;
        conn.close();
        Ok(())
    })?;
    match never {}
}
