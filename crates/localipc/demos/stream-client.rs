//! Streams a few values to the echo server and prints what comes back.
//!
//! Start `cargo run --example echo-server` first; this client retries for
//! up to 30 seconds while the server is not listening yet.

use localipc::{connect, Endpoint};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = connect(Endpoint::from_name("localipc-echo"))?;

    let sent = conn.xwrite(["alpha", "beta", "gamma"])?;
    eprintln!("sent {sent} items");

    for item in conn.xread::<String>() {
        println!("{}", item?);
    }
    Ok(())
}
