use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("localipc {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: localipc");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("LOCALIPC_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("transport: {}", transport_name());
    println!(
        "max_payload_bytes: {}",
        localipc_frame::DEFAULT_MAX_PAYLOAD
    );

    Ok(SUCCESS)
}

fn transport_name() -> &'static str {
    if cfg!(windows) {
        "named-pipe"
    } else {
        "unix-domain-socket"
    }
}
