use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("taskrelay {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: taskrelay");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("TASKRELAY_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "profile: {}",
        option_env!("TASKRELAY_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "defaults: tcp={}:{}, http_port={}, max_pending_replies={}",
        taskrelay_server::DEFAULT_TCP_HOST,
        taskrelay_server::DEFAULT_TCP_PORT,
        taskrelay::DEFAULT_HTTP_PORT,
        taskrelay_server::DEFAULT_MAX_PENDING_REPLIES
    );

    Ok(SUCCESS)
}
