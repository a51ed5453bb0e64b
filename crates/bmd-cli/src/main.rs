use clap::Parser;

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    // The log path is a flag, so parse before installing the subscriber.
    let args = Cli::parse();
    if bmd_core::logging::init_logging(&args.log).is_err() {
        bmd_core::logging::init_logging_stderr();
    }

    match cli::run(args).await {
        Ok(code) => {
            if code != 0 {
                std::process::exit(code);
            }
        }
        Err(err) => {
            eprintln!("bmd error: {err:#}");
            std::process::exit(1);
        }
    }
}
