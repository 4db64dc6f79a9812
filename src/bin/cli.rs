//! Binary entry point for the Trellis CLI.
#![forbid(unsafe_code)]

use clap::Parser;

use trellis::cli::{run, Cli};

#[tokio::main]
async fn main() {
    trellis::logging::init();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(output) => println!("{output}"),
        Err(err) => {
            eprintln!("error [{}]: {err}", err.code());
            if let Some(hint) = err.recovery_suggestion() {
                eprintln!("hint: {hint}");
            }
            std::process::exit(1);
        }
    }
}
