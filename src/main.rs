use std::env;

use clap::Parser;
use fire_atlas::api::{AppContext, Cli, run_cli, run_http_server};

#[tokio::main]
async fn main() {
    env_logger::init();

    let raw_args: Vec<String> = env::args().collect();
    if raw_args.get(1).map(|s| s.as_str()) == Some("serve") {
        let port = raw_args
            .get(2)
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(8080);
        let context = match AppContext::embedded() {
            Ok(context) => context,
            Err(e) => {
                eprintln!("Failed to load reference data: {e}");
                std::process::exit(1);
            }
        };
        if let Err(e) = run_http_server(port, context).await {
            eprintln!("Server error: {e}");
            std::process::exit(1);
        }
        return;
    }

    match run_cli(Cli::parse()) {
        Ok(report) => println!("{report}"),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
