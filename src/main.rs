use anyhow::Result;
use clap::Parser;
use ssh_exec::{cli::Cli, config::Config, run_commands};

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = Config::from_cli(&cli)?;

    if config.verbose {
        eprintln!("Target: {}@{}", cli.username, config.connect.address());
    }

    match run_commands(config.clone()) {
        Ok(results) => {
            if config.json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                for result in &results {
                    if config.verbose {
                        println!("{}", result);
                    } else {
                        print!("{}", result.response());
                    }
                }
            }
            let code = results.last().map(|r| r.exit_status()).unwrap_or(0);
            std::process::exit(code);
        }
        Err(e) => {
            eprintln!("\n❌ {:#}\n", e);
            std::process::exit(1);
        }
    }
}
