use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod generate;
pub mod serve;
pub mod watch;

const DEFAULT_API_URL: &str = "http://127.0.0.1:2222/api";

#[derive(Subcommand)]
enum Command {
    /// Run the API server
    Serve {
        /// Set the server host address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Set the server port
        #[arg(long, default_value = "2222")]
        port: String,
    },
    /// Create a temporary mailbox through a running server
    Generate {
        #[arg(long)]
        address: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = DEFAULT_API_URL)]
        api_url: String,
    },
    /// Follow the inbox of a mailbox and print what arrives
    Watch {
        #[arg(long)]
        address: String,
        #[arg(long, default_value = DEFAULT_API_URL)]
        api_url: String,
        /// Seconds between polls, 5 to 60
        #[arg(long, default_value = "15")]
        interval_secs: u64,
        /// Retries allowed once polling gives up, 0 to stop right away
        #[arg(long, default_value = "0")]
        auto_retries: u32,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();

    // Handle each sub command
    match args.command {
        Some(Command::Serve { host, port }) => {
            serve::run(host, port).await?;
        }
        Some(Command::Generate {
            address,
            password,
            api_url,
        }) => {
            generate::run(&api_url, &address, &password).await?;
        }
        Some(Command::Watch {
            address,
            api_url,
            interval_secs,
            auto_retries,
        }) => {
            watch::run(&api_url, &address, interval_secs, auto_retries).await?;
        }
        None => {}
    }

    Ok(())
}
