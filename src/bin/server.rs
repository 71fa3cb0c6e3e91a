use clap::Parser;
use rudis::config::Config;
use rudis::{server, Error};

#[derive(Parser, Debug)]
struct Args {
    /// The address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// The port to listen on
    #[arg(short, long, default_value_t = 6379)]
    port: u16,

    /// Number of logical databases
    #[arg(long, default_value_t = 16)]
    databases: usize,

    /// Append every mutation to the append-only log
    #[arg(long)]
    appendonly: bool,

    /// Path of the append-only log file
    #[arg(long, default_value = "appendonly.aof")]
    appendfilename: String,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    let config = Config {
        address: args.bind,
        port: args.port,
        databases: args.databases,
        append_only: args.appendonly,
        append_filename: args.appendfilename,
    };

    server::run(config, tokio::signal::ctrl_c()).await
}
