use anyhow::{Context, Result};
use clap::Parser;
use tokio::{
    io::{BufReader, BufWriter},
    net::TcpStream,
};
use tracing::info;

use typing_record_bot::{
    cli::{Cli, Command, RecordCommand},
    gateway, logging, record, Bot, Config,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = Config::load(&cli)?;
    logging::init(cfg.logging_enabled, &cfg.log_level);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(cfg).await,
        Command::Record {
            command: RecordCommand::Show,
        } => show_record(&cfg).await,
    }
}

async fn run(cfg: Config) -> Result<()> {
    let bot = Bot::from_config(&cfg).await;
    match &cfg.connect {
        Some(addr) => {
            let stream = TcpStream::connect(addr)
                .await
                .with_context(|| format!("connecting to chat gateway at {addr}"))?;
            info!("connected to chat gateway at {addr}");
            let (read, write) = stream.into_split();
            gateway::serve(BufReader::new(read), BufWriter::new(write), bot).await
        }
        None => {
            info!("talking to chat gateway over stdio");
            let reader = BufReader::new(tokio::io::stdin());
            let writer = BufWriter::new(tokio::io::stdout());
            gateway::serve(reader, writer, bot).await
        }
    }
}

async fn show_record(cfg: &Config) -> Result<()> {
    let path = &cfg.record_file;
    let record = record::read_record(path)
        .await?
        .unwrap_or_default();
    println!("{}", typing_record_bot::bot::record_summary(&cfg.tracked_user.name, &record));
    println!("record file: {}", path.display());
    Ok(())
}
