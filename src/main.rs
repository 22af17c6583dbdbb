use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use pdf_inbox::config::{self, Config};
use pdf_inbox::error::{ConfigError, Result};
use pdf_inbox::logging;
use pdf_inbox::mail::fetcher::{self, FetchOptions};
use pdf_inbox::ocr::OcrMyPdf;
use pdf_inbox::processor::process_staged;
use pdf_inbox::staging::Staging;

/// Fetch PDF attachments from a mailbox, OCR them and file the results.
#[derive(Parser, Debug)]
#[command(name = "pdf-inbox", version, about)]
struct Cli {
    /// Directory the searchable PDFs are placed in.
    #[arg(short, long)]
    path: PathBuf,

    /// Skip the mailbox and only process what is already staged.
    #[arg(long, conflicts_with = "skip_ocr")]
    skip_fetch: bool,

    /// Only fetch attachments into staging.
    #[arg(long)]
    skip_ocr: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Install rustls crypto provider before any TLS usage
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = match config::load_dotenv().and_then(|()| Config::from_env()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Held until exit so buffered log lines reach the file.
    let _log_guard = match logging::init(&config.log_file) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(&cli, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli, config: &Config) -> Result<()> {
    if cli.path.as_os_str().is_empty() {
        return Err(ConfigError::InvalidValue {
            key: "--path".into(),
            message: "path is empty".into(),
        }
        .into());
    }

    let staging = Staging::new(&config.staging_dir);

    if !cli.skip_fetch {
        let session = fetcher::connect(&config.mail).await?;
        let options = FetchOptions::from(&config.mail);
        fetcher::fetch_attachments(session, &staging, &options).await?;
    }

    if !cli.skip_ocr {
        let engine = OcrMyPdf::new(&config.ocr_command);
        let produced = process_staged(&staging, &engine, &cli.path).await?;
        info!(count = produced.len(), "Processing finished");
    }

    Ok(())
}
