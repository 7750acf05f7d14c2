//! Coffer CLI: exercise the secure channel end to end.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coffer_client::{ClientConfig, CofferClient};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "coffer")]
#[command(about = "Coffer encrypted cloud storage client")]
struct Args {
    /// Server base URL
    #[arg(short, long, default_value = "http://localhost:8080", env = "COFFER_SERVER")]
    server: String,

    /// Bearer access token
    #[arg(short, long, env = "COFFER_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a handshake and round-trip a test message
    Test {
        /// Message to send through the channel
        #[arg(default_value = "hello from coffer")]
        message: String,
    },

    /// Encrypt and upload a file
    Upload {
        /// File to upload
        file: PathBuf,

        /// MIME type; guessed from the extension if omitted
        #[arg(short, long)]
        mime: Option<String>,
    },

    /// Download a blob from its presigned URL and decrypt it
    Download {
        /// Presigned URL from a previous upload
        url: String,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show version information
    Version,
}

// Minimal extension map for the upload default; pass --mime for anything
// exotic.
fn guess_mime(path: &std::path::Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "html" => "text/html",
        "json" => "application/json",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
    .to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    coffer_common::init_tracing();

    let args = Args::parse();
    let config = ClientConfig {
        base_url: args.server,
        access_token: args.token,
        ..ClientConfig::default()
    };
    let client = CofferClient::new(config)?;

    match args.command {
        Command::Test { message } => {
            println!("Handshaking with {}...", client.config().base_url);
            let session = client.handshake().await?;
            println!("Channel established, client id: {}", session.client_id());

            let echoed = session.send_test_message(&message).await?;
            println!("Server decrypted: {}", echoed);
        }
        Command::Upload { file, mime } => {
            let data = std::fs::read(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let filename = file
                .file_name()
                .and_then(|n| n.to_str())
                .context("file has no usable name")?;
            let mime = mime.unwrap_or_else(|| guess_mime(&file));

            client.handshake().await?;
            let record = client.upload_file(&data, filename, &mime).await?;

            println!("Uploaded {} ({} bytes plaintext)", record.name, data.len());
            println!("Object id:    {}", record.obj_id);
            println!("Download URL: {}", record.url);
        }
        Command::Download { url, output } => {
            client.handshake().await?;
            let plaintext = client.download_file(&url).await?;

            std::fs::write(&output, &plaintext)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("Wrote {} bytes to {}", plaintext.len(), output.display());
        }
        Command::Version => {
            println!("coffer {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
