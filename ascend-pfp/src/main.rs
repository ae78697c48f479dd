use std::path::PathBuf;

use ascend_pfp::assets::{upload_assets, DEFAULT_ASSETS};
use ascend_pfp::{server, Config, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "ascend-pfp", version, about = "ASCEND profile-picture service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server.
    Serve(ServeArgs),
    /// Upload site images to the blob store.
    UploadAssets(UploadAssetsArgs),
}

#[derive(Debug, Parser)]
struct ServeArgs {
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Debug, Parser)]
struct UploadAssetsArgs {
    #[arg(long, default_value = "public")]
    dir: PathBuf,
    #[arg(long, default_value = "images")]
    bucket: String,
    /// Files relative to --dir; defaults to the character images.
    files: Vec<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run(Cli::parse()).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("ascend-pfp error: {err}");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let mut config = Config::from_env()?;
    match cli.command {
        Command::Serve(args) => {
            if let Some(host) = args.host {
                config.host = host;
            }
            if let Some(port) = args.port {
                config.port = port;
            }
            server::serve(config).await?;
            Ok(0)
        }
        Command::UploadAssets(args) => run_upload_assets(&config, args).await,
    }
}

async fn run_upload_assets(config: &Config, args: UploadAssetsArgs) -> Result<i32> {
    let storage = config.store.storage()?;
    let files = if args.files.is_empty() {
        DEFAULT_ASSETS.iter().map(ToString::to_string).collect()
    } else {
        args.files
    };

    let summary = upload_assets(&storage, &args.dir, &args.bucket, &files).await?;
    for upload in &summary.uploads {
        match &upload.outcome {
            Ok(url) => println!("✓ {} uploaded: {url}", upload.name),
            Err(message) => println!("✗ {}: {message}", upload.name),
        }
    }
    println!(
        "Successfully uploaded: {}/{}",
        summary.succeeded(),
        summary.total()
    );
    Ok(if summary.all_succeeded() { 0 } else { 1 })
}
