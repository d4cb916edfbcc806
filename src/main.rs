use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use photometa::{AutoConfirm, Confirmer, Mode, Orchestrator, RunOptions, Settings};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "photometa", version)]
#[command(about = "Generate gallery metadata records for a folder of photos")]
struct Args {
    /// Process only this image instead of scanning the assets directory
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Regenerate existing records and skip the confirmation prompt
    #[arg(long)]
    force: bool,

    /// Refresh camera, lens and exposure data in existing records
    #[arg(long, conflicts_with = "update_locations")]
    update_exif: bool,

    /// Refresh the location block of existing records
    #[arg(long)]
    update_locations: bool,

    /// Config file (default: ./photometa.ini)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    assets: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,
}

impl Args {
    fn mode(&self) -> Mode {
        if self.update_exif {
            Mode::UpdateExif
        } else if self.update_locations {
            Mode::UpdateLocation
        } else {
            Mode::Generate
        }
    }
}

struct StdinConfirmer;

#[async_trait]
impl Confirmer for StdinConfirmer {
    async fn confirm(&self, pending: usize) -> Result<bool> {
        tokio::task::spawn_blocking(move || {
            print!("❓ Generate metadata for {} images? [y/N] ", pending);
            std::io::stdout().flush()?;
            let mut answer = String::new();
            std::io::stdin().lock().read_line(&mut answer)?;
            Ok::<_, anyhow::Error>(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
        })
        .await
        .context("Confirmation prompt panicked")?
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("photometa=info")),
        )
        .init();

    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(assets) = &args.assets {
        settings.assets_dir = assets.clone();
    }
    if let Some(output) = &args.output {
        settings.output_dir = output.clone();
    }

    println!("📷 photometa v{}", env!("CARGO_PKG_VERSION"));
    println!("📂 Assets: {}", settings.assets_dir.display());
    println!("📝 Records: {}", settings.output_dir.display());

    let confirmer: Arc<dyn Confirmer> = if args.force {
        Arc::new(AutoConfirm)
    } else {
        Arc::new(StdinConfirmer)
    };
    let orchestrator = Orchestrator::from_settings(settings, confirmer)?;

    let options = RunOptions {
        mode: args.mode(),
        force: args.force,
        single_file: args.file,
    };
    let summary = orchestrator.run(options).await?;

    if summary.failed > 0 {
        println!("⚠️  {} file(s) failed, see messages above", summary.failed);
    } else {
        println!("🎉 Done");
    }
    Ok(())
}
