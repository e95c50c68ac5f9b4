//! `streamtap` CLI - serve the resolver over HTTP, or resolve one page

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use streamtap::{Config, StreamResolver};

#[derive(Parser)]
#[command(name = "streamtap")]
#[command(about = "Resolve HLS manifests behind video embed pages and proxy them")]
#[command(version)]
struct Cli {
    /// Config file (default: <config dir>/streamtap/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Chromium-family browser used by the rendered tier
    #[arg(long, global = true)]
    browser: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (/stream, /resolve, /health)
    Serve {
        /// Address to listen on
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },

    /// Resolve a page URL to its manifest URL and print it
    Resolve {
        /// Embed page URL
        url: String,

        /// Only try the static HTML tier
        #[arg(long)]
        skip_render: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(browser) = cli.browser {
        config.render.browser = Some(browser);
    }

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            streamtap::web::serve(&config).await?;
        }
        Commands::Resolve { url, skip_render } => {
            if skip_render {
                config.render.enabled = false;
            }
            cmd_resolve(&config, &url).await?;
        }
    }

    Ok(())
}

async fn cmd_resolve(config: &Config, url: &str) -> Result<()> {
    let resolver = Arc::new(StreamResolver::from_config(config)?);
    let start = Instant::now();
    let resolution = resolver.resolve(url).await?;

    eprintln!(
        "Resolved via {} tier in {:.2}s",
        resolution.tier,
        start.elapsed().as_secs_f64()
    );
    println!("{}", resolution.manifest_url);
    Ok(())
}
