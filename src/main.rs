use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use lookout::capture::{self, CaptureConfig, FileSink, RemoteSink, TestPatternSource};
use lookout::cleanup;
use lookout::collect::{CollectorConfig, CollectorServer, ImageProxy};
use lookout::{CollectorClient, WebConfig, WebServer};

#[derive(Parser)]
#[command(name = "lookout", version, about = "Remote image capture, collection, and live-feed relay")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Capture frames on an interval and save them locally or remotely
    ///
    /// Frames come from the built-in test-pattern source; real capture
    /// devices attach through the FrameSource trait.
    Capture {
        /// Destination: file://<dir> or tcp://<host:port>
        #[arg(short, long, default_value = "file:///tmp")]
        save: String,

        /// Device identifier embedded in frame IDs
        #[arg(short, long, default_value = "0")]
        device: String,

        /// Seconds between captures
        #[arg(short, long, default_value_t = 5)]
        frequency: u64,
    },

    /// Run the collector: ingest, store, and broadcast images
    Collect {
        /// Listen address
        #[arg(short, long, default_value = "127.0.0.1:4650")]
        listen: SocketAddr,

        /// Directory in which to store images
        #[arg(short = 'd', long, default_value = "/tmp")]
        image_dir: PathBuf,

        /// Public base URL under which stored images are reachable
        #[arg(long, default_value = "http://localhost:8000/image")]
        public_base: String,

        /// Also serve the image directory over HTTP at this address
        #[arg(long)]
        proxy_listen: Option<SocketAddr>,
    },

    /// Serve the browser feed: index page, SSE relay, image files
    Web {
        /// Listen address
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        listen: SocketAddr,

        /// Collector address
        #[arg(long, default_value = "127.0.0.1:4650")]
        collector: String,

        /// Directory the /image route serves files from
        #[arg(short = 'd', long, default_value = "/tmp")]
        image_dir: PathBuf,

        /// Image URL prefix used in collector announcements
        #[arg(long, default_value = "http://localhost:8000/image")]
        upstream_base: String,
    },

    /// Delete stored images older than a cutoff
    Cleanup {
        /// Directory in which to delete stored images
        #[arg(short = 'd', long, default_value = "/tmp")]
        image_dir: PathBuf,

        /// Delete images older than this many hours
        #[arg(long, default_value_t = 24 * 7)]
        max_age_hours: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lookout=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Capture {
            save,
            device,
            frequency,
        } => {
            let config = CaptureConfig::default()
                .interval(Duration::from_secs(frequency))
                .device_id(device);
            let source = TestPatternSource::new(480, 640);

            if let Some(dir) = save.strip_prefix("file://") {
                capture::run(source, FileSink::new(dir), config, shutdown_signal()).await?;
            } else if let Some(addr) = save.strip_prefix("tcp://") {
                let client = CollectorClient::connect(addr).await?;
                capture::run(source, RemoteSink::new(client), config, shutdown_signal()).await?;
            } else {
                anyhow::bail!("invalid destination: {} (expected file:// or tcp://)", save);
            }
        }

        Command::Collect {
            listen,
            image_dir,
            public_base,
            proxy_listen,
        } => {
            let config = CollectorConfig::default()
                .bind(listen)
                .image_dir(&image_dir)
                .public_base(public_base);
            let server = Arc::new(CollectorServer::new(config));

            let proxy_task = proxy_listen.map(|addr| {
                let proxy = ImageProxy::new(addr, &image_dir);
                tokio::spawn(async move {
                    if let Err(e) = proxy.run_until(shutdown_signal()).await {
                        tracing::error!(error = %e, "image proxy failed");
                    }
                })
            });

            server.run_until(shutdown_signal()).await?;
            if let Some(task) = proxy_task {
                let _ = task.await;
            }
        }

        Command::Web {
            listen,
            collector,
            image_dir,
            upstream_base,
        } => {
            let config = WebConfig::default()
                .bind(listen)
                .collector_addr(collector)
                .image_dir(image_dir)
                .upstream_image_base(upstream_base);
            WebServer::new(config).run_until(shutdown_signal()).await?;
        }

        Command::Cleanup {
            image_dir,
            max_age_hours,
        } => {
            let older_than = Duration::from_secs(max_age_hours * 3600);
            cleanup::sweep(&image_dir, older_than).await?;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("stopping");
}
