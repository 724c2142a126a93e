use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use error::AppError;
use mimalloc::MiMalloc;
use offline_cache::{
    CacheProvider, FetchConfig, FileCache, HttpFetcher, MemoryCache, Registration, WorkerConfig,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::writer::MakeWriterExt;

mod cli;
mod error;
mod server;

use cli::{CliArgs, split_header};
use server::AppState;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

fn init_logging(args: &CliArgs) -> Result<(), AppError> {
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let builder = FmtSubscriber::builder().with_max_level(log_level);
    let result = match &args.log_file {
        Some(path) => {
            let log_file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let writer = MakeWriterExt::and(std::io::stdout, Arc::new(log_file));
            tracing::subscriber::set_global_default(
                builder.with_writer(writer).with_ansi(false).finish(),
            )
        }
        None => tracing::subscriber::set_global_default(builder.with_ansi(true).finish()),
    };
    result.map_err(|e| AppError::Initialization(e.to_string()))
}

fn worker_config(args: &CliArgs) -> WorkerConfig {
    WorkerConfig::builder()
        .with_origin(args.upstream.clone())
        .with_family(&args.family)
        .with_version(&args.cache_version)
        .with_max_dynamic_entries(args.max_dynamic_entries)
        .with_skip_waiting(!args.no_skip_waiting)
        .build()
}

fn fetch_config(args: &CliArgs) -> Result<FetchConfig, AppError> {
    let mut builder = FetchConfig::builder()
        .with_timeout(Duration::from_secs(args.timeout))
        .with_connect_timeout(Duration::from_secs(args.connect_timeout));

    if let Some(user_agent) = &args.user_agent {
        builder = builder.with_user_agent(user_agent);
    }

    for header in &args.headers {
        let (name, value) = split_header(header).ok_or_else(|| {
            AppError::InvalidInput(format!("Invalid header '{header}', expected 'Name: Value'"))
        })?;
        info!("Adding header: {name}");
        builder = builder.with_header(name, value);
    }

    Ok(builder.build())
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    // Parse command-line arguments
    let args = CliArgs::parse();
    init_logging(&args)?;

    info!("Offline cache proxy v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "HTTP timeout configuration: overall={}s, connect={}s",
        args.timeout, args.connect_timeout
    );

    let config = worker_config(&args);
    let fetcher = Arc::new(HttpFetcher::new(&fetch_config(&args)?)?);

    let provider: Arc<dyn CacheProvider> = match &args.cache_dir {
        Some(dir) => {
            info!("Persisting cache namespaces under {}", dir.display());
            tokio::fs::create_dir_all(dir).await?;
            Arc::new(FileCache::new(dir))
        }
        None => {
            info!("Keeping cache namespaces in memory");
            Arc::new(MemoryCache::new())
        }
    };

    let registration = Arc::new(Registration::new(provider, fetcher));
    let cleanup_tag = config.cleanup_tag.clone();
    let version = config.version.clone();

    // The page keeps working without a worker, requests then go straight upstream.
    match registration.register(config).await {
        Ok(worker) => info!(version = %version, state = %worker.state(), "Worker registered"),
        Err(e) => warn!(error = %e, "Worker install failed, proxying without cache"),
    }

    let cancel = CancellationToken::new();
    let maintenance = (args.maintenance_interval > 0).then(|| {
        server::spawn_maintenance(
            Arc::clone(&registration),
            cleanup_tag,
            Duration::from_secs(args.maintenance_interval),
            cancel.clone(),
        )
    });

    let listener = TcpListener::bind(args.listen).await?;
    let state = Arc::new(AppState {
        registration,
        upstream: args.upstream.clone(),
    });

    let shutdown = {
        let cancel = cancel.clone();
        async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
            cancel.cancel();
        }
    };
    server::serve(listener, state, shutdown).await?;

    cancel.cancel();
    if let Some(handle) = maintenance {
        handle.await.ok();
    }
    info!("Shut down cleanly");
    Ok(())
}
