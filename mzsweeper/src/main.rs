use std::fs;
use std::io;
use std::path::Path;

use clap::CommandFactory;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mzsweeper::{MZSweeper, MZSweeperError};

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn configure_log(log_file: Option<&Path>) -> io::Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match log_file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(fs::File::create(path)?);
            let layer = fmt::layer()
                .compact()
                .with_ansi(false)
                .with_timer(fmt::time::ChronoLocal::rfc_3339())
                .with_writer(writer)
                .with_filter(
                    EnvFilter::builder()
                        .with_default_directive(tracing::Level::INFO.into())
                        .from_env_lossy(),
                );
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .compact()
                .with_timer(fmt::time::ChronoLocal::rfc_3339())
                .with_writer(io::stderr)
                .with_filter(
                    EnvFilter::builder()
                        .with_default_directive(tracing::Level::INFO.into())
                        .from_env_lossy(),
                ),
        )
        .with(file_layer);

    tracing::subscriber::set_global_default(subscriber).map_err(io::Error::other)?;
    tracing_log::LogTracer::init().map_err(io::Error::other)?;
    Ok(guard)
}

fn main() -> Result<(), MZSweeperError> {
    let matches = MZSweeper::command().get_matches();
    let args = MZSweeper::configure(&matches)?;

    let _guard = configure_log(args.log_file.as_deref())?;
    args.main()
}
