use std::{process, time::Duration};

use anyhow::Context;
use clap::Parser;
use crossbeam_channel::bounded;
#[cfg(feature = "storage_hdf5")]
use packet_slurper::hdf5_store::Hdf5Store;
use packet_slurper::{
    config::{Config, StorageFormat},
    error::Error,
    pipeline::{Pipeline, PipelineSettings},
    radio::DummyRadio,
    storage::{CaptureStore, DirStore},
};
use tracing::{error, info, warn};

mod args;

use args::{convert_filter, Args, Command};

#[cfg(feature = "storage_hdf5")]
fn hdf5_store(config: &Config) -> anyhow::Result<Hdf5Store> {
    Ok(Hdf5Store::new(&config.storage.root))
}

#[cfg(not(feature = "storage_hdf5"))]
fn hdf5_store(_config: &Config) -> anyhow::Result<DirStore> {
    anyhow::bail!("HDF5 storage requested, but built without the storage_hdf5 feature")
}

fn monitor<S>(config: &Config, store: S) -> anyhow::Result<()>
where
    S: CaptureStore + Send + 'static,
{
    let settings = PipelineSettings::from_config(config)?;
    let radio = DummyRadio::new(
        config.dummy.clone(),
        config.radio.chunk_capacity,
        config.radio.sample_rate,
    )?;

    let (interrupt_tx, interrupt_rx) = bounded(1);
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.try_send(());
    })?;

    info!(
        center_freq = config.radio.center_freq,
        sample_rate = config.radio.sample_rate,
        container = %config.monitor.file_name,
        "monitoring"
    );
    let pipeline = Pipeline::launch(settings, radio, store)?;
    // Run until Ctrl-C, or until the stages end on their own
    let result = loop {
        if pipeline.is_finished() {
            break pipeline.join();
        }
        if interrupt_rx.recv_timeout(Duration::from_millis(100)).is_ok() {
            info!("interrupt received");
            break pipeline.shutdown(config.shutdown_grace());
        }
    };

    match result {
        Ok(_) => Ok(()),
        Err(Error::ShutdownTimeout(stages)) => {
            error!(?stages, "forcing exit");
            process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

fn list<S: CaptureStore>(store: &S, container: Option<&str>) -> anyhow::Result<()> {
    let containers = match container {
        Some(name) => vec![name.to_owned()],
        None => store.containers()?,
    };
    for name in containers {
        println!("{name}");
        for id in store.datasets(&name)? {
            let meta = match store.metadata(&name, id) {
                Ok(meta) => meta,
                Err(e) => {
                    warn!(container = %name, dataset = %id, error = %e, "unreadable metadata");
                    println!("  {id}: metadata unavailable");
                    continue;
                }
            };
            println!(
                "  {id}: {} samples, {:.6} s, {:.3} MHz at {:.3} MS/s, threshold {}, captured {}",
                meta.sample_count,
                meta.duration_seconds,
                meta.center_frequency / 1e6,
                meta.sample_rate / 1e6,
                meta.threshold,
                meta.captured_at.to_rfc3339(),
            );
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(convert_filter(args.verbose.log_level_filter()))
        .init();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    match args.command {
        Command::Monitor {
            max_loops,
            threshold,
        } => {
            if max_loops.is_some() {
                config.monitor.max_loops = max_loops;
            }
            if let Some(threshold) = threshold {
                config.monitor.threshold = threshold;
            }
            match config.storage.format {
                StorageFormat::Dir => monitor(&config, DirStore::new(&config.storage.root)),
                StorageFormat::Hdf5 => monitor(&config, hdf5_store(&config)?),
            }
        }
        Command::List { container } => {
            let container = container.as_deref();
            match config.storage.format {
                StorageFormat::Dir => list(&DirStore::new(&config.storage.root), container),
                StorageFormat::Hdf5 => list(&hdf5_store(&config)?, container),
            }
        }
    }
}
