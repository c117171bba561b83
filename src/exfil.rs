//! This module is responsible for exfilling completed bursts to storage

use chrono::Utc;
use crossbeam_channel::Receiver;
use tracing::{debug, error, warn};

use crate::{
    config::Config,
    detect::Batch,
    error::Result,
    message::Message,
    monitoring::ExfilReport,
    storage::{CaptureMetadata, CaptureStore},
};

/// Where captures go and what gets recorded with them
#[derive(Debug, Clone, PartialEq)]
pub struct ExfilOptions {
    pub container: String,
    pub center_frequency: f64,
    pub sample_rate: f64,
    pub threshold: f32,
    /// Stop the stage on the first failed save instead of logging it
    pub abort_on_error: bool,
}

impl ExfilOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            container: config.monitor.file_name.clone(),
            center_frequency: config.radio.center_freq,
            sample_rate: config.radio.sample_rate,
            threshold: config.monitor.threshold,
            abort_on_error: config.monitor.abort_on_storage_error,
        }
    }
}

/// Save every burst in arrival order until end of stream.
/// Failed saves are not retried.
pub fn persist_bursts<S: CaptureStore>(
    mut store: S,
    packets: Receiver<Message<Batch>>,
    opts: ExfilOptions,
) -> Result<ExfilReport> {
    let mut report = ExfilReport::default();
    for msg in packets.iter() {
        let batch = match msg {
            Message::Data(batch) => batch,
            Message::EndOfStream => return Ok(report),
        };
        for burst in batch {
            let metadata = CaptureMetadata::new(
                burst.len(),
                opts.center_frequency,
                opts.threshold,
                opts.sample_rate,
                Utc::now(),
            );
            match store.save(&opts.container, burst.samples(), &metadata) {
                Ok(id) => {
                    report.saved += 1;
                    debug!(dataset = %id, samples = burst.len(), "saved burst");
                }
                Err(e) => {
                    report.failed += 1;
                    error!(error = %e, samples = burst.len(), "failed to save burst");
                    if opts.abort_on_error {
                        return Err(e);
                    }
                }
            }
        }
    }
    warn!("packet queue closed without end of stream");
    Ok(report)
}
