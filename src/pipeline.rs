//! Wires capture -> detect -> exfil together with bounded queues, one thread
//! per stage, and shuts them down again.
//!
//! ```text
//! radio -> capture -[stream queue]-> detect -[packet queue]-> exfil -> store
//! ```
//!
//! Shutdown travels with the data: capture stops reading and pushes
//! `EndOfStream`, detect flushes its open burst and forwards the marker, and
//! exfil exits once it has saved everything ahead of it. If capture doesn't
//! stop within the grace period the controller pushes the marker itself.
//! Stages still running at the deadline are abandoned and reported.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{bounded, Sender};
use tracing::{error, info, warn};

use crate::{
    assembler::BurstAssembler,
    capture::capture_chunks,
    chunk::SampleChunk,
    config::Config,
    detect::detect_bursts,
    error::{Error, Result},
    exfil::{persist_bursts, ExfilOptions},
    message::Message,
    monitoring::{CaptureReport, DetectReport, ExfilReport, RunReport},
    radio::Radio,
    segment::DetectParams,
    storage::CaptureStore,
};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Shared flag asking the capture stage to stop
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub params: DetectParams,
    /// Capacity of both inter-stage queues
    pub queue_size: usize,
    pub max_loops: Option<u64>,
    pub heartbeat_every: u64,
    pub max_burst_samples: usize,
    pub exfil: ExfilOptions,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            params: config.detect_params()?,
            queue_size: config.monitor.queue_size,
            max_loops: config.monitor.max_loops,
            heartbeat_every: config.monitor.heartbeat_every,
            max_burst_samples: config.monitor.max_burst_samples,
            exfil: ExfilOptions::from_config(config),
        })
    }
}

pub struct Pipeline {
    stop: StopSignal,
    /// Lets the controller end the stream if capture is stuck
    stream: Sender<Message<SampleChunk>>,
    capture: JoinHandle<Result<CaptureReport>>,
    detect: JoinHandle<Result<DetectReport>>,
    exfil: JoinHandle<Result<ExfilReport>>,
}

impl Pipeline {
    pub fn launch<R, S>(settings: PipelineSettings, radio: R, store: S) -> Result<Self>
    where
        R: Radio + Send + 'static,
        S: CaptureStore + Send + 'static,
    {
        let (stream_tx, stream_rx) = bounded(settings.queue_size);
        let (packet_tx, packet_rx) = bounded(settings.queue_size);
        let stop = StopSignal::new();

        let assembler = BurstAssembler::new(settings.params)
            .with_max_burst_samples(settings.max_burst_samples);
        let exfil_opts = settings.exfil;
        let max_loops = settings.max_loops;
        let heartbeat_every = settings.heartbeat_every;

        // Start from the end of the pipeline so nothing waits on a missing consumer
        let exfil = thread::Builder::new()
            .name("exfil".to_owned())
            .spawn(move || persist_bursts(store, packet_rx, exfil_opts))?;
        let detect = thread::Builder::new()
            .name("detect".to_owned())
            .spawn(move || detect_bursts(assembler, stream_rx, packet_tx))?;
        let capture = {
            let stop = stop.clone();
            let stream_tx = stream_tx.clone();
            thread::Builder::new()
                .name("capture".to_owned())
                .spawn(move || capture_chunks(radio, stream_tx, stop, max_loops, heartbeat_every))?
        };
        info!(
            threshold = settings.params.threshold,
            cutoff = settings.params.cutoff,
            slack = settings.params.slack,
            queue_size = settings.queue_size,
            "pipeline started"
        );

        Ok(Self {
            stop,
            stream: stream_tx,
            capture,
            detect,
            exfil,
        })
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// True once every stage has exited
    pub fn is_finished(&self) -> bool {
        self.capture.is_finished() && self.detect.is_finished() && self.exfil.is_finished()
    }

    /// Wait for the stages to end on their own (source exhausted, max loops or
    /// an earlier stop request)
    pub fn join(self) -> Result<RunReport> {
        let Self {
            stream,
            capture,
            detect,
            exfil,
            ..
        } = self;
        // If capture dies without ending the stream, detect sees the queue close
        drop(stream);
        collect(capture, detect, exfil)
    }

    /// Ask the stages to stop. Capture gets `grace` to end the stream, then
    /// detect and exfil get `grace` to drain what is left.
    pub fn shutdown(self, grace: Duration) -> Result<RunReport> {
        info!("shutting down pipeline");
        self.stop.stop();

        if !wait_for(&self.capture, Instant::now() + grace) {
            warn!("capture stage still running, ending the stream for it");
            if self
                .stream
                .send_timeout(Message::EndOfStream, grace)
                .is_err()
            {
                warn!("could not push end of stream, detect stage is not draining");
            }
        }
        let Self {
            stream,
            capture,
            detect,
            exfil,
            ..
        } = self;
        drop(stream);

        let deadline = Instant::now() + grace;
        let stuck: Vec<&'static str> = [
            ("detect", wait_for(&detect, deadline)),
            ("exfil", wait_for(&exfil, deadline)),
            ("capture", capture.is_finished()),
        ]
        .into_iter()
        .filter(|(_, finished)| !finished)
        .map(|(name, _)| name)
        .collect();
        if !stuck.is_empty() {
            // Dropping the handles detaches the threads, the process exit takes them down
            error!(stages = ?stuck, "stages did not stop in time");
            return Err(Error::ShutdownTimeout(stuck));
        }
        collect(capture, detect, exfil)
    }
}

fn wait_for<T>(handle: &JoinHandle<T>, deadline: Instant) -> bool {
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(POLL_INTERVAL);
    }
    true
}

fn join_stage<T>(name: &'static str, handle: JoinHandle<Result<T>>) -> Result<T> {
    handle
        .join()
        .unwrap_or_else(|_| Err(Error::StagePanicked(name)))
}

/// Join every stage. When several failed, the root cause wins over stages
/// that only failed because a neighbour went away.
fn collect(
    capture: JoinHandle<Result<CaptureReport>>,
    detect: JoinHandle<Result<DetectReport>>,
    exfil: JoinHandle<Result<ExfilReport>>,
) -> Result<RunReport> {
    let mut errors = Vec::new();
    let capture = join_stage("capture", capture)
        .map_err(|e| errors.push(e))
        .ok();
    let detect = join_stage("detect", detect).map_err(|e| errors.push(e)).ok();
    let exfil = join_stage("exfil", exfil).map_err(|e| errors.push(e)).ok();

    match (capture, detect, exfil) {
        (Some(capture), Some(detect), Some(exfil)) => {
            let report = RunReport {
                capture,
                detect,
                exfil,
            };
            report.log();
            Ok(report)
        }
        _ => {
            let root = errors.iter().position(|e| !e.is_disconnect()).unwrap_or(0);
            let cause = errors.swap_remove(root);
            for e in &errors {
                warn!(error = %e, "secondary stage failure");
            }
            error!(error = %cause, "pipeline failed");
            Err(cause)
        }
    }
}
