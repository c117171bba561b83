//! Stateful wrapper around the segmenter that follows bursts across chunks

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::{
    chunk::SampleChunk,
    complex::Sample,
    error::Error,
    segment::{segment, CompletedBurst, DetectParams, Padded, PendingBurst},
};

/// Cap on a single open burst unless configured otherwise, 128 MiB of samples
pub const DEFAULT_MAX_BURST_SAMPLES: usize = 1 << 24;

pub struct BurstAssembler {
    params: DetectParams,
    pending: Option<PendingBurst>,
    /// Ended bursts waiting on the next chunk for their trailing slack
    unpadded: Vec<PendingBurst>,
    /// The last `slack` samples of the stream, for padding bursts that start
    /// right at a chunk boundary
    tail: VecDeque<Sample>,
    max_burst_samples: usize,
}

impl BurstAssembler {
    pub fn new(params: DetectParams) -> Self {
        Self {
            params,
            pending: None,
            unpadded: Vec::new(),
            tail: VecDeque::with_capacity(params.slack),
            max_burst_samples: DEFAULT_MAX_BURST_SAMPLES,
        }
    }

    /// Force-close any burst held open for `max` samples or more
    pub fn with_max_burst_samples(mut self, max: usize) -> Self {
        self.max_burst_samples = max.max(1);
        self
    }

    pub fn params(&self) -> &DetectParams {
        &self.params
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Feed the next chunk of the stream, returning the bursts it closed in
    /// the order they ended
    pub fn on_chunk(&mut self, chunk: &SampleChunk) -> Result<Vec<CompletedBurst>, Error> {
        let signal = chunk.trimmed();
        let slack = self.params.slack;
        let pending = self.pending.take();
        let tail = self.tail.make_contiguous();
        let mut seg = segment(signal, &self.params, pending, tail)?;
        self.remember_tail(signal);

        // Bursts owed slack ended before anything this chunk closed
        let mut closed = Vec::with_capacity(seg.closed.len());
        let mut owed = Vec::new();
        for burst in self.unpadded.drain(..) {
            match burst.pad(signal, slack) {
                Padded::Done(burst) => closed.push(burst),
                Padded::Short(burst) => owed.push(burst),
            }
        }
        closed.append(&mut seg.closed);
        owed.append(&mut seg.unpadded);
        self.unpadded = owed;

        let oversized = seg
            .pending
            .as_ref()
            .map_or(false, |pending| pending.len() >= self.max_burst_samples);
        if oversized {
            if let Some(pending) = seg.pending.take() {
                warn!(
                    samples = pending.len(),
                    "burst exceeded the size limit, closing it early"
                );
                // Keep every sample: the stream carries straight on into the
                // next chunk, which must not pad from what was saved here
                let held = pending.carryover();
                closed.push(pending.close(&[], held));
                self.tail.clear();
            }
        }
        self.pending = seg.pending;
        for burst in &closed {
            debug!(samples = burst.len(), "burst closed");
        }
        Ok(closed)
    }

    /// End of stream: whatever is still open or short of slack is as complete
    /// as it will ever be
    pub fn finish(&mut self) -> Vec<CompletedBurst> {
        self.tail.clear();
        let slack = self.params.slack;
        self.unpadded
            .drain(..)
            .chain(self.pending.take())
            .map(|burst| burst.close(&[], slack))
            .filter(|burst| !burst.is_empty())
            .collect()
    }

    fn remember_tail(&mut self, signal: &[Sample]) {
        let keep = self.params.slack;
        if signal.len() >= keep {
            self.tail.clear();
            self.tail.extend(&signal[signal.len() - keep..]);
        } else {
            self.tail.extend(signal);
            let excess = self.tail.len().saturating_sub(keep);
            self.tail.drain(..excess);
        }
    }
}
