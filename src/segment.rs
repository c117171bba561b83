//! Cutting a stream of IQ chunks into bursts.
//!
//! A sample is *active* when its magnitude exceeds the threshold. Active
//! samples separated by no more than `cutoff` quiet samples belong to the same
//! burst. A burst whose end can't be confirmed inside the current chunk is
//! handed back as a [`PendingBurst`] and resolved against the next chunk, using
//! its `carryover` (the quiet samples already seen after its last active one).
//! A burst that did end but whose trailing slack runs past the end of the chunk
//! comes back the same way, in [`Segmentation::unpadded`], and is finished
//! with [`PendingBurst::pad`] once the following samples arrive.
//!
//! Everything here is pure: the caller owns the pending state and the tail of
//! the previous chunk and passes them in explicitly.

use crate::{chunk::trim_trailing_zeros, complex::Sample, error::Error};

/// Detection settings, fixed for the lifetime of a run
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectParams {
    /// Magnitude a sample must exceed to be considered part of a burst
    pub threshold: f32,
    /// Longest run of quiet samples that still belongs to the same burst
    pub cutoff: usize,
    /// Samples of padding to keep on each edge of a burst
    pub slack: usize,
}

impl DetectParams {
    pub fn new(threshold: f32, cutoff: usize, slack: usize) -> Result<Self, Error> {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(Error::Configuration(format!(
                "threshold must be a finite, non-negative magnitude (got {threshold})"
            )));
        }
        Ok(Self {
            threshold,
            cutoff,
            slack,
        })
    }
}

/// A burst that reached the end of a chunk without a confirmed end
#[derive(Clone, Debug, PartialEq)]
pub struct PendingBurst {
    /// Everything from the (padded) start of the burst to the end of the last chunk
    samples: Vec<Sample>,
    /// Quiet samples at the end of `samples`
    carryover: usize,
}

impl PendingBurst {
    pub fn new(samples: Vec<Sample>, carryover: usize) -> Self {
        let carryover = carryover.min(samples.len());
        Self { samples, carryover }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn carryover(&self) -> usize {
        self.carryover
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Trailing slack this burst is still short of
    pub fn padding_needed(&self, slack: usize) -> usize {
        slack.saturating_sub(self.carryover)
    }

    /// Close the burst, padding its end with up to `slack` samples taken first
    /// from the quiet samples already held and then from `next`.
    pub fn close(mut self, next: &[Sample], slack: usize) -> CompletedBurst {
        let end = self.samples.len() - self.carryover;
        self.samples.truncate(end + slack.min(self.carryover));
        let extra = self.padding_needed(slack).min(next.len());
        self.samples.extend_from_slice(&next[..extra]);
        CompletedBurst::new(self.samples)
    }

    /// Close the burst if `next` holds all of its remaining slack, otherwise
    /// absorb `next` and hand the burst back to wait for more.
    pub fn pad(mut self, next: &[Sample], slack: usize) -> Padded {
        if self.padding_needed(slack) <= next.len() {
            Padded::Done(self.close(next, slack))
        } else {
            self.samples.extend_from_slice(next);
            self.carryover += next.len();
            Padded::Short(self)
        }
    }
}

/// A burst whose end is known, with or without its full trailing slack
#[derive(Clone, Debug, PartialEq)]
pub enum Padded {
    Done(CompletedBurst),
    Short(PendingBurst),
}

/// A fully bounded burst, ready for storage
#[derive(Clone, Debug, PartialEq)]
pub struct CompletedBurst {
    samples: Vec<Sample>,
}

impl CompletedBurst {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }
}

/// Result of segmenting one chunk
#[derive(Debug, Default, PartialEq)]
pub struct Segmentation {
    /// Bursts that closed in this chunk, in arrival order
    pub closed: Vec<CompletedBurst>,
    /// Whether the latest burst is still open
    pub still_open: bool,
    /// The open burst to carry into the next chunk
    pub pending: Option<PendingBurst>,
    /// Bursts that ended here but still need trailing slack from the next
    /// chunk, oldest first. None of them are in `closed`.
    pub unpadded: Vec<PendingBurst>,
}

/// Inclusive range of active indices making up one burst candidate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Run {
    first: usize,
    last: usize,
}

fn active_indices(signal: &[Sample], threshold: f32) -> Result<Vec<usize>, Error> {
    let threshold_sqr = threshold * threshold;
    let mut active = Vec::new();
    for (i, s) in signal.iter().enumerate() {
        if !s.is_finite() {
            return Err(Error::MalformedChunk(format!(
                "non-finite sample at index {i}"
            )));
        }
        if s.norm_sqr() > threshold_sqr {
            active.push(i);
        }
    }
    Ok(active)
}

/// Group sorted active indices, splitting wherever more than `cutoff` quiet
/// samples sit between two neighbours
fn split_runs(active: &[usize], cutoff: usize) -> Vec<Run> {
    let mut runs = Vec::new();
    let mut iter = active.iter().copied();
    let Some(first) = iter.next() else {
        return runs;
    };
    let mut run = Run { first, last: first };
    for idx in iter {
        if idx - run.last - 1 > cutoff {
            runs.push(run);
            run = Run {
                first: idx,
                last: idx,
            };
        } else {
            run.last = idx;
        }
    }
    runs.push(run);
    runs
}

/// Finish a burst whose last active sample is `signal[last]`, given the
/// samples that precede `signal[from]`
fn end_burst(
    mut samples: Vec<Sample>,
    signal: &[Sample],
    from: usize,
    last: usize,
    slack: usize,
) -> Padded {
    let end = last + 1 + slack;
    if end <= signal.len() {
        samples.extend_from_slice(&signal[from..end]);
        Padded::Done(CompletedBurst::new(samples))
    } else {
        samples.extend_from_slice(&signal[from..]);
        Padded::Short(PendingBurst::new(samples, signal.len() - 1 - last))
    }
}

/// Segment one chunk.
///
/// `tail` holds the samples immediately preceding `chunk` in the stream and is
/// only used to pad the start of a burst that begins near index zero.
pub fn segment(
    chunk: &[Sample],
    params: &DetectParams,
    pending: Option<PendingBurst>,
    tail: &[Sample],
) -> Result<Segmentation, Error> {
    let signal = trim_trailing_zeros(chunk);
    let n = signal.len();
    if n == 0 {
        // Nothing but padding: no time has passed for the open burst
        return Ok(Segmentation {
            still_open: pending.is_some(),
            pending,
            ..Segmentation::default()
        });
    }
    let active = active_indices(signal, params.threshold)?;
    let mut runs = split_runs(&active, params.cutoff).into_iter().peekable();

    let mut closed = Vec::new();
    let mut unpadded = Vec::new();
    let mut settle = |ended: Padded| match ended {
        Padded::Done(burst) => closed.push(burst),
        Padded::Short(burst) => unpadded.push(burst),
    };
    let mut open = None;

    if let Some(mut burst) = pending {
        // Quiet samples between the burst's last active sample and the first one here
        let gap = burst.carryover + active.first().copied().unwrap_or(n);
        if gap > params.cutoff {
            settle(burst.pad(signal, params.slack));
        } else if let Some(run) = runs.next() {
            let quiet_tail = n - 1 - run.last;
            if runs.peek().is_none() && quiet_tail <= params.cutoff {
                burst.samples.extend_from_slice(signal);
                burst.carryover = quiet_tail;
                open = Some(burst);
            } else {
                settle(end_burst(burst.samples, signal, 0, run.last, params.slack));
            }
        } else {
            burst.samples.extend_from_slice(signal);
            burst.carryover += n;
            open = Some(burst);
        }
    }

    while let Some(run) = runs.next() {
        let start = run.first.saturating_sub(params.slack);
        // Padding we couldn't find in this chunk comes from the previous one
        let missing = (params.slack - (run.first - start)).min(tail.len());
        let mut samples = tail[tail.len() - missing..].to_vec();
        let quiet_tail = n - 1 - run.last;
        if runs.peek().is_none() && quiet_tail <= params.cutoff {
            samples.extend_from_slice(&signal[start..]);
            open = Some(PendingBurst::new(samples, quiet_tail));
        } else {
            settle(end_burst(samples, signal, start, run.last, params.slack));
        }
    }

    closed.retain(|b| !b.is_empty());
    Ok(Segmentation {
        closed,
        still_open: open.is_some(),
        pending: open,
        unpadded,
    })
}
