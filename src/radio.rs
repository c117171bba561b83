//! The radio as seen by the pipeline: something that hands out chunks of IQ
//! samples and accepts waveforms to transmit.

use std::{collections::VecDeque, f64::consts::TAU, thread, time::Duration};

use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};
use tracing::debug;

use crate::{
    chunk::SampleChunk,
    complex::Sample,
    config::DummyConfig,
    error::{Error, Result},
};

/// Zero samples sent after every waveform to flush the transmit chain
pub const FLUSH_MARKER_LEN: usize = 10;

pub trait Radio {
    /// Next chunk of samples. May block up to the device's receive timeout and
    /// may be zero padded at the end.
    fn receive_chunk(&mut self) -> Result<SampleChunk>;

    /// Send a waveform, followed by the flush marker
    fn transmit(&mut self, waveform: &[Sample]) -> Result<()>;
}

/// Synthetic radio: periodic tone bursts over complex Gaussian noise
pub struct DummyRadio {
    settings: DummyConfig,
    capacity: usize,
    sample_rate: f64,
    rng: StdRng,
    noise: Normal<f32>,
    /// Samples generated so far
    position: u64,
    transmitted: u64,
}

impl DummyRadio {
    pub fn new(settings: DummyConfig, capacity: usize, sample_rate: f64) -> Result<Self> {
        settings.validate()?;
        let noise = Normal::new(0.0, settings.noise_std)
            .map_err(|e| Error::Configuration(format!("noise_std: {e}")))?;
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            settings,
            capacity,
            sample_rate,
            rng,
            noise,
            position: 0,
            transmitted: 0,
        })
    }

    /// Samples sent through `transmit`, flush markers included
    pub fn transmitted(&self) -> u64 {
        self.transmitted
    }

    fn in_burst(&self, t: u64) -> bool {
        self.settings.burst_period > 0 && t % self.settings.burst_period < self.settings.burst_len
    }
}

impl Radio for DummyRadio {
    fn receive_chunk(&mut self) -> Result<SampleChunk> {
        let valid = self.capacity.saturating_sub(self.settings.padding);
        let mut samples = Vec::with_capacity(self.capacity);
        for _ in 0..valid {
            let t = self.position;
            let mut s = Sample::new(
                self.noise.sample(&mut self.rng),
                self.noise.sample(&mut self.rng),
            );
            if self.in_burst(t) {
                let phase = (TAU * self.settings.tone_hz * t as f64 / self.sample_rate) % TAU;
                s = s + Sample::from_polar(self.settings.burst_amplitude, phase as f32);
            }
            samples.push(s);
            self.position += 1;
        }
        samples.resize(self.capacity, Sample::default());
        if self.settings.realtime {
            thread::sleep(Duration::from_secs_f64(valid as f64 / self.sample_rate));
        }
        Ok(SampleChunk::new(samples))
    }

    fn transmit(&mut self, waveform: &[Sample]) -> Result<()> {
        self.transmitted += (waveform.len() + FLUSH_MARKER_LEN) as u64;
        debug!(samples = waveform.len(), "transmitted waveform");
        Ok(())
    }
}

/// Plays back a fixed list of chunks, then reports the source exhausted
#[derive(Default)]
pub struct ScriptedRadio {
    chunks: VecDeque<SampleChunk>,
    sent: Vec<Vec<Sample>>,
}

impl ScriptedRadio {
    pub fn new(chunks: impl IntoIterator<Item = SampleChunk>) -> Self {
        Self {
            chunks: chunks.into_iter().collect(),
            sent: Vec::new(),
        }
    }

    /// Everything transmitted, each with its flush marker
    pub fn sent(&self) -> &[Vec<Sample>] {
        &self.sent
    }
}

impl Radio for ScriptedRadio {
    fn receive_chunk(&mut self) -> Result<SampleChunk> {
        self.chunks.pop_front().ok_or(Error::SourceExhausted)
    }

    fn transmit(&mut self, waveform: &[Sample]) -> Result<()> {
        let mut frame = waveform.to_vec();
        frame.resize(waveform.len() + FLUSH_MARKER_LEN, Sample::default());
        self.sent.push(frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assembler::BurstAssembler, segment::DetectParams};

    fn settings() -> DummyConfig {
        DummyConfig {
            burst_len: 200,
            burst_period: 2000,
            burst_amplitude: 1.0,
            noise_std: 0.01,
            tone_hz: 1e3,
            padding: 24,
            seed: Some(7),
            realtime: false,
        }
    }

    #[test]
    fn test_dummy_chunk_shape() {
        let mut radio = DummyRadio::new(settings(), 1024, 1e6).unwrap();
        let chunk = radio.receive_chunk().unwrap();
        assert_eq!(chunk.len(), 1024);
        assert!(chunk.samples()[1000..].iter().all(|s| s.is_zero()));
        assert_eq!(chunk.trimmed().len(), 1000);
    }

    #[test]
    fn test_dummy_seeded_is_deterministic() {
        let mut a = DummyRadio::new(settings(), 256, 1e6).unwrap();
        let mut b = DummyRadio::new(settings(), 256, 1e6).unwrap();
        assert_eq!(a.receive_chunk().unwrap(), b.receive_chunk().unwrap());
    }

    #[test]
    fn test_dummy_bursts_are_detectable() {
        let mut radio = DummyRadio::new(settings(), 1024, 1e6).unwrap();
        let mut assembler = BurstAssembler::new(DetectParams::new(0.5, 20, 0).unwrap());
        let mut bursts = Vec::new();
        for _ in 0..10 {
            bursts.extend(assembler.on_chunk(&radio.receive_chunk().unwrap()).unwrap());
        }
        // 10 chunks of 1000 real samples cover five burst periods
        assert_eq!(bursts.len(), 5);
        assert!(bursts.iter().all(|b| b.len() == 200));
    }

    #[test]
    fn test_dummy_bad_noise() {
        let mut bad = settings();
        bad.noise_std = -1.0;
        assert!(matches!(
            DummyRadio::new(bad.clone(), 16, 1e6),
            Err(Error::Configuration(_))
        ));
        bad.noise_std = f32::INFINITY;
        assert!(DummyRadio::new(bad, 16, 1e6).is_err());
    }

    #[test]
    fn test_dummy_transmit_counts_flush_marker() {
        let mut radio = DummyRadio::new(settings(), 16, 1e6).unwrap();
        radio.transmit(&[Sample::new(1.0, 0.0); 5]).unwrap();
        assert_eq!(radio.transmitted(), 5 + FLUSH_MARKER_LEN as u64);
    }

    #[test]
    fn test_scripted() {
        let mut radio = ScriptedRadio::new(vec![SampleChunk::new(vec![Sample::new(1.0, 1.0)])]);
        assert_eq!(radio.receive_chunk().unwrap().len(), 1);
        assert!(matches!(radio.receive_chunk(), Err(Error::SourceExhausted)));
        radio.transmit(&[Sample::new(1.0, 0.0)]).unwrap();
        assert_eq!(radio.sent()[0].len(), 1 + FLUSH_MARKER_LEN);
    }
}
