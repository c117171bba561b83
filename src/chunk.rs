//! Chunks of IQ samples as they come off the radio

use crate::{complex::Sample, error::Error};

/// One read worth of samples from the radio. The radio hands out fixed
/// capacity buffers, so the end may be padded with exact zeros.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampleChunk {
    samples: Vec<Sample>,
}

/// Strip the trailing run of exact-zero samples, keeping interior zeros
pub fn trim_trailing_zeros(samples: &[Sample]) -> &[Sample] {
    let end = samples
        .iter()
        .rposition(|s| !s.is_zero())
        .map_or(0, |i| i + 1);
    &samples[..end]
}

impl SampleChunk {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    /// Build a chunk from `[re, im, re, im, ...]` as radios stream fc32 data
    pub fn from_interleaved(raw: &[f32]) -> Result<Self, Error> {
        if raw.len() % 2 != 0 {
            return Err(Error::MalformedChunk(format!(
                "interleaved buffer has odd length {}",
                raw.len()
            )));
        }
        Ok(Self {
            samples: raw
                .chunks_exact(2)
                .map(|pair| Sample::new(pair[0], pair[1]))
                .collect(),
        })
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// The samples with hardware padding removed
    pub fn trimmed(&self) -> &[Sample] {
        trim_trailing_zeros(&self.samples)
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

impl From<Vec<Sample>> for SampleChunk {
    fn from(samples: Vec<Sample>) -> Self {
        Self::new(samples)
    }
}

/// Flatten samples back into `[re, im, ...]` for storage
pub fn interleave(samples: &[Sample]) -> Vec<f32> {
    samples.iter().flat_map(|s| [s.re, s.im]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(re: f32) -> Sample {
        Sample::new(re, 0.0)
    }

    #[test]
    fn test_trim_keeps_interior_zeros() {
        let chunk = SampleChunk::new(vec![s(1.0), s(0.0), s(2.0), s(0.0), s(0.0)]);
        assert_eq!(chunk.trimmed(), &[s(1.0), s(0.0), s(2.0)]);
    }

    #[test]
    fn test_trim_all_zero() {
        let chunk = SampleChunk::new(vec![s(0.0); 16]);
        assert!(chunk.trimmed().is_empty());
    }

    #[test]
    fn test_trim_imaginary_only_is_not_padding() {
        let chunk = SampleChunk::new(vec![s(1.0), Sample::new(0.0, 0.5), s(0.0)]);
        assert_eq!(chunk.trimmed().len(), 2);
    }

    #[test]
    fn test_interleaved() {
        let chunk = SampleChunk::from_interleaved(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(chunk.samples(), &[Sample::new(1.0, 2.0), Sample::new(3.0, 4.0)]);
        assert_eq!(interleave(chunk.samples()), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_interleaved_odd_length_is_malformed() {
        assert!(matches!(
            SampleChunk::from_interleaved(&[1.0, 2.0, 3.0]),
            Err(Error::MalformedChunk(_))
        ));
    }
}
