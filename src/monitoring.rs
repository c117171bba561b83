//! In this module, we implement the monitoring side of the pipeline: periodic
//! liveness messages from the stages and the counters each stage hands back
//! to the controller when it exits.

use tracing::info;

/// Logs a liveness message every `every` beats
pub struct Heartbeat {
    stage: &'static str,
    every: u64,
    beats: u64,
}

impl Heartbeat {
    pub fn new(stage: &'static str, every: u64) -> Self {
        Self {
            stage,
            every,
            beats: 0,
        }
    }

    /// Returns true when this beat was reported
    pub fn beat(&mut self) -> bool {
        self.beats += 1;
        if self.every > 0 && self.beats % self.every == 0 {
            info!(stage = self.stage, beats = self.beats, "still alive");
            return true;
        }
        false
    }

    pub fn beats(&self) -> u64 {
        self.beats
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CaptureReport {
    /// Chunks pushed onto the stream queue
    pub chunks: u64,
    /// Times the stream queue was full when we tried to push
    pub stalls: u64,
    pub receive_errors: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DetectReport {
    pub chunks: u64,
    pub bursts: u64,
    /// An open burst was force-closed at end of stream
    pub flushed: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExfilReport {
    pub saved: u64,
    pub failed: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub capture: CaptureReport,
    pub detect: DetectReport,
    pub exfil: ExfilReport,
}

impl RunReport {
    pub fn log(&self) {
        info!(
            chunks = self.capture.chunks,
            stalls = self.capture.stalls,
            receive_errors = self.capture.receive_errors,
            bursts = self.detect.bursts,
            saved = self.exfil.saved,
            failed = self.exfil.failed,
            "run finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat() {
        let mut hb = Heartbeat::new("test", 3);
        let reported: Vec<bool> = (0..7).map(|_| hb.beat()).collect();
        assert_eq!(reported, [false, false, true, false, false, true, false]);
        assert_eq!(hb.beats(), 7);
    }

    #[test]
    fn test_heartbeat_disabled() {
        let mut hb = Heartbeat::new("test", 0);
        assert!((0..10).all(|_| !hb.beat()));
    }
}
