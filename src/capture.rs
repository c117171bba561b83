//! This module contains all the capture logic

// The capture thread will do one thing, as fast as possible:
// pull chunks off the radio and push them onto the stream queue.
// If the queue is full we wait for the detector rather than drop data.

use crossbeam_channel::{Sender, TrySendError};
use tracing::{debug, info, warn};

use crate::{
    chunk::SampleChunk,
    error::{Error, Result},
    message::Message,
    monitoring::{CaptureReport, Heartbeat},
    pipeline::StopSignal,
    radio::Radio,
};

pub fn capture_chunks<R: Radio>(
    mut radio: R,
    stream: Sender<Message<SampleChunk>>,
    stop: StopSignal,
    max_loops: Option<u64>,
    heartbeat_every: u64,
) -> Result<CaptureReport> {
    let mut report = CaptureReport::default();
    let mut heartbeat = Heartbeat::new("capture", heartbeat_every);
    while !stop.is_stopped() {
        if max_loops.map_or(false, |max| report.chunks >= max) {
            info!(chunks = report.chunks, "reached max loops");
            break;
        }
        let chunk = match radio.receive_chunk() {
            Ok(chunk) => chunk,
            Err(Error::SourceExhausted) => {
                info!(chunks = report.chunks, "radio source exhausted");
                break;
            }
            Err(e) => {
                // Keep truckin
                warn!(error = %e, "failed to receive chunk");
                report.receive_errors += 1;
                continue;
            }
        };
        match stream.try_send(Message::Data(chunk)) {
            Ok(()) => {}
            Err(TrySendError::Full(msg)) => {
                report.stalls += 1;
                debug!("stream queue full, waiting on detector");
                stream
                    .send(msg)
                    .map_err(|_| Error::Disconnected("detect"))?;
            }
            Err(TrySendError::Disconnected(_)) => return Err(Error::Disconnected("detect")),
        }
        report.chunks += 1;
        heartbeat.beat();
    }
    stream
        .send(Message::EndOfStream)
        .map_err(|_| Error::Disconnected("detect"))?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use crossbeam_channel::bounded;

    use super::*;
    use crate::{complex::Sample, radio::ScriptedRadio};

    fn numbered(n: usize) -> Vec<SampleChunk> {
        (0..n)
            .map(|i| SampleChunk::new(vec![Sample::new(i as f32, 0.0); 4]))
            .collect()
    }

    #[test]
    fn test_backpressure_blocks_without_dropping() {
        let (tx, rx) = bounded(1);
        let radio = ScriptedRadio::new(numbered(5));
        let handle =
            thread::spawn(move || capture_chunks(radio, tx, StopSignal::new(), None, 0));

        // Nobody is reading, so capture has to sit on the second chunk
        thread::sleep(Duration::from_millis(100));
        assert!(!handle.is_finished());
        assert_eq!(rx.len(), 1);

        let received: Vec<_> = rx.iter().take(6).collect();
        let report = handle.join().unwrap().unwrap();
        assert_eq!(report.chunks, 5);
        assert!(report.stalls >= 1);
        for (i, msg) in received[..5].iter().enumerate() {
            match msg {
                Message::Data(chunk) => assert_eq!(chunk.samples()[0].re, i as f32),
                Message::EndOfStream => panic!("early end of stream"),
            }
        }
        assert!(received[5].is_end());
    }

    #[test]
    fn test_max_loops() {
        let (tx, rx) = bounded(16);
        let report =
            capture_chunks(ScriptedRadio::new(numbered(10)), tx, StopSignal::new(), Some(3), 0)
                .unwrap();
        assert_eq!(report.chunks, 3);
        let msgs: Vec<_> = rx.try_iter().collect();
        assert_eq!(msgs.len(), 4);
        assert!(msgs[3].is_end());
    }

    #[test]
    fn test_stop_sends_end_of_stream() {
        let (tx, rx) = bounded(16);
        let stop = StopSignal::new();
        stop.stop();
        let report = capture_chunks(ScriptedRadio::new(numbered(10)), tx, stop, None, 0).unwrap();
        assert_eq!(report.chunks, 0);
        assert_eq!(rx.try_recv().unwrap(), Message::EndOfStream);
    }

    struct FlakyRadio {
        calls: u32,
    }

    impl Radio for FlakyRadio {
        fn receive_chunk(&mut self) -> Result<SampleChunk> {
            self.calls += 1;
            match self.calls {
                1 => Err(Error::Radio("overflow".to_owned())),
                2 => Ok(SampleChunk::new(vec![Sample::new(1.0, 0.0)])),
                _ => Err(Error::SourceExhausted),
            }
        }

        fn transmit(&mut self, _waveform: &[Sample]) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_radio_errors_are_skipped() {
        let (tx, _rx) = bounded(16);
        let report =
            capture_chunks(FlakyRadio { calls: 0 }, tx, StopSignal::new(), None, 0).unwrap();
        assert_eq!(report.receive_errors, 1);
        assert_eq!(report.chunks, 1);
    }

    #[test]
    fn test_detector_gone() {
        let (tx, rx) = bounded(16);
        drop(rx);
        let result = capture_chunks(ScriptedRadio::new(numbered(2)), tx, StopSignal::new(), None, 0);
        assert!(matches!(result, Err(Error::Disconnected("detect"))));
    }
}
