//! The detect stage: turns the chunk stream into batches of completed bursts

use crossbeam_channel::{Receiver, Sender};
use tracing::{info, warn};

use crate::{
    assembler::BurstAssembler,
    chunk::SampleChunk,
    error::{Error, Result},
    message::Message,
    monitoring::DetectReport,
    segment::CompletedBurst,
};

pub type Batch = Vec<CompletedBurst>;

/// Run the assembler over every chunk until end of stream, then flush whatever
/// burst is still open and pass the end of stream on.
pub fn detect_bursts(
    mut assembler: BurstAssembler,
    stream: Receiver<Message<SampleChunk>>,
    packets: Sender<Message<Batch>>,
) -> Result<DetectReport> {
    let mut report = DetectReport::default();
    let send = |msg| packets.send(msg).map_err(|_| Error::Disconnected("exfil"));
    loop {
        let chunk = match stream.recv() {
            Ok(Message::Data(chunk)) => chunk,
            Ok(Message::EndOfStream) => break,
            Err(_) => {
                warn!("stream queue closed without end of stream");
                break;
            }
        };
        let bursts = assembler.on_chunk(&chunk)?;
        report.chunks += 1;
        if !bursts.is_empty() {
            report.bursts += bursts.len() as u64;
            send(Message::Data(bursts))?;
        }
    }
    let flushed = assembler.finish();
    if !flushed.is_empty() {
        info!(bursts = flushed.len(), "flushed open bursts at end of stream");
        report.bursts += flushed.len() as u64;
        report.flushed = true;
        send(Message::Data(flushed))?;
    }
    send(Message::EndOfStream)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::bounded;

    use super::*;
    use crate::{complex::Sample, segment::DetectParams};

    const HIGH: Sample = Sample { re: 1.0, im: 0.0 };
    const LOW: Sample = Sample { re: 0.0, im: 0.01 };

    fn assembler() -> BurstAssembler {
        BurstAssembler::new(DetectParams::new(0.5, 3, 0).unwrap())
    }

    fn chunk(samples: &[Sample]) -> Message<SampleChunk> {
        Message::Data(SampleChunk::new(samples.to_vec()))
    }

    #[test]
    fn test_batches_and_flush() {
        let (stream_tx, stream_rx) = bounded(8);
        let (packet_tx, packet_rx) = bounded(8);
        // Two bursts closing in the first chunk, one left open by the second
        stream_tx
            .send(chunk(&[HIGH, LOW, LOW, LOW, LOW, HIGH, HIGH, LOW, LOW, LOW, LOW]))
            .unwrap();
        stream_tx.send(chunk(&[LOW, HIGH, HIGH, HIGH])).unwrap();
        stream_tx.send(Message::EndOfStream).unwrap();

        let report = detect_bursts(assembler(), stream_rx, packet_tx).unwrap();
        assert_eq!(
            report,
            DetectReport {
                chunks: 2,
                bursts: 3,
                flushed: true
            }
        );

        let msgs: Vec<_> = packet_rx.try_iter().collect();
        assert_eq!(msgs.len(), 3);
        match &msgs[0] {
            Message::Data(batch) => {
                assert_eq!(batch.len(), 2);
                assert_eq!(batch[0].len(), 1);
                assert_eq!(batch[1].len(), 2);
            }
            Message::EndOfStream => panic!("expected a batch"),
        }
        match &msgs[1] {
            Message::Data(batch) => assert_eq!(batch[0].samples(), &[HIGH; 3]),
            Message::EndOfStream => panic!("expected the flushed burst"),
        }
        assert!(msgs[2].is_end());
    }

    #[test]
    fn test_malformed_chunk_is_fatal() {
        let (stream_tx, stream_rx) = bounded(8);
        let (packet_tx, packet_rx) = bounded(8);
        stream_tx.send(chunk(&[HIGH, HIGH])).unwrap();
        stream_tx
            .send(chunk(&[Sample::new(f32::NAN, 0.0)]))
            .unwrap();
        let result = detect_bursts(assembler(), stream_rx, packet_tx);
        assert!(matches!(result, Err(Error::MalformedChunk(_))));
        // No end of stream; the sink sees the queue close instead
        assert!(packet_rx.try_iter().all(|m| !m.is_end()));
    }

    #[test]
    fn test_closed_stream_still_flushes() {
        let (stream_tx, stream_rx) = bounded(8);
        let (packet_tx, packet_rx) = bounded(8);
        stream_tx.send(chunk(&[HIGH, HIGH])).unwrap();
        drop(stream_tx);
        let report = detect_bursts(assembler(), stream_rx, packet_tx).unwrap();
        assert!(report.flushed);
        assert_eq!(packet_rx.try_iter().count(), 2);
    }
}
