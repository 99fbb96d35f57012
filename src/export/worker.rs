// src/export/worker.rs

use crate::export::{ExportError, FrameSink};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::thread::JoinHandle;

/// Hands frames to a writer thread with at most one write in flight.
///
/// A finished write gives its buffer back, so the render thread cycles
/// between two host buffers.
pub struct FrameExporter {
    frames: Option<Sender<Vec<u8>>>,
    written: Receiver<Result<Vec<u8>, ExportError>>,
    handle: Option<JoinHandle<Result<(), ExportError>>>,
    in_flight: bool,
    spare: Option<Vec<u8>>,
    submitted: u64,
}

impl FrameExporter {
    pub fn start(mut sink: Box<dyn FrameSink>) -> Result<Self, ExportError> {
        let (frame_tx, frame_rx) = bounded::<Vec<u8>>(1);
        let (written_tx, written_rx) = bounded(1);

        let handle = std::thread::Builder::new()
            .name("frame-export".to_string())
            .spawn(move || {
                for frame in frame_rx {
                    let result = sink.write_frame(&frame).map(|()| frame);
                    if written_tx.send(result).is_err() {
                        break;
                    }
                }
                sink.finish()
            })?;

        Ok(FrameExporter {
            frames: Some(frame_tx),
            written: written_rx,
            handle: Some(handle),
            in_flight: false,
            spare: None,
            submitted: 0,
        })
    }

    /// A buffer to read the next frame into, recycled when possible
    pub fn take_buffer(&mut self) -> Vec<u8> {
        self.spare.take().unwrap_or_default()
    }

    pub fn frames_submitted(&self) -> u64 {
        self.submitted
    }

    /// Block until the outstanding write, if any, has completed
    pub fn wait_idle(&mut self) -> Result<(), ExportError> {
        if !self.in_flight {
            return Ok(());
        }
        self.in_flight = false;
        match self.written.recv() {
            Ok(Ok(buffer)) => {
                self.spare = Some(buffer);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ExportError::WorkerGone),
        }
    }

    /// Queue `frame` once the previous write has finished
    pub fn submit(&mut self, frame: Vec<u8>) -> Result<(), ExportError> {
        self.wait_idle()?;
        let frames = self.frames.as_ref().ok_or(ExportError::WorkerGone)?;
        frames.send(frame).map_err(|_| ExportError::WorkerGone)?;
        self.in_flight = true;
        self.submitted += 1;
        Ok(())
    }

    /// Await the last write, then close the sink
    pub fn finish(mut self) -> Result<(), ExportError> {
        let pending = self.wait_idle();
        drop(self.frames.take());
        let closed = match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| ExportError::WorkerGone)?,
            None => Ok(()),
        };
        pending.and(closed)
    }
}

impl Drop for FrameExporter {
    fn drop(&mut self) {
        drop(self.frames.take());
        if let Some(handle) = self.handle.take() {
            if let Ok(Err(e)) = handle.join() {
                log::error!("Export sink failed to close: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Submitted(u8),
        Written(u8),
        Finished,
    }

    struct SlowSink {
        events: Arc<Mutex<Vec<Event>>>,
        fail_on: Option<u8>,
    }

    impl FrameSink for SlowSink {
        fn write_frame(&mut self, frame: &[u8]) -> Result<(), ExportError> {
            std::thread::sleep(Duration::from_millis(10));
            if Some(frame[0]) == self.fail_on {
                return Err(ExportError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "closed",
                )));
            }
            self.events.lock().push(Event::Written(frame[0]));
            Ok(())
        }

        fn finish(&mut self) -> Result<(), ExportError> {
            self.events.lock().push(Event::Finished);
            Ok(())
        }
    }

    fn exporter(fail_on: Option<u8>) -> (FrameExporter, Arc<Mutex<Vec<Event>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = SlowSink {
            events: Arc::clone(&events),
            fail_on,
        };
        (FrameExporter::start(Box::new(sink)).unwrap(), events)
    }

    fn position(events: &[Event], event: &Event) -> usize {
        events.iter().position(|e| e == event).unwrap()
    }

    #[test]
    fn test_one_write_in_flight_in_order() {
        let (mut exporter, events) = exporter(None);
        for id in 0..5u8 {
            exporter.submit(vec![id; 4]).unwrap();
            events.lock().push(Event::Submitted(id));
        }
        exporter.finish().unwrap();

        let events = events.lock().clone();
        for id in 1..5u8 {
            // a frame is only accepted after the previous one was written
            assert!(position(&events, &Event::Written(id - 1)) < position(&events, &Event::Submitted(id)));
            assert!(position(&events, &Event::Written(id - 1)) < position(&events, &Event::Written(id)));
        }
        assert_eq!(events.last(), Some(&Event::Finished));
    }

    #[test]
    fn test_buffers_are_recycled() {
        let (mut exporter, _events) = exporter(None);
        assert!(exporter.take_buffer().is_empty());

        exporter.submit(vec![7; 64]).unwrap();
        exporter.wait_idle().unwrap();
        let recycled = exporter.take_buffer();
        assert_eq!(recycled.len(), 64);
        assert_eq!(recycled[0], 7);
        exporter.finish().unwrap();
    }

    #[test]
    fn test_write_failure_surfaces_on_next_submit() {
        let (mut exporter, _events) = exporter(Some(1));
        exporter.submit(vec![0; 4]).unwrap();
        exporter.submit(vec![1; 4]).unwrap();
        assert!(matches!(exporter.submit(vec![2; 4]), Err(ExportError::Io(_))));
        assert_eq!(exporter.frames_submitted(), 2);
    }

    #[test]
    fn test_finish_reports_pending_failure() {
        let (mut exporter, events) = exporter(Some(0));
        exporter.submit(vec![0; 4]).unwrap();
        assert!(exporter.finish().is_err());
        // the sink is still closed
        assert_eq!(events.lock().last(), Some(&Event::Finished));
    }
}
