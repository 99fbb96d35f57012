// src/midi/loader.rs

use crate::midi::note::{ColorChangeEvent, Note, TempoEvent};
use crate::midi::timeline::Timeline;
use glam::Vec4;
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Events published to the timeline between two sync points
const PUBLISH_CHUNK: usize = 4096;

#[derive(Debug)]
pub enum LoadError {
    Io(std::io::Error),
    Parse(midly::Error),
    /// No `MThd` chunk at the start of the file
    MissingHeader,
    UnsupportedTiming,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Io(e) => write!(f, "failed to read MIDI file: {}", e),
            LoadError::Parse(e) => write!(f, "failed to parse MIDI file: {}", e),
            LoadError::MissingHeader => write!(f, "not a standard MIDI file (no MThd header)"),
            LoadError::UnsupportedTiming => write!(f, "SMPTE timecode timing is not supported"),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Io(e) => Some(e),
            LoadError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LoadError {
    fn from(value: std::io::Error) -> Self {
        LoadError::Io(value)
    }
}

impl From<midly::Error> for LoadError {
    fn from(value: midly::Error) -> Self {
        LoadError::Parse(value)
    }
}

/// One event of the merged, tick-ordered stream
#[derive(Debug, Clone, Copy, PartialEq)]
enum StreamEvent {
    NoteOn { key: u8, channel: u8, velocity: u8 },
    NoteOff { key: u8, channel: u8 },
    Tempo(u32),
    Color { channel: u8, col1: Vec4, col2: Vec4 },
    TrackEnd,
}

#[derive(Debug, Clone, Copy)]
struct TimedEvent {
    tick: u64,
    track: usize,
    event: StreamEvent,
}

/// Decode a sequencer-specific color event: `00 0F channel 00 r g b a [r g b a]`
fn decode_color_event(data: &[u8]) -> Option<(u8, Vec4, Vec4)> {
    if data.len() < 8 || data[0] != 0x00 || data[1] != 0x0F {
        return None;
    }
    let color = |bytes: &[u8]| {
        Vec4::new(
            bytes[0] as f32 / 255.0,
            bytes[1] as f32 / 255.0,
            bytes[2] as f32 / 255.0,
            bytes[3] as f32 / 255.0,
        )
    };
    let col1 = color(&data[4..8]);
    let col2 = if data.len() >= 12 { color(&data[8..12]) } else { col1 };
    Some((data[2], col1, col2))
}

fn flatten(smf: &Smf) -> Vec<TimedEvent> {
    let mut events = Vec::new();
    for (track, track_events) in smf.tracks.iter().enumerate() {
        let mut tick = 0u64;
        for event in track_events {
            tick += event.delta.as_int() as u64;
            let stream_event = match event.kind {
                TrackEventKind::Midi { channel, message } => {
                    let channel = channel.as_int();
                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            StreamEvent::NoteOn {
                                key: key.as_int(),
                                channel,
                                velocity: vel.as_int(),
                            }
                        }
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            StreamEvent::NoteOff {
                                key: key.as_int(),
                                channel,
                            }
                        }
                        _ => continue,
                    }
                }
                TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => StreamEvent::Tempo(tempo.as_int()),
                TrackEventKind::Meta(MetaMessage::SequencerSpecific(data)) => {
                    match decode_color_event(data) {
                        Some((channel, col1, col2)) => StreamEvent::Color { channel, col1, col2 },
                        None => continue,
                    }
                }
                _ => continue,
            };
            events.push(TimedEvent {
                tick,
                track,
                event: stream_event,
            });
        }
        events.push(TimedEvent {
            tick,
            track,
            event: StreamEvent::TrackEnd,
        });
    }
    // stable: events sharing a tick keep their in-track order
    events.sort_by_key(|e| e.tick);
    events
}

/// Open notes keyed by (track, channel, key), oldest first
type OpenNotes = HashMap<(usize, u8, u8), VecDeque<usize>>;

/// Publishes a merged event stream into the timeline in chunks
struct Publisher<'a> {
    timeline: &'a Timeline,
    open: OpenNotes,
}

impl<'a> Publisher<'a> {
    fn new(timeline: &'a Timeline) -> Self {
        Publisher {
            timeline,
            open: HashMap::new(),
        }
    }

    fn publish(&mut self, chunk: &[TimedEvent]) {
        {
            let mut notes = self.timeline.notes();
            for timed in chunk {
                let tick = timed.tick as f64;
                match timed.event {
                    StreamEvent::NoteOn { key, channel, velocity } => {
                        self.open
                            .entry((timed.track, channel, key))
                            .or_default()
                            .push_back(notes.len());
                        notes.push(Note::new(tick, key, channel, timed.track, velocity));
                    }
                    StreamEvent::NoteOff { key, channel } => {
                        if let Some(index) = self
                            .open
                            .get_mut(&(timed.track, channel, key))
                            .and_then(|queue| queue.pop_front())
                        {
                            notes[index].close(tick);
                        }
                    }
                    StreamEvent::TrackEnd => {
                        for ((track, _, _), queue) in self.open.iter_mut() {
                            if *track == timed.track {
                                for index in queue.drain(..) {
                                    notes[index].close(tick);
                                }
                            }
                        }
                    }
                    StreamEvent::Tempo(_) | StreamEvent::Color { .. } => {}
                }
            }
        }

        for timed in chunk {
            let pos = timed.tick as f64;
            match timed.event {
                StreamEvent::Tempo(tempo) => self.timeline.push_tempo(TempoEvent { pos, tempo }),
                StreamEvent::Color { channel, col1, col2 } => {
                    self.timeline.push_color(ColorChangeEvent {
                        pos,
                        track: timed.track,
                        channel,
                        col1,
                        col2,
                    })
                }
                StreamEvent::TrackEnd => self.timeline.track_ended(),
                _ => {}
            }
        }

        if let Some(last) = chunk.last() {
            self.timeline.mark_synced(last.tick as f64);
        }
    }
}

/// Stream an already merged event list into `timeline`
fn stream_into(timeline: &Timeline, events: &[TimedEvent]) {
    let mut publisher = Publisher::new(timeline);
    let mut start = 0;
    while start < events.len() {
        let mut end = (start + PUBLISH_CHUNK).min(events.len());
        // never split a tick across two publishes
        while end < events.len() && events[end].tick == events[end - 1].tick {
            end += 1;
        }
        publisher.publish(&events[start..end]);
        start = end;
    }
    timeline.finish();
}

/// Bytes read when looking for the header; covers the RIFF wrapper of `.rmi` files
const HEADER_SCAN: usize = 64;

/// Fields of the `MThd` chunk needed before the body is parsed
#[derive(Debug, Clone, Copy, PartialEq)]
struct HeaderInfo {
    track_count: usize,
    division: u16,
}

fn parse_header(prefix: &[u8]) -> Result<HeaderInfo, LoadError> {
    let start = prefix
        .windows(4)
        .position(|w| w == b"MThd")
        .ok_or(LoadError::MissingHeader)?;
    let chunk = prefix.get(start..start + 14).ok_or(LoadError::MissingHeader)?;
    let track_count = u16::from_be_bytes([chunk[10], chunk[11]]) as usize;
    let division = u16::from_be_bytes([chunk[12], chunk[13]]);
    if division & 0x8000 != 0 {
        return Err(LoadError::UnsupportedTiming);
    }
    Ok(HeaderInfo {
        track_count,
        division,
    })
}

fn read_header(path: &Path) -> Result<HeaderInfo, LoadError> {
    let mut prefix = Vec::with_capacity(HEADER_SCAN);
    File::open(path)?
        .take(HEADER_SCAN as u64)
        .read_to_end(&mut prefix)?;
    parse_header(&prefix)
}

/// Read, parse and stream the whole file; the timeline is finished on every path
fn load_into(path: &Path, timeline: &Timeline) -> Result<(), LoadError> {
    let result = std::fs::read(path)
        .map_err(LoadError::from)
        .and_then(|bytes| {
            let smf = Smf::parse(&bytes)?;
            if let Timing::Timecode(..) = smf.header.timing {
                return Err(LoadError::UnsupportedTiming);
            }
            Ok(flatten(&smf))
        });
    match result {
        Ok(events) => {
            log::info!("Parsed {} events", events.len());
            stream_into(timeline, &events);
            Ok(())
        }
        Err(e) => {
            timeline.finish();
            Err(e)
        }
    }
}

/// Handle to a file being streamed into a [`Timeline`]
pub struct MidiLoader {
    timeline: Arc<Timeline>,
    handle: Option<JoinHandle<()>>,
}

impl MidiLoader {
    /// Check the file header, then parse and stream the body on a background thread
    pub fn spawn(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref().to_path_buf();
        let header = read_header(&path)?;
        log::info!(
            "MIDI header: {} tracks, division {}",
            header.track_count,
            header.division
        );
        let timeline = Arc::new(Timeline::new(header.division, header.track_count));

        let producer = timeline.clone();
        let handle = thread::Builder::new()
            .name("midi-loader".to_string())
            .spawn(move || match load_into(&path, &producer) {
                Ok(()) => log::info!("Loaded {} notes", producer.notes().len()),
                Err(e) => log::error!("Failed to load {}: {}", path.display(), e),
            })?;

        Ok(MidiLoader {
            timeline,
            handle: Some(handle),
        })
    }

    pub fn timeline(&self) -> Arc<Timeline> {
        self.timeline.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }
}

impl Drop for MidiLoader {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("MIDI loader thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timed(tick: u64, track: usize, event: StreamEvent) -> TimedEvent {
        TimedEvent { tick, track, event }
    }

    #[test]
    fn test_decode_color_event() {
        let one = [0x00, 0x0F, 0x7F, 0x00, 255, 0, 0, 255];
        let (channel, col1, col2) = decode_color_event(&one).unwrap();
        assert_eq!(channel, 0x7F);
        assert_eq!(col1, Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(col1, col2);

        let two = [0x00, 0x0F, 3, 0x00, 0, 0, 0, 255, 0, 255, 0, 255];
        let (channel, _, col2) = decode_color_event(&two).unwrap();
        assert_eq!(channel, 3);
        assert_eq!(col2, Vec4::new(0.0, 1.0, 0.0, 1.0));

        assert!(decode_color_event(&[0x00, 0x0E, 0, 0, 1, 2, 3, 4]).is_none());
        assert!(decode_color_event(&[0x00, 0x0F]).is_none());
    }

    #[test]
    fn test_stream_pairs_note_offs_oldest_first() {
        let timeline = Timeline::new(480, 1);
        let on = StreamEvent::NoteOn { key: 60, channel: 0, velocity: 100 };
        let off = StreamEvent::NoteOff { key: 60, channel: 0 };
        let events = [
            timed(0, 0, on),
            timed(10, 0, on),
            timed(20, 0, off),
            timed(30, 0, off),
            timed(40, 0, StreamEvent::TrackEnd),
        ];
        stream_into(&timeline, &events);

        let notes = timeline.notes();
        assert_eq!(notes.len(), 2);
        assert_eq!((notes[0].start, notes[0].end), (0.0, 20.0));
        assert_eq!((notes[1].start, notes[1].end), (10.0, 30.0));
        assert!(notes.iter().all(|n| n.has_ended));
        assert_eq!(timeline.unended_tracks(), 0);
    }

    #[test]
    fn test_track_end_closes_dangling_notes() {
        let timeline = Timeline::new(480, 2);
        let events = [
            timed(0, 0, StreamEvent::NoteOn { key: 1, channel: 0, velocity: 1 }),
            timed(0, 1, StreamEvent::NoteOn { key: 2, channel: 0, velocity: 1 }),
            timed(50, 0, StreamEvent::TrackEnd),
            timed(90, 1, StreamEvent::TrackEnd),
        ];
        stream_into(&timeline, &events);

        let notes = timeline.notes();
        assert_eq!(notes[0].end, 50.0);
        assert_eq!(notes[1].end, 90.0);
        assert_eq!(timeline.max_track_time(), 90.0);
    }

    #[test]
    fn test_tempo_and_color_events_are_published() {
        let timeline = Timeline::new(96, 1);
        let events = [
            timed(0, 0, StreamEvent::Tempo(400_000)),
            timed(5, 0, StreamEvent::Color { channel: 0x7F, col1: Vec4::ONE, col2: Vec4::ZERO }),
            timed(8, 0, StreamEvent::TrackEnd),
        ];
        stream_into(&timeline, &events);

        assert_eq!(*timeline.tempo_events(), vec![TempoEvent { pos: 0.0, tempo: 400_000 }]);
        let colors = timeline.color_events();
        assert_eq!(colors.len(), 1);
        assert_eq!(colors[0].pos, 5.0);
        assert_eq!(colors[0].channel, 0x7F);
    }

    #[test]
    fn test_flatten_merges_tracks_by_tick() {
        use midly::{Format, Header, TrackEvent};

        let note_on = |delta: u32, key: u8| TrackEvent {
            delta: delta.into(),
            kind: TrackEventKind::Midi {
                channel: 0.into(),
                message: MidiMessage::NoteOn { key: key.into(), vel: 64.into() },
            },
        };
        let mut smf = Smf::new(Header::new(Format::Parallel, Timing::Metrical(480.into())));
        smf.tracks.push(vec![note_on(0, 10), note_on(100, 11)]);
        smf.tracks.push(vec![note_on(50, 20)]);

        let keys: Vec<(u64, StreamEvent)> = flatten(&smf)
            .into_iter()
            .map(|e| (e.tick, e.event))
            .collect();
        assert_eq!(keys[0], (0, StreamEvent::NoteOn { key: 10, channel: 0, velocity: 64 }));
        assert_eq!(keys[1], (50, StreamEvent::NoteOn { key: 20, channel: 0, velocity: 64 }));
        assert_eq!(keys[2], (50, StreamEvent::TrackEnd));
        assert_eq!(keys[3], (100, StreamEvent::NoteOn { key: 11, channel: 0, velocity: 64 }));
        assert_eq!(keys[4], (100, StreamEvent::TrackEnd));
    }

    fn temp_file(name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("notefall-{}-{}.mid", name, std::process::id()));
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn header_bytes(track_count: u16, division: u16) -> Vec<u8> {
        let mut bytes = b"MThd".to_vec();
        bytes.extend_from_slice(&6u32.to_be_bytes());
        bytes.extend_from_slice(&1u16.to_be_bytes());
        bytes.extend_from_slice(&track_count.to_be_bytes());
        bytes.extend_from_slice(&division.to_be_bytes());
        bytes
    }

    fn wait_until_finished(loader: &MidiLoader) {
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(60);
        while !loader.is_finished() {
            assert!(std::time::Instant::now() < deadline, "loader never finished");
            thread::sleep(std::time::Duration::from_millis(5));
        }
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header(&header_bytes(3, 480)).unwrap(),
            HeaderInfo { track_count: 3, division: 480 }
        );

        let mut riff = b"RIFF\0\0\0\0RMIDdata\0\0\0\0".to_vec();
        riff.extend(header_bytes(2, 96));
        assert_eq!(parse_header(&riff).unwrap().division, 96);

        assert!(matches!(
            parse_header(&header_bytes(1, 0xE728)),
            Err(LoadError::UnsupportedTiming)
        ));
        assert!(matches!(parse_header(b"RIFF"), Err(LoadError::MissingHeader)));
        assert!(matches!(parse_header(&header_bytes(1, 480)[..12]), Err(LoadError::MissingHeader)));
    }

    #[test]
    fn test_spawn_rejects_bad_header_immediately() {
        let path = temp_file("timecode", &header_bytes(1, 0xE728));
        assert!(matches!(MidiLoader::spawn(&path), Err(LoadError::UnsupportedTiming)));
        let _ = std::fs::remove_file(&path);

        let missing = std::env::temp_dir().join("notefall-does-not-exist.mid");
        assert!(matches!(MidiLoader::spawn(&missing), Err(LoadError::Io(_))));
    }

    #[test]
    fn test_unreadable_body_still_finishes_the_timeline() {
        let mut bytes = header_bytes(2, 480);
        bytes.extend_from_slice(b"MTrk\xFF\xFF\xFF\xFFgarbage");
        let path = temp_file("corrupt", &bytes);

        let loader = MidiLoader::spawn(&path).unwrap();
        let timeline = loader.timeline();
        assert_eq!(timeline.division(), 480);
        assert_eq!(timeline.track_colors().read().len(), 2);

        wait_until_finished(&loader);
        assert!(timeline.notes().is_empty());
        assert_eq!(timeline.unended_tracks(), 0);
        assert!(timeline.wait_for_sync(1e12, std::time::Duration::ZERO));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_spawn_returns_before_a_large_file_is_loaded() {
        use midly::{Format, Header, TrackEvent};

        let event = |delta: u32, message: MidiMessage| TrackEvent {
            delta: delta.into(),
            kind: TrackEventKind::Midi { channel: 0.into(), message },
        };
        let tracks = 8;
        let notes_per_track = 20_000u32;
        let mut smf = Smf::new(Header::new(Format::Parallel, Timing::Metrical(960.into())));
        for _ in 0..tracks {
            let mut track = Vec::new();
            for i in 0..notes_per_track {
                let key = (i % 88 + 21) as u8;
                track.push(event(10, MidiMessage::NoteOn { key: key.into(), vel: 90.into() }));
                track.push(event(5, MidiMessage::NoteOff { key: key.into(), vel: 0.into() }));
            }
            track.push(TrackEvent {
                delta: 0.into(),
                kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
            });
            smf.tracks.push(track);
        }
        let path = std::env::temp_dir().join(format!("notefall-large-{}.mid", std::process::id()));
        smf.save(&path).unwrap();

        let started = std::time::Instant::now();
        let loader = MidiLoader::spawn(&path).unwrap();
        let spawned = started.elapsed();
        let timeline = loader.timeline();
        assert_eq!(timeline.division(), 960);

        wait_until_finished(&loader);
        let loaded = started.elapsed();
        assert!(spawned < loaded);
        assert_eq!(timeline.notes().len(), (tracks * notes_per_track) as usize);
        assert!(timeline.notes().iter().all(|n| n.has_ended));
        assert_eq!(timeline.unended_tracks(), 0);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_load_error_exposes_its_cause() {
        use std::error::Error;

        let io = LoadError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(io.source().map(|e| e.to_string()), Some("gone".to_string()));

        let parse = match Smf::parse(b"not midi") {
            Err(e) => LoadError::from(e),
            Ok(_) => panic!("garbage parsed as MIDI"),
        };
        assert!(parse.source().is_some());

        assert!(LoadError::UnsupportedTiming.source().is_none());
        assert!(LoadError::MissingHeader.source().is_none());
    }
}
