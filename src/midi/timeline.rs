// src/midi/timeline.rs

use crate::midi::note::{ColorChangeEvent, Note, TempoEvent, TrackColors};
use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Shared sequences written by the loader and read by the render thread.
///
/// Every sequence is append-only in start order. Consumers keep their own
/// index into the tempo and color sequences instead of popping them, so the
/// producer never sees its data move under it.
pub struct Timeline {
    division: u16,
    notes: Mutex<Vec<Note>>,
    tempo_events: Mutex<Vec<TempoEvent>>,
    color_events: Mutex<Vec<ColorChangeEvent>>,
    track_colors: RwLock<Vec<TrackColors>>,
    unended_tracks: AtomicUsize,
    sync: Mutex<SyncState>,
    synced: Condvar,
}

#[derive(Debug, Clone, Copy)]
struct SyncState {
    /// Every event before this tick has been published
    synced_to: f64,
    /// Last tick of the longest track seen so far
    max_track_time: f64,
}

impl Timeline {
    pub fn new(division: u16, track_count: usize) -> Self {
        Timeline {
            division,
            notes: Mutex::new(Vec::new()),
            tempo_events: Mutex::new(Vec::new()),
            color_events: Mutex::new(Vec::new()),
            track_colors: RwLock::new(
                (0..track_count).map(TrackColors::default_for_track).collect(),
            ),
            unended_tracks: AtomicUsize::new(track_count),
            sync: Mutex::new(SyncState {
                synced_to: f64::NEG_INFINITY,
                max_track_time: 0.0,
            }),
            synced: Condvar::new(),
        }
    }

    /// Ticks per quarter note
    pub fn division(&self) -> u16 {
        self.division
    }

    pub fn notes(&self) -> MutexGuard<'_, Vec<Note>> {
        self.notes.lock()
    }

    pub fn tempo_events(&self) -> MutexGuard<'_, Vec<TempoEvent>> {
        self.tempo_events.lock()
    }

    pub fn color_events(&self) -> MutexGuard<'_, Vec<ColorChangeEvent>> {
        self.color_events.lock()
    }

    pub fn track_colors(&self) -> &RwLock<Vec<TrackColors>> {
        &self.track_colors
    }

    pub fn push_tempo(&self, event: TempoEvent) {
        self.tempo_events.lock().push(event);
    }

    pub fn push_color(&self, event: ColorChangeEvent) {
        self.color_events.lock().push(event);
    }

    /// Put every track back on its default palette
    pub fn reset_track_colors(&self) {
        let mut colors = self.track_colors.write();
        for (track, entry) in colors.iter_mut().enumerate() {
            *entry = TrackColors::default_for_track(track);
        }
    }

    pub fn unended_tracks(&self) -> usize {
        self.unended_tracks.load(Ordering::Acquire)
    }

    pub fn track_ended(&self) {
        let _ = self
            .unended_tracks
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        // waiters check the counter under the sync lock
        drop(self.sync.lock());
        self.synced.notify_all();
    }

    pub fn max_track_time(&self) -> f64 {
        self.sync.lock().max_track_time
    }

    pub fn synced_to(&self) -> f64 {
        self.sync.lock().synced_to
    }

    /// Publish progress up to `tick`
    pub fn mark_synced(&self, tick: f64) {
        let mut sync = self.sync.lock();
        sync.synced_to = sync.synced_to.max(tick);
        sync.max_track_time = sync.max_track_time.max(tick);
        drop(sync);
        self.synced.notify_all();
    }

    /// Mark the whole file as loaded
    pub fn finish(&self) {
        let mut sync = self.sync.lock();
        self.unended_tracks.store(0, Ordering::Release);
        sync.synced_to = f64::INFINITY;
        drop(sync);
        self.synced.notify_all();
    }

    /// Block until the loader has published past `tick` or every track has ended.
    ///
    /// Returns false if `timeout` elapsed first.
    pub fn wait_for_sync(&self, tick: f64, timeout: Duration) -> bool {
        let mut sync = self.sync.lock();
        loop {
            if sync.synced_to > tick || self.unended_tracks() == 0 {
                return true;
            }
            if self.synced.wait_for(&mut sync, timeout).timed_out() {
                return sync.synced_to > tick || self.unended_tracks() == 0;
            }
        }
    }
}
