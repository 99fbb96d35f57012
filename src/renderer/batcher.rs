// src/renderer/batcher.rs

use glam::Vec4;

/// Decoration that leaves the interpolated color untouched: `rgb * 1.0 + 0.0`
pub const FLAT: [f32; 2] = [0.0, 1.0];

/// One quad's worth of vertex data.
///
/// Corners run bottom-left, bottom-right, top-right, top-left. Each
/// decoration is `(add, scale)`, applied by the shader as `rgb * scale + add`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    pub positions: [[f32; 2]; 4],
    pub colors: [[f32; 4]; 4],
    pub decorations: [[f32; 2]; 4],
}

impl Quad {
    fn corners(x1: f32, y1: f32, x2: f32, y2: f32) -> [[f32; 2]; 4] {
        [[x1, y1], [x2, y1], [x2, y2], [x1, y2]]
    }

    pub fn solid(x1: f32, y1: f32, x2: f32, y2: f32, color: Vec4) -> Self {
        Quad {
            positions: Self::corners(x1, y1, x2, y2),
            colors: [color.to_array(); 4],
            decorations: [FLAT; 4],
        }
    }

    /// Left-to-right gradient
    pub fn horizontal(x1: f32, y1: f32, x2: f32, y2: f32, left: Vec4, right: Vec4) -> Self {
        let (l, r) = (left.to_array(), right.to_array());
        Quad {
            positions: Self::corners(x1, y1, x2, y2),
            colors: [l, r, r, l],
            decorations: [FLAT; 4],
        }
    }

    /// Bottom-to-top gradient
    pub fn vertical(x1: f32, y1: f32, x2: f32, y2: f32, bottom: Vec4, top: Vec4) -> Self {
        let (b, t) = (bottom.to_array(), top.to_array());
        Quad {
            positions: Self::corners(x1, y1, x2, y2),
            colors: [b, b, t, t],
            decorations: [FLAT; 4],
        }
    }

    /// Same decoration on the bottom pair and on the top pair of corners
    pub fn shaded(mut self, bottom: [f32; 2], top: [f32; 2]) -> Self {
        self.decorations = [bottom, bottom, top, top];
        self
    }

    pub fn with_decorations(mut self, decorations: [[f32; 2]; 4]) -> Self {
        self.decorations = decorations;
        self
    }
}

/// Indices for `capacity` quads: two triangles sharing the bottom-right/top-left diagonal
pub fn quad_indices(capacity: usize) -> Vec<u32> {
    let mut indices = Vec::with_capacity(capacity * 6);
    for q in 0..capacity as u32 {
        let v = q * 4;
        indices.extend_from_slice(&[v, v + 1, v + 3, v + 1, v + 3, v + 2]);
    }
    indices
}

/// The filled prefix of the batch buffers, handed to a sink on flush
#[derive(Debug, Clone, Copy)]
pub struct QuadBatch<'a> {
    pub positions: &'a [[f32; 2]],
    pub colors: &'a [[f32; 4]],
    pub decorations: &'a [[f32; 2]],
    pub quad_count: usize,
}

impl<'a> QuadBatch<'a> {
    pub fn vertex_count(&self) -> usize {
        self.quad_count * 4
    }

    pub fn index_count(&self) -> u32 {
        (self.quad_count * 6) as u32
    }

    /// Consecutive sub-batches of at most `max_quads` quads each, in draw order
    pub fn chunks(&self, max_quads: usize) -> impl Iterator<Item = QuadBatch<'a>> {
        let batch = *self;
        let step = max_quads.max(1);
        (0..batch.quad_count).step_by(step).map(move |start| {
            let end = (start + step).min(batch.quad_count);
            let vertices = start * 4..end * 4;
            QuadBatch {
                positions: &batch.positions[vertices.clone()],
                colors: &batch.colors[vertices.clone()],
                decorations: &batch.decorations[vertices],
                quad_count: end - start,
            }
        })
    }
}

/// Something that can draw a batch of quads in one call
pub trait QuadSink {
    fn draw(&mut self, batch: &QuadBatch<'_>);
}

/// Fixed-capacity accumulator for quad geometry.
///
/// Nothing is ever dropped: a full batcher flushes before accepting the next
/// quad, so a frame with N quads draws exactly 4N vertices however the
/// flush boundaries fall.
#[derive(Debug)]
pub struct QuadBatcher {
    positions: Vec<[f32; 2]>,
    colors: Vec<[f32; 4]>,
    decorations: Vec<[f32; 2]>,
    capacity: usize,
    len: usize,
    flushes: u64,
}

impl QuadBatcher {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        QuadBatcher {
            positions: vec![[0.0; 2]; capacity * 4],
            colors: vec![[0.0; 4]; capacity * 4],
            decorations: vec![FLAT; capacity * 4],
            capacity,
            len: 0,
            flushes: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Quads waiting for the next flush
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len >= self.capacity
    }

    /// Draw calls issued since creation
    pub fn flush_count(&self) -> u64 {
        self.flushes
    }

    pub fn emit_quad(&mut self, sink: &mut dyn QuadSink, quad: &Quad) {
        self.emit(sink, quad.positions, quad.colors, quad.decorations);
    }

    /// Append one quad, flushing first when there is no free slot
    pub fn emit(
        &mut self,
        sink: &mut dyn QuadSink,
        positions: [[f32; 2]; 4],
        colors: [[f32; 4]; 4],
        decorations: [[f32; 2]; 4],
    ) {
        if self.is_full() {
            self.flush(sink, true);
        }
        let base = self.len * 4;
        self.positions[base..base + 4].copy_from_slice(&positions);
        self.colors[base..base + 4].copy_from_slice(&colors);
        self.decorations[base..base + 4].copy_from_slice(&decorations);
        self.len += 1;
    }

    /// Hand the pending quads to `sink`.
    ///
    /// Without `force` this only fires on a full buffer; the end of each
    /// drawing phase forces it so a partial batch is never left behind.
    pub fn flush(&mut self, sink: &mut dyn QuadSink, force: bool) {
        if (!force && !self.is_full()) || self.len == 0 {
            return;
        }
        let vertices = self.len * 4;
        let batch = QuadBatch {
            positions: &self.positions[..vertices],
            colors: &self.colors[..vertices],
            decorations: &self.decorations[..vertices],
            quad_count: self.len,
        };
        sink.draw(&batch);
        self.flushes += 1;
        self.len = 0;
    }
}

/// Sink that keeps every drawn vertex, for tests and diagnostics
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub batches: Vec<usize>,
    pub positions: Vec<[f32; 2]>,
    pub colors: Vec<[f32; 4]>,
    pub decorations: Vec<[f32; 2]>,
}

impl RecordingSink {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn quad_count(&self) -> usize {
        self.positions.len() / 4
    }
}

impl QuadSink for RecordingSink {
    fn draw(&mut self, batch: &QuadBatch<'_>) {
        self.batches.push(batch.quad_count);
        self.positions.extend_from_slice(batch.positions);
        self.colors.extend_from_slice(batch.colors);
        self.decorations.extend_from_slice(batch.decorations);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(i: usize) -> Quad {
        let x = i as f32;
        Quad::solid(x, 0.0, x + 1.0, 1.0, Vec4::splat(x))
    }

    #[test]
    fn test_every_quad_is_drawn_once() {
        for capacity in [1, 3, 7, 64] {
            for count in [0, 1, 2, 3, 7, 8, 63, 64, 65, 200] {
                let mut batcher = QuadBatcher::new(capacity);
                let mut sink = RecordingSink::default();
                for i in 0..count {
                    batcher.emit_quad(&mut sink, &numbered(i));
                    batcher.flush(&mut sink, false);
                }
                batcher.flush(&mut sink, true);

                assert_eq!(sink.vertex_count(), 4 * count, "capacity {capacity}, count {count}");
                assert!(sink.batches.iter().all(|&q| q > 0 && q <= capacity));
                // order preserved, nothing overwritten
                for i in 0..count {
                    assert_eq!(sink.positions[i * 4][0], i as f32);
                }
            }
        }
    }

    #[test]
    fn test_implicit_flush_happens_before_write() {
        let mut batcher = QuadBatcher::new(2);
        let mut sink = RecordingSink::default();
        batcher.emit_quad(&mut sink, &numbered(0));
        batcher.emit_quad(&mut sink, &numbered(1));
        assert!(batcher.is_full());
        assert!(sink.batches.is_empty());

        batcher.emit_quad(&mut sink, &numbered(2));
        assert_eq!(sink.batches, vec![2]);
        assert_eq!(batcher.len(), 1);
    }

    #[test]
    fn test_unforced_flush_waits_for_full_buffer() {
        let mut batcher = QuadBatcher::new(4);
        let mut sink = RecordingSink::default();
        batcher.emit_quad(&mut sink, &numbered(0));
        batcher.flush(&mut sink, false);
        assert!(sink.batches.is_empty());
        batcher.flush(&mut sink, true);
        assert_eq!(sink.batches, vec![1]);
    }

    #[test]
    fn test_empty_forced_flush_draws_nothing() {
        let mut batcher = QuadBatcher::new(4);
        let mut sink = RecordingSink::default();
        batcher.flush(&mut sink, true);
        assert!(sink.batches.is_empty());
        assert_eq!(batcher.flush_count(), 0);
    }

    #[test]
    fn test_attributes_follow_vertex_order() {
        let mut batcher = QuadBatcher::new(4);
        let mut sink = RecordingSink::default();
        let quad = Quad::vertical(0.0, 0.0, 1.0, 1.0, Vec4::ZERO, Vec4::ONE)
            .shaded([0.1, 0.5], [0.0, 1.0]);
        batcher.emit_quad(&mut sink, &quad);
        batcher.flush(&mut sink, true);

        // the two top corners carry the top color and the top decoration
        assert_eq!(sink.positions[2], [1.0, 1.0]);
        assert_eq!(sink.colors[2], [1.0; 4]);
        assert_eq!(sink.decorations[2], [0.0, 1.0]);
        assert_eq!(sink.positions[0], [0.0, 0.0]);
        assert_eq!(sink.decorations[0], [0.1, 0.5]);
    }

    #[test]
    fn test_horizontal_gradient_colors() {
        let quad = Quad::horizontal(0.0, 0.0, 1.0, 1.0, Vec4::ZERO, Vec4::ONE);
        assert_eq!(quad.colors[0], [0.0; 4]);
        assert_eq!(quad.colors[1], [1.0; 4]);
        assert_eq!(quad.colors[2], [1.0; 4]);
        assert_eq!(quad.colors[3], [0.0; 4]);
    }

    #[test]
    fn test_quad_indices() {
        let indices = quad_indices(2);
        assert_eq!(indices, vec![0, 1, 3, 1, 3, 2, 4, 5, 7, 5, 7, 6]);
    }

    #[test]
    fn test_chunks_cover_the_batch_in_order() {
        let mut batcher = QuadBatcher::new(5);
        let mut sink = RecordingSink::default();
        for i in 0..5 {
            batcher.emit_quad(&mut sink, &numbered(i));
        }
        batcher.flush(&mut sink, true);

        let vertices = sink.positions.len();
        let batch = QuadBatch {
            positions: &sink.positions,
            colors: &sink.colors[..vertices],
            decorations: &sink.decorations[..vertices],
            quad_count: 5,
        };
        let chunks: Vec<QuadBatch<'_>> = batch.chunks(2).collect();
        let sizes: Vec<usize> = chunks.iter().map(|c| c.quad_count).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(chunks[1].positions[0][0], 2.0);
        assert_eq!(chunks[2].positions.len(), 4);
        assert_eq!(chunks[2].index_count(), 6);

        assert_eq!(batch.chunks(5).count(), 1);
        assert_eq!(batch.chunks(0).count(), 5);
    }
}
