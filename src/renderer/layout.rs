// src/renderer/layout.rs

/// Number of addressable keys
pub const KEY_COUNT: usize = 256;

/// Check if a key is black (sharp/flat)
pub fn is_black_key(key: usize) -> bool {
    // Black keys are: C#(1), D#(3), F#(6), G#(8), A#(10)
    matches!(key % 12, 1 | 3 | 6 | 8 | 10)
}

/// Horizontal placement of every key in the rendered range, in 0..1 screen units
#[derive(Debug, Clone, PartialEq)]
pub struct KeyLayout {
    first: usize,
    last: usize,
    uniform: bool,
    x1: Vec<f32>,
    width: Vec<f32>,
}

impl KeyLayout {
    pub fn new(first: usize, last: usize, same_width: bool) -> Self {
        if same_width {
            Self::uniform(first, last)
        } else {
            Self::piano(first, last)
        }
    }

    /// Every key gets the same width
    pub fn uniform(first: usize, last: usize) -> Self {
        let first = first.min(KEY_COUNT - 1);
        let last = last.clamp(first + 1, KEY_COUNT);
        let count = (last - first) as f32;
        let x1 = (0..last - first).map(|i| i as f32 / count).collect();
        let width = vec![1.0 / count; last - first];
        KeyLayout {
            first,
            last,
            uniform: true,
            x1,
            width,
        }
    }

    /// White keys evenly spaced, black keys narrower and set between them
    pub fn piano(first: usize, last: usize) -> Self {
        let mut first = first.min(KEY_COUNT - 1);
        let mut last = last.clamp(first + 1, KEY_COUNT);
        // never cut a range on a black key
        if first > 0 && is_black_key(first) {
            first -= 1;
        }
        if last < KEY_COUNT && is_black_key(last - 1) {
            last += 1;
        }

        // ordinal of each key among keys of its own color
        let mut keynum = [0usize; KEY_COUNT + 1];
        let (mut whites, mut blacks) = (0, 0);
        for (key, num) in keynum.iter_mut().enumerate() {
            if is_black_key(key) {
                *num = blacks;
                blacks += 1;
            } else {
                *num = whites;
                whites += 1;
            }
        }

        let white_count = (first..last).filter(|&k| !is_black_key(k)).count().max(1) as f32;
        let white_width = 1.0 / white_count;
        let base = keynum[first] as f32;

        let mut x1 = Vec::with_capacity(last - first);
        let mut width = Vec::with_capacity(last - first);
        for key in first..last {
            if !is_black_key(key) {
                x1.push((keynum[key] as f32 - base) / white_count);
                width.push(white_width);
            } else {
                let black_width = 0.6 / white_count;
                let factor = match keynum[key] % 5 {
                    0 | 2 => 1.3,
                    1 | 4 => 0.7,
                    _ => 1.0,
                };
                let offset = black_width / 2.0 * factor;
                x1.push((keynum[key + 1] as f32 - base) / white_count - offset);
                width.push(black_width);
            }
        }

        KeyLayout {
            first,
            last,
            uniform: false,
            x1,
            width,
        }
    }

    /// First key drawn, after any widening
    pub fn first(&self) -> usize {
        self.first
    }

    /// One past the last key drawn
    pub fn last(&self) -> usize {
        self.last
    }

    pub fn is_uniform(&self) -> bool {
        self.uniform
    }

    pub fn contains(&self, key: usize) -> bool {
        key >= self.first && key < self.last
    }

    /// Left edge and width of `key`
    pub fn span(&self, key: usize) -> Option<(f32, f32)> {
        if !self.contains(key) {
            return None;
        }
        let i = key - self.first;
        Some((self.x1[i], self.width[i]))
    }

    /// Key under a horizontal screen position; black keys sit on top
    pub fn key_at(&self, x: f32) -> Option<usize> {
        if !(0.0..1.0).contains(&x) {
            return None;
        }
        if self.uniform {
            let key = (x * (self.last - self.first) as f32).floor() as usize + self.first;
            return Some(key.min(self.last - 1));
        }
        let hit = |black: bool| {
            (self.first..self.last)
                .filter(|&k| is_black_key(k) == black)
                .find(|&k| {
                    let i = k - self.first;
                    x >= self.x1[i] && x < self.x1[i] + self.width[i]
                })
        };
        hit(true).or_else(|| hit(false))
    }
}
