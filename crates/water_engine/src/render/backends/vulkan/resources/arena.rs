//! Per-frame slot storage
//!
//! Descriptor sets and uniform buffers are laid out as `[frame][slot]`, where
//! each mesh owns a contiguous [`SlotRange`] of slots in every frame. Lookups
//! go through the range so an index outside a mesh's own slots panics instead
//! of silently reading a neighbour's data.

/// Contiguous run of slots owned by one mesh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotRange {
    /// First slot
    pub start: usize,
    /// Number of slots
    pub size: usize,
}

impl SlotRange {
    /// Range `start..start + size`
    pub fn new(start: usize, size: usize) -> Self {
        Self { start, size }
    }

    /// One past the last slot
    pub fn end(&self) -> usize {
        self.start + self.size
    }

    /// Absolute slot for `idx`, or `None` when `idx` is outside the range
    pub fn slot(&self, idx: usize) -> Option<usize> {
        (idx < self.size).then_some(self.start + idx)
    }
}

/// Flat `[frame][slot]` storage
#[derive(Debug)]
pub struct FrameArena<T> {
    slots_per_frame: usize,
    frames: usize,
    items: Vec<T>,
}

impl<T> FrameArena<T> {
    /// Build every item with `make(frame, slot)`, stopping at the first error
    pub fn try_build<E>(
        frames: usize,
        slots_per_frame: usize,
        mut make: impl FnMut(usize, usize) -> Result<T, E>,
    ) -> Result<Self, E> {
        let mut items = Vec::with_capacity(frames * slots_per_frame);
        for frame in 0..frames {
            for slot in 0..slots_per_frame {
                items.push(make(frame, slot)?);
            }
        }
        Ok(Self {
            slots_per_frame,
            frames,
            items,
        })
    }

    /// Wrap per-frame rows that all have `slots_per_frame` entries
    pub fn from_rows(rows: Vec<Vec<T>>, slots_per_frame: usize) -> Self {
        assert!(
            rows.iter().all(|row| row.len() == slots_per_frame),
            "every frame needs exactly {} slots",
            slots_per_frame
        );
        let frames = rows.len();
        Self {
            slots_per_frame,
            frames,
            items: rows.into_iter().flatten().collect(),
        }
    }

    /// Number of frames
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Slots in each frame
    pub fn slots_per_frame(&self) -> usize {
        self.slots_per_frame
    }

    /// Item `idx` of `range` in `frame`
    ///
    /// # Panics
    /// When `frame` is out of bounds, `idx >= range.size`, or the range runs
    /// past the end of the frame.
    pub fn get(&self, frame: usize, range: SlotRange, idx: usize) -> &T {
        &self.items[self.index(frame, range, idx)]
    }

    /// All items of `range` in `frame`
    pub fn range(&self, frame: usize, range: SlotRange) -> &[T] {
        assert!(frame < self.frames, "frame {} out of {} frames", frame, self.frames);
        assert!(
            range.end() <= self.slots_per_frame,
            "slot range {:?} exceeds {} slots per frame",
            range,
            self.slots_per_frame
        );
        let base = frame * self.slots_per_frame;
        &self.items[base + range.start..base + range.end()]
    }

    fn index(&self, frame: usize, range: SlotRange, idx: usize) -> usize {
        assert!(frame < self.frames, "frame {} out of {} frames", frame, self.frames);
        let slot = range
            .slot(idx)
            .unwrap_or_else(|| panic!("slot index {} outside range of size {}", idx, range.size));
        assert!(
            slot < self.slots_per_frame,
            "slot {} exceeds {} slots per frame",
            slot,
            self.slots_per_frame
        );
        frame * self.slots_per_frame + slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena() -> FrameArena<(usize, usize)> {
        FrameArena::try_build::<()>(3, 4, |frame, slot| Ok((frame, slot))).expect("infallible")
    }

    #[test]
    fn test_lookup_is_frame_major() {
        let arena = arena();
        assert_eq!(arena.frames(), 3);
        assert_eq!(*arena.get(2, SlotRange::new(1, 2), 1), (2, 2));
        assert_eq!(arena.range(1, SlotRange::new(2, 2)), &[(1, 2), (1, 3)]);
    }

    #[test]
    #[should_panic(expected = "outside range")]
    fn test_index_past_range_panics() {
        arena().get(0, SlotRange::new(0, 2), 2);
    }

    #[test]
    #[should_panic(expected = "frame 3")]
    fn test_frame_out_of_bounds_panics() {
        arena().get(3, SlotRange::new(0, 1), 0);
    }

    #[test]
    fn test_build_stops_at_first_error() {
        let mut calls = 0;
        let result = FrameArena::try_build(2, 2, |frame, slot| {
            calls += 1;
            if (frame, slot) == (0, 1) {
                Err("boom")
            } else {
                Ok(())
            }
        });
        assert!(result.is_err());
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_from_rows() {
        let arena = FrameArena::from_rows(vec![vec!['a', 'b'], vec!['c', 'd']], 2);
        assert_eq!(*arena.get(1, SlotRange::new(0, 2), 0), 'c');
    }
}
