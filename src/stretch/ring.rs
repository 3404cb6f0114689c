//! The four-slot grain pipeline.
//!
//! Slot 0 is the grain being specified/analysed/synthesised now, slots 1–3
//! hold the three previous grains. Rotation reuses the oldest slot's
//! buffers for the new current grain; the heavyweight spectral arrays are
//! swapped so that only slots 0 and 1 ever carry populated phase, energy,
//! rotation and partial data.

use crate::stretch::grain::Grain;
use std::ops::{Index, IndexMut};

/// Number of grains in flight. Synthesis emits from the oldest slot, two
/// grains behind the current request.
pub const GRAIN_COUNT: usize = 4;

pub struct GrainRing {
    grains: Vec<Grain>,
}

impl GrainRing {
    pub fn new(log2_synthesis_hop: u32, channels: usize) -> Self {
        Self {
            grains: (0..GRAIN_COUNT)
                .map(|_| Grain::new(log2_synthesis_hop, channels))
                .collect(),
        }
    }

    /// Advances the pipeline one slot: the oldest grain's storage becomes
    /// the new current slot, and the spectral buffers that only the two
    /// newest slots need are swapped back in. The recycled slot's output
    /// segment is cleared for the next round of lap accumulation.
    pub fn rotate(&mut self) {
        self.grains.rotate_right(1);

        // The buffers now sitting in slot 2 were populated when that grain
        // was slot 1; reclaim them for the incoming grain.
        let (head, tail) = self.grains.split_at_mut(2);
        let current = &mut head[0];
        let stale = &mut tail[0];
        std::mem::swap(&mut current.phase, &mut stale.phase);
        std::mem::swap(&mut current.energy, &mut stale.energy);
        std::mem::swap(&mut current.rotation, &mut stale.rotation);
        std::mem::swap(&mut current.partials, &mut stale.partials);

        self.grains[0].segment.zero();
    }

    /// True when every slot holds a flush grain: the pipeline is drained.
    pub fn flushed(&self) -> bool {
        self.grains.iter().all(|grain| !grain.valid())
    }

    /// Mutable references to two distinct slots.
    pub fn pair_mut(&mut self, a: usize, b: usize) -> (&mut Grain, &mut Grain) {
        assert!(a < b && b < GRAIN_COUNT);
        let (head, tail) = self.grains.split_at_mut(b);
        (&mut head[a], &mut tail[0])
    }
}

impl Index<usize> for GrainRing {
    type Output = Grain;

    fn index(&self, index: usize) -> &Grain {
        &self.grains[index]
    }
}

impl IndexMut<usize> for GrainRing {
    fn index_mut(&mut self, index: usize) -> &mut Grain {
        &mut self.grains[index]
    }
}
