//! Partial tracking: carving the spectrum into peak-centred regions and
//! refusing phase locking on regions whose energy jumped since the previous
//! grain.

/// Energy growth factor past which a partial is treated as a transient.
/// Bins of a transient partial get no phase locking, so onsets stay crisp
/// instead of being smeared by phase propagation.
const TRANSIENT_ENERGY_RATIO: f32 = 16.0;

/// One tonal region of the spectrum. Partials tile `[0, bin_count)`: each
/// spans from the end of the previous partial up to `end`, with its energy
/// maximum at `peak`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partial {
    /// Bin index of the region's energy maximum.
    pub peak: usize,
    /// One past the last bin of the region.
    pub end: usize,
    /// True when the region's energy grew sharply since the previous grain.
    pub transient: bool,
}

/// Splits `energy[..bin_count]` into partials at the troughs between local
/// maxima. The result tiles the range; a silent spectrum yields a single
/// partial.
pub fn enumerate(partials: &mut Vec<Partial>, bin_count: usize, energy: &[f32]) {
    partials.clear();
    if bin_count == 0 {
        return;
    }

    let mut peak = 0usize;
    let mut falling = false;
    for bin in 1..bin_count {
        let rising = energy[bin] > energy[bin - 1];
        if rising && falling {
            // Trough between two lobes: close the current partial here.
            partials.push(Partial {
                peak,
                end: bin,
                transient: false,
            });
            peak = bin;
            falling = false;
        } else if !rising && energy[bin] < energy[bin - 1] {
            falling = true;
        }
        if energy[bin] > energy[peak] {
            peak = bin;
        }
    }
    partials.push(Partial {
        peak,
        end: bin_count,
        transient: false,
    });
}

/// Marks partials whose energy outgrew the previous grain's energy over the
/// same bins by more than the transient threshold.
pub fn suppress_transients(partials: &mut [Partial], energy: &[f32], previous_energy: &[f32]) {
    let mut begin = 0usize;
    for partial in partials.iter_mut() {
        let end = partial.end.min(energy.len()).min(previous_energy.len());
        if begin < end {
            let current: f32 = energy[begin..end].iter().sum();
            let previous: f32 = previous_energy[begin..end].iter().sum();
            partial.transient = current > previous * TRANSIENT_ENERGY_RATIO;
        }
        begin = partial.end;
    }
}
