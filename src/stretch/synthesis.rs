//! Synthesis-stage phase propagation.
//!
//! For every valid bin the grain carries a rotation, in fixed-point turns,
//! that is applied to the analysed spectrum before the inverse transform.
//! Rotations accumulate grain to grain so the synthesised output stays
//! phase-continuous even though the analysis hops at a different stride
//! than the synthesis.

use crate::core::phase;
use crate::stretch::grain::Grain;

/// Computes the per-bin deltas and rotations of `grain` from the previous
/// grain's phase and rotation state.
///
/// Bins of a tonal partial advance at the instantaneous frequency measured
/// at the partial's peak: the nominal bin advance over the synthesis hop
/// plus the peak's deviation scaled by the synthesis-to-analysis hop ratio.
/// Bins of a transient partial advance at their nominal bin frequency only,
/// carrying the previous output phase, so onsets keep their analysed phase
/// structure.
///
/// Discontinuous grains and passthrough grains bypass propagation entirely:
/// their rotation is zero and the spectrum passes unchanged.
pub fn propagate(log2_synthesis_hop: u32, grain: &mut Grain, previous: &Grain) {
    let valid = grain.valid_bin_count;

    if !grain.continuous || grain.passthrough != 0 {
        grain.delta[..valid].fill(0);
        grain.rotation[..valid].fill(0);
        return;
    }

    let log2_length = grain.log2_transform_length;
    let analysis_hop = grain.analysis.hop as i64;
    let synthesis_hop = 1i64 << log2_synthesis_hop;

    for bin in 0..valid {
        let nominal = phase::bin_advance(bin, analysis_hop, log2_length);
        grain.delta[bin] = grain.phase[bin]
            .wrapping_sub(previous.phase[bin])
            .wrapping_sub(nominal);
    }

    // A frozen grain (hop zero) re-reads the same input; deviations carry
    // no frequency information there and the nominal advance stands alone.
    let hop_ratio = if analysis_hop == 0 {
        0.0
    } else {
        synthesis_hop as f64 / analysis_hop as f64
    };

    let mut begin = 0usize;
    for partial in &grain.partials {
        let end = partial.end.min(valid);
        let correction: i16 = if partial.transient || analysis_hop == 0 {
            0
        } else {
            (hop_ratio * grain.delta[partial.peak] as f64).round() as i64 as i16
        };
        for bin in begin..end {
            let advance = phase::bin_advance(bin, synthesis_hop, log2_length);
            grain.rotation[bin] = previous.rotation[bin]
                .wrapping_add(previous.phase[bin])
                .wrapping_sub(grain.phase[bin])
                .wrapping_add(advance)
                .wrapping_add(correction);
        }
        begin = partial.end;
    }
}
