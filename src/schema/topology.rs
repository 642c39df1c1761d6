//! Mapping between Art-Net universes and physical strip pixel ranges.
//!
//! One DMX universe carries 512 channels, which is 170 RGB pixels (the last
//! two channels are unused). Each output is split across the minimum number
//! of universes needed to cover its pixels, in output order.

use std::ops::Range;

use super::Correction;

/// RGB pixels carried by one universe.
pub const PIXELS_PER_UNIVERSE: usize = 170;

/// Channels in one DMX universe.
pub const CHANNELS_PER_UNIVERSE: usize = 512;

/// Maximum number of physical outputs.
pub const MAX_OUTPUTS: usize = 4;

/// Maximum pixels on one output (four universes).
pub const MAX_PIXELS_PER_OUTPUT: usize = 4 * PIXELS_PER_UNIVERSE;

/// Location of one universe on the physical outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniverseSpec {
    /// Output (strip) index the universe drives.
    pub output: usize,
    /// Which 170-pixel segment of the output the universe supplies.
    pub sub_index: usize,
}

/// Universe to output layout for one session.
///
/// Built once from pixel counts when recording, or loaded verbatim from a
/// save bundle for playback. Immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pixel_counts: Vec<usize>,
    universes: Vec<UniverseSpec>,
}

impl Topology {
    /// Build a topology from desired per-output pixel counts.
    ///
    /// More than [`MAX_OUTPUTS`] outputs are cut to the first four and any
    /// count above [`MAX_PIXELS_PER_OUTPUT`] is clamped. Each adjustment is
    /// returned as a [`Correction`] and logged; construction never fails.
    pub fn from_pixel_counts(requested: &[usize]) -> (Self, Vec<Correction>) {
        let mut corrections = Vec::new();

        let mut pixel_counts = requested.to_vec();
        if pixel_counts.len() > MAX_OUTPUTS {
            corrections.push(Correction::TooManyOutputs {
                requested: pixel_counts.len(),
            });
            pixel_counts.truncate(MAX_OUTPUTS);
        }

        for (output, count) in pixel_counts.iter_mut().enumerate() {
            if *count > MAX_PIXELS_PER_OUTPUT {
                corrections.push(Correction::PixelCountClamped {
                    output,
                    requested: *count,
                });
                *count = MAX_PIXELS_PER_OUTPUT;
            }
        }

        for correction in &corrections {
            log::warn!("{correction}");
        }

        let universes = pixel_counts
            .iter()
            .enumerate()
            .flat_map(|(output, &count)| {
                (0..universes_needed(count)).map(move |sub_index| UniverseSpec { output, sub_index })
            })
            .collect();

        (
            Self {
                pixel_counts,
                universes,
            },
            corrections,
        )
    }

    /// Assemble a topology from stored tables without recomputing them.
    pub fn from_parts(pixel_counts: Vec<usize>, universes: Vec<UniverseSpec>) -> Self {
        Self {
            pixel_counts,
            universes,
        }
    }

    /// Pixel count of every output.
    pub fn pixel_counts(&self) -> &[usize] {
        &self.pixel_counts
    }

    /// Universe table in universe order.
    pub fn universes(&self) -> &[UniverseSpec] {
        &self.universes
    }

    pub fn output_count(&self) -> usize {
        self.pixel_counts.len()
    }

    pub fn universe_count(&self) -> usize {
        self.universes.len()
    }

    /// Look up a universe.
    pub fn universe(&self, universe: usize) -> Option<&UniverseSpec> {
        self.universes.get(universe)
    }

    /// Pixel count of the output driven by `universe`.
    pub fn output_pixel_count(&self, universe: usize) -> Option<usize> {
        self.universe(universe)
            .and_then(|spec| self.pixel_counts.get(spec.output).copied())
    }

    /// Strip-local pixel range supplied by `universe`.
    ///
    /// `[170 * sub_index, 170 * sub_index + min(170, remaining))`; empty when
    /// the universe is unknown or its segment lies past the end of the output.
    pub fn pixel_range(&self, universe: usize) -> Range<usize> {
        let (Some(spec), Some(count)) = (self.universe(universe), self.output_pixel_count(universe))
        else {
            return 0..0;
        };
        let start = spec.sub_index * PIXELS_PER_UNIVERSE;
        let len = count.saturating_sub(start).min(PIXELS_PER_UNIVERSE);
        start..start + len
    }

    /// Number of pixels carried by `universe`.
    pub fn universe_pixel_count(&self, universe: usize) -> usize {
        self.pixel_range(universe).len()
    }

    /// Universes feeding `output`, in segment order.
    pub fn universes_for_output(&self, output: usize) -> impl Iterator<Item = usize> + '_ {
        self.universes
            .iter()
            .enumerate()
            .filter(move |(_, spec)| spec.output == output)
            .map(|(universe, _)| universe)
    }

    /// Find the universe and universe-local index that carry a strip pixel.
    pub fn locate(&self, output: usize, pixel: usize) -> Option<(usize, usize)> {
        if pixel >= *self.pixel_counts.get(output)? {
            return None;
        }
        let sub_index = pixel / PIXELS_PER_UNIVERSE;
        let universe = self
            .universes
            .iter()
            .position(|spec| spec.output == output && spec.sub_index == sub_index)?;
        Some((universe, pixel % PIXELS_PER_UNIVERSE))
    }
}

/// Universes required for an output; outputs under 170 pixels still take one.
fn universes_needed(pixel_count: usize) -> usize {
    pixel_count.div_ceil(PIXELS_PER_UNIVERSE).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_single_small_output() {
        let (topology, corrections) = Topology::from_pixel_counts(&[10]);
        assert!(corrections.is_empty());
        assert_eq!(topology.universe_count(), 1);
        assert_eq!(topology.pixel_range(0), 0..10);
    }

    #[test]
    fn test_multi_output_order() {
        let (topology, _) = Topology::from_pixel_counts(&[400, 20, 170]);
        let expected = [
            UniverseSpec { output: 0, sub_index: 0 },
            UniverseSpec { output: 0, sub_index: 1 },
            UniverseSpec { output: 0, sub_index: 2 },
            UniverseSpec { output: 1, sub_index: 0 },
            UniverseSpec { output: 2, sub_index: 0 },
        ];
        assert_eq!(topology.universes(), &expected);
        assert_eq!(topology.pixel_range(2), 340..400);
        assert_eq!(topology.pixel_range(4), 0..170);
        assert_eq!(topology.universes_for_output(0).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_empty_output_takes_one_universe() {
        let (topology, _) = Topology::from_pixel_counts(&[0, 5]);
        assert_eq!(topology.universe_count(), 2);
        assert!(topology.pixel_range(0).is_empty());
        assert_eq!(topology.pixel_range(1), 0..5);
    }

    #[test]
    fn test_clamping() {
        let (topology, corrections) = Topology::from_pixel_counts(&[700, 1, 1, 1, 1, 1]);
        assert_eq!(topology.pixel_counts(), &[680, 1, 1, 1]);
        assert_eq!(topology.universe_count(), 4 + 3);
        assert_eq!(
            corrections,
            vec![
                Correction::TooManyOutputs { requested: 6 },
                Correction::PixelCountClamped {
                    output: 0,
                    requested: 700
                },
            ]
        );
    }

    #[test]
    fn test_locate() {
        let (topology, _) = Topology::from_pixel_counts(&[200, 30]);
        assert_eq!(topology.locate(0, 0), Some((0, 0)));
        assert_eq!(topology.locate(0, 171), Some((1, 1)));
        assert_eq!(topology.locate(1, 29), Some((2, 29)));
        assert_eq!(topology.locate(1, 30), None);
        assert_eq!(topology.locate(2, 0), None);
    }

    #[test]
    fn test_unknown_universe_has_empty_range() {
        let (topology, _) = Topology::from_pixel_counts(&[10]);
        assert_eq!(topology.pixel_range(3), 0..0);
        assert_eq!(topology.output_pixel_count(3), None);
    }

    proptest! {
        #[test]
        fn prop_universes_cover_every_pixel_once(
            counts in proptest::collection::vec(0usize..=MAX_PIXELS_PER_OUTPUT, 0..=MAX_OUTPUTS)
        ) {
            let (topology, corrections) = Topology::from_pixel_counts(&counts);
            prop_assert!(corrections.is_empty());

            let expected_universes: usize = counts.iter().map(|&c| universes_needed(c)).sum();
            prop_assert_eq!(topology.universe_count(), expected_universes);

            let mut covered: Vec<Vec<u8>> = counts.iter().map(|&c| vec![0u8; c]).collect();
            for universe in 0..topology.universe_count() {
                let output = topology.universe(universe).unwrap().output;
                for pixel in topology.pixel_range(universe) {
                    covered[output][pixel] += 1;
                }
            }
            prop_assert!(covered.iter().flatten().all(|&hits| hits == 1));

            let total: usize = (0..topology.universe_count())
                .map(|u| topology.universe_pixel_count(u))
                .sum();
            prop_assert_eq!(total, counts.iter().sum::<usize>());
        }

        #[test]
        fn prop_locate_inverts_pixel_range(
            counts in proptest::collection::vec(1usize..=MAX_PIXELS_PER_OUTPUT, 1..=MAX_OUTPUTS)
        ) {
            let (topology, _) = Topology::from_pixel_counts(&counts);
            for universe in 0..topology.universe_count() {
                let output = topology.universe(universe).unwrap().output;
                let range = topology.pixel_range(universe);
                for (local, pixel) in range.enumerate() {
                    prop_assert_eq!(topology.locate(output, pixel), Some((universe, local)));
                }
            }
        }
    }
}
