//! Discrete Gaussian kernels and the table of kernels indexed by blur intensity.
//!
//! Each table entry is generated for an equally spaced intensity step `t` in
//! `[0, 1]`. Sigma grows quadratically with `t`, so that low intensities change
//! slowly and the blur ramps up towards the top of the range. The kernel radius is
//! `ceil(2 * sigma)`; the sampled weights are renormalized to sum to exactly one.
//!
//! A kernel is uploaded to the GPU as [`KernelTaps`]: explicit sample offsets and
//! weights. Discrete taps sample every texel; bilinear taps merge neighbouring
//! texels into one filtered sample.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::selector::{KernelBlend, Selection};

/// Inline capacity covering every kernel of the built-in presets.
type Weights = SmallVec<[f32; 16]>;

/// How a kernel's texels are turned into texture samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleReduction {
    /// One sample per kernel tap.
    #[default]
    Discrete,
    /// Pairs of same-side taps merged into one linearly filtered sample.
    Bilinear,
}

/// Parameters of a generated kernel table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KernelTableSpec {
    pub steps: usize,
    pub sigma_min: f32,
    pub sigma_max: f32,
}

impl KernelTableSpec {
    /// Sizes 3 to 9, a soft preview blur.
    pub const PREVIEW: Self = Self {
        steps: 11,
        sigma_min: 0.25,
        sigma_max: 2.0,
    };

    /// Sizes 3 to 13.
    pub const WIDE: Self = Self {
        steps: 11,
        sigma_min: 0.5,
        sigma_max: 3.0,
    };

    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }

    fn sigma_at(&self, t: f64) -> f64 {
        let min = self.sigma_min as f64;
        let max = self.sigma_max as f64;
        min + (max - min) * t * t
    }
}

impl Default for KernelTableSpec {
    fn default() -> Self {
        Self::PREVIEW
    }
}

/// A symmetric, normalized 1-D Gaussian kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianKernel {
    step: f32,
    sigma: f32,
    weights: Weights,
}

impl GaussianKernel {
    /// Samples a Gaussian of the given sigma at integer offsets `-r..=r` with
    /// `r = ceil(2 * sigma)`.
    pub fn sampled(step: f32, sigma: f32) -> Self {
        let sigma = sigma.max(f32::EPSILON) as f64;
        // Nudge so that exact integers (sigma = 2.0) do not round up a tap.
        let radius = ((2.0 * sigma) - 1e-9).ceil().max(1.0) as i32;
        let denominator = 2.0 * sigma * sigma;

        let raw: SmallVec<[f64; 16]> = (-radius..=radius)
            .map(|offset| (-((offset * offset) as f64) / denominator).exp())
            .collect();
        let sum: f64 = raw.iter().sum();

        Self {
            step,
            sigma: sigma as f32,
            weights: raw.iter().map(|weight| (weight / sum) as f32).collect(),
        }
    }

    pub fn step(&self) -> f32 {
        self.step
    }

    pub fn sigma(&self) -> f32 {
        self.sigma
    }

    /// Number of taps, always odd.
    pub fn size(&self) -> usize {
        self.weights.len()
    }

    pub fn radius(&self) -> usize {
        self.weights.len() / 2
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Weight at a tap offset relative to the centre; zero outside the kernel.
    pub fn weight_at(&self, offset: i32) -> f32 {
        let index = self.radius() as i64 + offset as i64;
        if index < 0 {
            return 0.0;
        }
        self.weights.get(index as usize).copied().unwrap_or(0.0)
    }

    /// Produces the samples to upload for this kernel.
    ///
    /// Never returns more than `max_taps` samples (at least three are always
    /// kept). When the requested reduction does not fit, same-side taps are
    /// merged in wider groups, each placed at the weighted centroid of the
    /// texels it covers. Total weight is preserved.
    pub fn taps(&self, reduction: SampleReduction, max_taps: usize) -> KernelTaps {
        let radius = self.radius();
        let max_per_side = (max_taps.max(3) - 1) / 2;

        let mut group = match reduction {
            SampleReduction::Discrete => 1,
            SampleReduction::Bilinear => 2,
        };
        while radius.div_ceil(group) > max_per_side {
            group += 1;
        }

        let positive: SmallVec<[(f32, f32); 16]> = (1..=radius)
            .collect::<SmallVec<[usize; 16]>>()
            .chunks(group)
            .map(|chunk| {
                let weight: f32 = chunk
                    .iter()
                    .map(|&offset| self.weight_at(offset as i32))
                    .sum();
                let offset = if chunk.len() == 1 {
                    chunk[0] as f32
                } else if weight > 0.0 {
                    chunk
                        .iter()
                        .map(|&offset| offset as f32 * self.weight_at(offset as i32))
                        .sum::<f32>()
                        / weight
                } else {
                    chunk.iter().sum::<usize>() as f32 / chunk.len() as f32
                };
                (offset, weight)
            })
            .collect();

        let mut taps = KernelTaps::default();
        for &(offset, weight) in positive.iter().rev() {
            taps.push(-offset, weight);
        }
        taps.push(0.0, self.weight_at(0));
        for &(offset, weight) in &positive {
            taps.push(offset, weight);
        }
        taps
    }
}

/// Sample offsets (in texels, relative to the shaded fragment) and their weights.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KernelTaps {
    offsets: Weights,
    weights: Weights,
}

impl KernelTaps {
    fn push(&mut self, offset: f32, weight: f32) {
        self.offsets.push(offset);
        self.weights.push(weight);
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn offsets(&self) -> &[f32] {
        &self.offsets
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn total_weight(&self) -> f32 {
        self.weights.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        self.offsets.iter().copied().zip(self.weights.iter().copied())
    }
}

/// Immutable table of kernels spanning intensity steps `0.0..=1.0`.
#[derive(Debug, Clone)]
pub struct KernelTable {
    spec: KernelTableSpec,
    kernels: Vec<GaussianKernel>,
}

impl KernelTable {
    pub fn new(spec: KernelTableSpec) -> Self {
        let steps = spec.steps.max(2);
        let kernels = (0..steps)
            .map(|index| {
                let t = index as f64 / (steps - 1) as f64;
                GaussianKernel::sampled(t as f32, spec.sigma_at(t) as f32)
            })
            .collect();

        Self { spec, kernels }
    }

    pub fn spec(&self) -> KernelTableSpec {
        self.spec
    }

    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&GaussianKernel> {
        self.kernels.get(index)
    }

    /// Kernel at `index`, clamped to the last entry.
    pub fn kernel(&self, index: usize) -> &GaussianKernel {
        &self.kernels[index.min(self.kernels.len() - 1)]
    }

    pub fn iter(&self) -> impl Iterator<Item = &GaussianKernel> {
        self.kernels.iter()
    }

    pub fn step(&self, index: usize) -> f32 {
        self.kernel(index).step()
    }

    pub fn sigma(&self, index: usize) -> f32 {
        self.kernel(index).sigma()
    }

    pub fn size(&self, index: usize) -> usize {
        self.kernel(index).size()
    }

    pub fn radius(&self, index: usize) -> usize {
        self.kernel(index).radius()
    }

    pub fn weight(&self, index: usize, offset: i32) -> f32 {
        self.kernel(index).weight_at(offset)
    }

    /// Largest kernel size in the table.
    pub fn max_size(&self) -> usize {
        self.kernels.iter().map(GaussianKernel::size).max().unwrap_or(1)
    }

    /// Linear blend of two neighbouring kernels, padded to the wider radius.
    pub fn blend(&self, blend: &KernelBlend) -> GaussianKernel {
        let lower = self.kernel(blend.lower);
        let upper = self.kernel(blend.upper);
        let fraction = blend.fraction.clamp(0.0, 1.0);
        let radius = lower.radius().max(upper.radius()) as i32;

        let mut weights: Weights = (-radius..=radius)
            .map(|offset| {
                lower.weight_at(offset) * (1.0 - fraction) + upper.weight_at(offset) * fraction
            })
            .collect();
        let sum: f32 = weights.iter().sum();
        if sum > 0.0 {
            weights.iter_mut().for_each(|weight| *weight /= sum);
        }

        GaussianKernel {
            step: lower.step() + (upper.step() - lower.step()) * fraction,
            sigma: lower.sigma() + (upper.sigma() - lower.sigma()) * fraction,
            weights,
        }
    }

    /// The kernel a selection refers to. Nearest picks borrow from the table.
    pub fn resolve(&self, selection: &Selection) -> Cow<'_, GaussianKernel> {
        match selection {
            Selection::Nearest(index) => Cow::Borrowed(self.kernel(*index)),
            Selection::Blend(blend) if blend.fraction <= 0.0 => {
                Cow::Borrowed(self.kernel(blend.lower))
            }
            Selection::Blend(blend) if blend.fraction >= 1.0 => {
                Cow::Borrowed(self.kernel(blend.upper))
            }
            Selection::Blend(blend) => Cow::Owned(self.blend(blend)),
        }
    }
}

impl Default for KernelTable {
    fn default() -> Self {
        Self::new(KernelTableSpec::PREVIEW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Reference values of the hand-tuned preview table.
    const PREVIEW_REFERENCE: [(f32, f32, &[f32]); 11] = [
        (0.0, 0.25, &[0.000335, 0.999330, 0.000335]),
        (0.1, 0.2675, &[0.000922, 0.998157, 0.000922]),
        (0.2, 0.32, &[0.007463, 0.985075, 0.007463]),
        (0.3, 0.4075, &[0.044826, 0.910347, 0.044826]),
        (0.4, 0.53, &[0.000604, 0.125954, 0.746884, 0.125954, 0.000604]),
        (0.5, 0.6875, &[0.008432, 0.201455, 0.580226, 0.201455, 0.008432]),
        (0.6, 0.88, &[0.034355, 0.238349, 0.454591, 0.238349, 0.034355]),
        (
            0.7,
            1.1075,
            &[0.009198, 0.070613, 0.239883, 0.360611, 0.239883, 0.070613, 0.009198],
        ),
        (
            0.8,
            1.37,
            &[0.026722, 0.101236, 0.225122, 0.293841, 0.225122, 0.101236, 0.026722],
        ),
        (
            0.9,
            1.6675,
            &[
                0.013552, 0.047717, 0.117259, 0.201109, 0.240727, 0.201109, 0.117259, 0.047717,
                0.013552,
            ],
        ),
        (
            1.0,
            2.0,
            &[
                0.027631, 0.066282, 0.123832, 0.180174, 0.204164, 0.180174, 0.123832, 0.066282,
                0.027631,
            ],
        ),
    ];

    #[test]
    fn preview_table_matches_reference_values() {
        let table = KernelTable::new(KernelTableSpec::PREVIEW);
        assert_eq!(table.len(), PREVIEW_REFERENCE.len());

        for (index, (step, sigma, weights)) in PREVIEW_REFERENCE.iter().enumerate() {
            let kernel = table.kernel(index);
            assert!((kernel.step() - step).abs() < 1e-6, "step at {index}");
            assert!((kernel.sigma() - sigma).abs() < 1e-5, "sigma at {index}");
            assert_eq!(kernel.size(), weights.len(), "size at {index}");
            for (actual, expected) in kernel.weights().iter().zip(weights.iter()) {
                assert!(
                    (actual - expected).abs() < 1e-5,
                    "weight at {index}: {actual} vs {expected}"
                );
            }
        }
    }

    #[test]
    fn wide_table_reaches_thirteen_taps() {
        let table = KernelTable::new(KernelTableSpec::WIDE);
        let sizes: Vec<usize> = table.iter().map(GaussianKernel::size).collect();
        assert_eq!(sizes, vec![3, 5, 5, 5, 5, 7, 7, 9, 11, 13, 13]);
        assert_eq!(table.max_size(), 13);
        assert_eq!(KernelTable::default().max_size(), 9);
        assert!((table.weight(10, 0) - 0.137023).abs() < 1e-5);
        assert!((table.weight(8, -5) - 0.011253).abs() < 1e-5);
    }

    #[test]
    fn every_kernel_is_normalized_symmetric_and_odd() {
        for spec in [
            KernelTableSpec::PREVIEW,
            KernelTableSpec::WIDE,
            KernelTableSpec::WIDE.with_steps(37),
        ] {
            let table = KernelTable::new(spec);
            for kernel in table.iter() {
                let sum: f32 = kernel.weights().iter().sum();
                assert!((sum - 1.0).abs() < 1e-4);
                assert_eq!(kernel.size() % 2, 1);
                assert_eq!(kernel.radius() * 2 + 1, kernel.size());
                let radius = kernel.radius() as i32;
                for offset in 1..=radius {
                    assert_eq!(kernel.weight_at(offset), kernel.weight_at(-offset));
                }
            }
        }
    }

    #[test]
    fn sigma_and_size_never_decrease_along_the_table() {
        let table = KernelTable::new(KernelTableSpec::WIDE.with_steps(25));
        for pair in table.iter().collect::<Vec<_>>().windows(2) {
            assert!(pair[0].sigma() <= pair[1].sigma());
            assert!(pair[0].size() <= pair[1].size());
        }
    }

    #[test]
    fn table_has_at_least_two_steps() {
        let table = KernelTable::new(KernelTableSpec::PREVIEW.with_steps(0));
        assert_eq!(table.len(), 2);
        assert_eq!(table.step(0), 0.0);
        assert_eq!(table.step(1), 1.0);
    }

    #[test]
    fn weight_outside_kernel_is_zero() {
        let table = KernelTable::default();
        assert_eq!(table.weight(0, 2), 0.0);
        assert_eq!(table.weight(0, -7), 0.0);
    }

    #[test]
    fn discrete_taps_cover_every_texel() {
        let kernel = KernelTable::default().kernel(10).clone();
        let taps = kernel.taps(SampleReduction::Discrete, 32);

        assert_eq!(taps.len(), 9);
        assert_eq!(taps.offsets(), &[-4.0, -3.0, -2.0, -1.0, 0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(taps.weights(), kernel.weights());
    }

    #[test]
    fn bilinear_taps_merge_pairs_at_weighted_centroid() {
        let kernel = KernelTable::default().kernel(10).clone();
        let taps = kernel.taps(SampleReduction::Bilinear, 32);

        // radius 4 -> two merged samples per side plus the centre
        assert_eq!(taps.len(), 5);
        assert!((taps.total_weight() - 1.0).abs() < 1e-5);

        let w1 = kernel.weight_at(1);
        let w2 = kernel.weight_at(2);
        let expected_offset = (w1 + 2.0 * w2) / (w1 + w2);
        assert!((taps.offsets()[3] - expected_offset).abs() < 1e-6);
        assert!((taps.weights()[3] - (w1 + w2)).abs() < 1e-6);
        assert_eq!(taps.offsets()[1], -taps.offsets()[3]);
    }

    #[test]
    fn bilinear_keeps_odd_tail_tap_alone() {
        let kernel = GaussianKernel::sampled(1.0, 1.37);
        assert_eq!(kernel.radius(), 3);

        let taps = kernel.taps(SampleReduction::Bilinear, 32);
        assert_eq!(taps.len(), 5);
        assert!((taps.offsets()[4] - 3.0).abs() < 1e-6);
        assert!((taps.weights()[4] - kernel.weight_at(3)).abs() < 1e-7);
    }

    #[test]
    fn oversized_kernels_are_coarsened_to_fit() {
        let kernel = GaussianKernel::sampled(1.0, 9.0);
        assert_eq!(kernel.size(), 37);

        let taps = kernel.taps(SampleReduction::Discrete, 8);
        assert!(taps.len() <= 8);
        assert!((taps.total_weight() - 1.0).abs() < 1e-4);
        let outermost = taps.offsets()[taps.len() - 1];
        assert!(outermost > 9.0 && outermost <= 18.0);
    }

    #[test]
    fn blend_interpolates_between_neighbours() {
        let table = KernelTable::default();
        let blend = KernelBlend {
            lower: 3,
            upper: 4,
            fraction: 0.5,
        };
        let kernel = table.blend(&blend);

        assert_eq!(kernel.size(), 5);
        assert!((kernel.sigma() - (0.4075 + 0.53) / 2.0).abs() < 1e-5);
        let sum: f32 = kernel.weights().iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert_eq!(kernel.weight_at(2), kernel.weight_at(-2));
    }

    #[test]
    fn resolve_borrows_nearest_selection() {
        let table = KernelTable::default();
        let resolved = table.resolve(&Selection::Nearest(4));
        assert!(matches!(resolved, Cow::Borrowed(_)));
        assert_eq!(resolved.size(), 5);
    }
}
