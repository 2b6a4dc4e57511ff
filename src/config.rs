use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::animator::Ease;
use crate::kernel::{KernelTableSpec, SampleReduction};
use crate::selector::SelectionPolicy;
use crate::shader::{ShaderVariant, TapTier};

/// Upper bound for `max_tap_count`; larger uniform arrays buy nothing for a
/// preview blur.
pub const MAX_TAP_COUNT_LIMIT: usize = 128;

/// Rectangle in normalized texture coordinates, origin top-left, `y` down.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRect {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl NormalizedRect {
    pub const FULL: NormalizedRect = NormalizedRect {
        min_x: 0.0,
        min_y: 0.0,
        max_x: 1.0,
        max_y: 1.0,
    };

    /// Builds a rectangle from two corners, ordering and clamping them into
    /// `[0, 1]`.
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        let clamp = |value: f32| if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        let (x0, x1) = (clamp(x0), clamp(x1));
        let (y0, y1) = (clamp(y0), clamp(y1));
        Self {
            min_x: x0.min(x1),
            min_y: y0.min(y1),
            max_x: x0.max(x1),
            max_y: y0.max(y1),
        }
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        !(x < self.min_x || y < self.min_y || x > self.max_x || y > self.max_y)
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }

    fn normalized(self) -> Self {
        Self::new(self.min_x, self.min_y, self.max_x, self.max_y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlurStrategy {
    #[default]
    Separable,
    /// Single-pass 2-D convolution; the reference path.
    Direct,
}

/// Pipeline and animation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlurConfig {
    /// Table steps and sigma range; `steps` is the kernel table size.
    pub kernel_spec: KernelTableSpec,
    pub max_tap_count: usize,
    pub bounded_region: Option<NormalizedRect>,
    pub sample_reduction: SampleReduction,
    pub strategy: BlurStrategy,
    pub selection: SelectionPolicy,
    pub ease: Ease,
    pub animation_duration: Duration,
}

impl Default for BlurConfig {
    fn default() -> Self {
        Self {
            kernel_spec: KernelTableSpec::PREVIEW,
            max_tap_count: 32,
            bounded_region: None,
            sample_reduction: SampleReduction::Discrete,
            strategy: BlurStrategy::Separable,
            selection: SelectionPolicy::Nearest,
            ease: Ease::Linear,
            animation_duration: Duration::from_millis(300),
        }
    }
}

impl BlurConfig {
    pub fn with_kernel_spec(mut self, spec: KernelTableSpec) -> Self {
        self.kernel_spec = spec;
        self
    }

    /// Keeps the sigma range and changes the number of table entries.
    pub fn with_kernel_table_size(mut self, size: usize) -> Self {
        self.kernel_spec.steps = size;
        self
    }

    pub fn kernel_table_size(&self) -> usize {
        self.kernel_spec.steps
    }

    pub fn with_max_tap_count(mut self, max_tap_count: usize) -> Self {
        self.max_tap_count = max_tap_count;
        self
    }

    pub fn with_bounded_region(mut self, region: Option<NormalizedRect>) -> Self {
        self.bounded_region = region;
        self
    }

    pub fn with_sample_reduction(mut self, reduction: SampleReduction) -> Self {
        self.sample_reduction = reduction;
        self
    }

    pub fn with_strategy(mut self, strategy: BlurStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_selection(mut self, selection: SelectionPolicy) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_ease(mut self, ease: Ease) -> Self {
        self.ease = ease;
        self
    }

    pub fn with_animation_duration(mut self, duration: Duration) -> Self {
        self.animation_duration = duration;
        self
    }

    pub fn table_spec(&self) -> KernelTableSpec {
        self.kernel_spec
    }

    /// Variant used for blurred frames.
    pub fn variant(&self) -> ShaderVariant {
        match (self.strategy, self.bounded_region) {
            (BlurStrategy::Direct, _) => ShaderVariant::DirectConvolution,
            (BlurStrategy::Separable, Some(_)) => ShaderVariant::SeparableTwoPassBounded,
            (BlurStrategy::Separable, None) => ShaderVariant::SeparableTwoPass,
        }
    }

    /// Clamps out-of-range values, logging each adjustment.
    pub fn validated(mut self) -> Self {
        if self.kernel_spec.steps < 2 {
            tracing::warn!(
                kernel_table_size = self.kernel_spec.steps,
                "kernel table needs at least 2 entries, using 2"
            );
            self.kernel_spec.steps = 2;
        }

        let min_taps = TapTier::MIN as usize;
        if !(min_taps..=MAX_TAP_COUNT_LIMIT).contains(&self.max_tap_count) {
            let clamped = self.max_tap_count.clamp(min_taps, MAX_TAP_COUNT_LIMIT);
            tracing::warn!(
                max_tap_count = self.max_tap_count,
                clamped,
                "max_tap_count out of range"
            );
            self.max_tap_count = clamped;
        }

        let spec = &mut self.kernel_spec;
        if !(spec.sigma_min > 0.0 && spec.sigma_max >= spec.sigma_min) {
            tracing::warn!(
                sigma_min = spec.sigma_min,
                sigma_max = spec.sigma_max,
                "invalid sigma range, using the preview table"
            );
            spec.sigma_min = KernelTableSpec::PREVIEW.sigma_min;
            spec.sigma_max = KernelTableSpec::PREVIEW.sigma_max;
        }

        if let Some(region) = self.bounded_region {
            let normalized = region.normalized();
            if normalized != region {
                tracing::warn!(?region, ?normalized, "bounded region clamped to [0, 1]");
            }
            if self.strategy == BlurStrategy::Direct {
                tracing::warn!("bounded region is ignored by the direct strategy");
            }
            self.bounded_region = Some(normalized);
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::KernelTable;

    #[test]
    fn defaults_match_preview_layer() {
        let config = BlurConfig::default();
        assert_eq!(config.kernel_table_size(), 11);
        assert_eq!(config.max_tap_count, 32);
        assert_eq!(config.animation_duration, Duration::from_millis(300));
        assert_eq!(config.variant(), ShaderVariant::SeparableTwoPass);
    }

    #[test]
    fn bounded_region_selects_bounded_variant() {
        let config = BlurConfig::default().with_bounded_region(Some(NormalizedRect::new(
            0.25, 0.25, 0.75, 0.75,
        )));
        assert_eq!(config.variant(), ShaderVariant::SeparableTwoPassBounded);

        let direct = config.with_strategy(BlurStrategy::Direct);
        assert_eq!(direct.variant(), ShaderVariant::DirectConvolution);
    }

    #[test]
    fn validated_clamps_out_of_range_values() {
        let config = BlurConfig::default()
            .with_kernel_table_size(1)
            .with_max_tap_count(4)
            .with_bounded_region(Some(NormalizedRect {
                min_x: 0.9,
                min_y: -1.0,
                max_x: 0.1,
                max_y: 2.0,
            }))
            .validated();

        assert_eq!(config.kernel_table_size(), 2);
        assert_eq!(config.max_tap_count, 8);
        assert_eq!(
            config.bounded_region,
            Some(NormalizedRect::new(0.1, 0.0, 0.9, 1.0))
        );
        assert_eq!(
            BlurConfig::default().with_max_tap_count(4096).validated().max_tap_count,
            MAX_TAP_COUNT_LIMIT
        );
    }

    #[test]
    fn rect_contains_is_inclusive() {
        let rect = NormalizedRect::new(0.25, 0.25, 0.75, 0.75);
        assert!(rect.contains(0.25, 0.75));
        assert!(rect.contains(0.5, 0.5));
        assert!(!rect.contains(0.2, 0.5));
        assert!(!rect.contains(0.5, 0.8));
    }

    #[test]
    fn partial_config_takes_table_size_from_kernel_spec() {
        let config: BlurConfig = serde_json::from_str(
            r#"{
                "sample_reduction": "bilinear",
                "kernel_spec": { "steps": 21, "sigma_min": 0.5, "sigma_max": 3.0 },
                "ease": "in_out_quad"
            }"#,
        )
        .expect("config parses");

        assert_eq!(config.sample_reduction, SampleReduction::Bilinear);
        assert_eq!(config.kernel_table_size(), 21);
        assert_eq!(KernelTable::new(config.table_spec()).len(), 21);
        assert_eq!(config.ease, Ease::InOutQuad);
        assert_eq!(config.max_tap_count, 32);
    }
}
