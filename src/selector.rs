//! Maps a continuous blur intensity to an entry of the kernel table.

use serde::{Deserialize, Serialize};

use crate::kernel::KernelTable;

/// How an intensity that falls between two table steps is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    #[default]
    Nearest,
    Interpolated,
}

/// Position between two neighbouring table entries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelBlend {
    pub lower: usize,
    pub upper: usize,
    /// Weight of `upper`, in `[0, 1]`.
    pub fraction: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Selection {
    Nearest(usize),
    Blend(KernelBlend),
}

impl Selection {
    /// Table index reported for this selection: the lower entry of a blend,
    /// unless the blend sits entirely on the upper one.
    pub fn index(&self) -> usize {
        match self {
            Selection::Nearest(index) => *index,
            Selection::Blend(blend) if blend.fraction >= 1.0 => blend.upper,
            Selection::Blend(blend) => blend.lower,
        }
    }
}

/// Clamps an intensity into `[0, 1]`. NaN becomes zero.
pub fn clamp_intensity(value: f32) -> f32 {
    if value.is_nan() {
        tracing::trace!("NaN blur intensity treated as 0");
        return 0.0;
    }
    let clamped = value.clamp(0.0, 1.0);
    if clamped != value {
        tracing::trace!(value, clamped, "blur intensity clamped");
    }
    clamped
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelSelector {
    entries: usize,
}

impl KernelSelector {
    pub fn new(entries: usize) -> Self {
        Self {
            entries: entries.max(2),
        }
    }

    pub fn for_table(table: &KernelTable) -> Self {
        Self::new(table.len())
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    fn position(&self, intensity: f32) -> f32 {
        clamp_intensity(intensity) * (self.entries - 1) as f32
    }

    pub fn nearest(&self, intensity: f32) -> usize {
        (self.position(intensity).round() as usize).min(self.entries - 1)
    }

    pub fn blend(&self, intensity: f32) -> KernelBlend {
        let position = self.position(intensity);
        let lower = (position.floor() as usize).min(self.entries - 2);
        KernelBlend {
            lower,
            upper: lower + 1,
            fraction: (position - lower as f32).clamp(0.0, 1.0),
        }
    }

    pub fn select(&self, intensity: f32, policy: SelectionPolicy) -> Selection {
        match policy {
            SelectionPolicy::Nearest => Selection::Nearest(self.nearest(intensity)),
            SelectionPolicy::Interpolated => Selection::Blend(self.blend(intensity)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_rounds_to_closest_step() {
        let selector = KernelSelector::new(11);
        assert_eq!(selector.nearest(0.0), 0);
        assert_eq!(selector.nearest(0.04), 0);
        assert_eq!(selector.nearest(0.06), 1);
        assert_eq!(selector.nearest(0.5), 5);
        assert_eq!(selector.nearest(1.0), 10);
    }

    #[test]
    fn out_of_range_and_nan_are_clamped() {
        let selector = KernelSelector::new(11);
        assert_eq!(selector.nearest(-3.0), 0);
        assert_eq!(selector.nearest(7.5), 10);
        assert_eq!(selector.nearest(f32::NAN), 0);
        assert_eq!(clamp_intensity(f32::INFINITY), 1.0);
        assert_eq!(clamp_intensity(f32::NEG_INFINITY), 0.0);
    }

    #[test]
    fn selection_is_monotonic() {
        let selector = KernelSelector::new(11);
        let mut previous_index = 0;
        let mut previous_position = 0.0;
        for step in 0..=1000 {
            let intensity = step as f32 / 1000.0;
            let index = selector.nearest(intensity);
            assert!(index >= previous_index);
            previous_index = index;

            let blend = selector.blend(intensity);
            let position = blend.lower as f32 + blend.fraction;
            assert!(position >= previous_position);
            previous_position = position;
        }
    }

    #[test]
    fn blend_stays_inside_table_at_the_top() {
        let selector = KernelSelector::new(11);
        let blend = selector.blend(1.0);
        assert_eq!(blend.lower, 9);
        assert_eq!(blend.upper, 10);
        assert_eq!(blend.fraction, 1.0);
        assert_eq!(Selection::Blend(blend).index(), 10);
    }

    #[test]
    fn blend_fraction_between_steps() {
        let selector = KernelSelector::new(5);
        let blend = selector.blend(0.3);
        assert_eq!((blend.lower, blend.upper), (1, 2));
        assert!((blend.fraction - 0.2).abs() < 1e-5);
    }

    #[test]
    fn select_follows_policy() {
        let selector = KernelSelector::new(11);
        assert_eq!(
            selector.select(0.42, SelectionPolicy::Nearest),
            Selection::Nearest(4)
        );
        match selector.select(0.42, SelectionPolicy::Interpolated) {
            Selection::Blend(blend) => assert_eq!(blend.lower, 4),
            other => panic!("unexpected selection {other:?}"),
        }
    }
}
