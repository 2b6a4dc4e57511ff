//! Time-driven blur intensity.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::selector::clamp_intensity;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ease {
    #[default]
    Linear,
    InQuad,
    OutQuad,
    InOutQuad,
    InCubic,
    OutCubic,
    InOutCubic,
}

impl Ease {
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::InQuad => t * t,
            Self::OutQuad => 1.0 - (1.0 - t) * (1.0 - t),
            Self::InOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - ((-2.0 * t + 2.0).powi(2) / 2.0)
                }
            }
            Self::InCubic => t * t * t,
            Self::OutCubic => 1.0 - (1.0 - t).powi(3),
            Self::InOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - ((-2.0 * t + 2.0).powi(3) / 2.0)
                }
            }
        }
    }
}

/// Intensity the pipeline renders with, plus the animation driving it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlurState {
    pub current_intensity: f32,
    pub target_intensity: f32,
    pub animating: bool,
    pub start_time: Duration,
    pub duration: Duration,
    pub start_intensity: f32,
    pub ease: Ease,
}

impl BlurState {
    /// A state resting at `intensity`.
    pub fn still(intensity: f32) -> Self {
        let intensity = clamp_intensity(intensity);
        Self {
            current_intensity: intensity,
            target_intensity: intensity,
            animating: false,
            start_time: Duration::ZERO,
            duration: Duration::ZERO,
            start_intensity: intensity,
            ease: Ease::Linear,
        }
    }
}

impl Default for BlurState {
    fn default() -> Self {
        Self::still(0.0)
    }
}

/// Owns the [`BlurState`] and advances it on [`IntensityAnimator::tick`].
///
/// Times are offsets on the host's clock; the animator never reads a clock
/// itself. The last `now` passed to `tick` is the start time of animations
/// begun with [`IntensityAnimator::animate_to_intensity`].
#[derive(Debug, Clone, Default)]
pub struct IntensityAnimator {
    state: BlurState,
    clock: Duration,
    ease: Ease,
}

impl IntensityAnimator {
    pub fn new(ease: Ease) -> Self {
        Self {
            ease,
            ..Default::default()
        }
    }

    pub fn state(&self) -> &BlurState {
        &self.state
    }

    pub fn current_intensity(&self) -> f32 {
        self.state.current_intensity
    }

    pub fn target_intensity(&self) -> f32 {
        self.state.target_intensity
    }

    pub fn is_animating(&self) -> bool {
        self.state.animating
    }

    /// The last `now` passed to [`IntensityAnimator::tick`].
    pub fn clock(&self) -> Duration {
        self.clock
    }

    /// Jumps to `value`, cancelling any animation.
    pub fn set_intensity(&mut self, value: f32) {
        self.state = BlurState {
            ease: self.ease,
            ..BlurState::still(value)
        };
    }

    pub fn animate_to_intensity(&mut self, value: f32, duration: Duration) {
        self.animate_to_intensity_at(value, duration, self.clock);
    }

    /// Starts an animation from the current intensity. Replaces any running one.
    pub fn animate_to_intensity_at(&mut self, value: f32, duration: Duration, start: Duration) {
        let target = clamp_intensity(value);
        if duration.is_zero() {
            self.set_intensity(target);
            return;
        }

        tracing::trace!(
            from = self.state.current_intensity,
            to = target,
            ?duration,
            "blur animation started"
        );
        self.state = BlurState {
            current_intensity: self.state.current_intensity,
            target_intensity: target,
            animating: true,
            start_time: start,
            duration,
            start_intensity: self.state.current_intensity,
            ease: self.ease,
        };
    }

    /// Freezes the intensity where it currently is.
    pub fn stop_animation(&mut self) {
        let current = self.state.current_intensity;
        self.set_intensity(current);
    }

    /// Advances to `now` and returns the intensity to render with.
    pub fn tick(&mut self, now: Duration) -> f32 {
        self.clock = now;
        let state = &mut self.state;
        if !state.animating {
            return state.current_intensity;
        }

        let elapsed = now.saturating_sub(state.start_time).as_secs_f64();
        let fraction = (elapsed / state.duration.as_secs_f64()).clamp(0.0, 1.0);

        if fraction >= 1.0 {
            state.current_intensity = state.target_intensity;
            state.start_intensity = state.target_intensity;
            state.animating = false;
        } else {
            let eased = state.ease.apply(fraction);
            let from = state.start_intensity as f64;
            let to = state.target_intensity as f64;
            state.current_intensity = clamp_intensity((from + (to - from) * eased) as f32);
        }
        state.current_intensity
    }
}
