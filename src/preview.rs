use std::time::Duration;

use crate::animator::{BlurState, IntensityAnimator};
use crate::backend::Backend;
use crate::config::BlurConfig;
use crate::error::Result;
use crate::frame::VideoFrame;
use crate::pipeline::{BlurPipeline, FrameReport};

/// Blurred live preview: an animated intensity driving a [`BlurPipeline`].
///
/// `render_frame` ticks the animator before rendering, so every pass of a
/// frame sees the same intensity.
pub struct PreviewBlur<B: Backend> {
    animator: IntensityAnimator,
    pipeline: BlurPipeline<B>,
}

impl<B: Backend> PreviewBlur<B> {
    pub fn new(backend: B, config: BlurConfig) -> Self {
        let animator = IntensityAnimator::new(config.ease);
        Self {
            animator,
            pipeline: BlurPipeline::new(backend, config),
        }
    }

    pub fn pipeline(&self) -> &BlurPipeline<B> {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut BlurPipeline<B> {
        &mut self.pipeline
    }

    pub fn animator(&self) -> &IntensityAnimator {
        &self.animator
    }

    pub fn state(&self) -> &BlurState {
        self.animator.state()
    }

    /// Target intensity, the value last requested.
    pub fn blur(&self) -> f32 {
        self.animator.target_intensity()
    }

    pub fn set_blur(&mut self, value: f32) {
        self.animator.set_intensity(value);
    }

    /// Moves to `value` over the configured animation duration, or at once.
    ///
    /// The animation starts at the `now` of the last rendered frame, which is
    /// zero before the first one. A host whose clock is already running should
    /// call [`PreviewBlur::set_blur_animated_at`] before the first frame.
    pub fn set_blur_animated(&mut self, value: f32, animated: bool) {
        if animated {
            let duration = self.pipeline.config().animation_duration;
            self.animator.animate_to_intensity(value, duration);
        } else {
            self.animator.set_intensity(value);
        }
    }

    /// Animates to `value` starting at `now` on the host clock.
    pub fn set_blur_animated_at(&mut self, value: f32, now: Duration) {
        let duration = self.pipeline.config().animation_duration;
        self.animator.animate_to_intensity_at(value, duration, now);
    }

    pub fn set_blur_and_start_animated(&mut self, value: f32) {
        self.set_blur_animated(value, true);
    }

    /// Stops any running animation and jumps to `value`.
    pub fn set_blur_and_stop_animated(&mut self, value: f32) {
        self.animator.set_intensity(value);
    }

    pub fn render_frame(&mut self, frame: &VideoFrame<'_>, now: Duration) -> Result<FrameReport> {
        self.animator.tick(now);
        self.pipeline.render(frame, self.animator.state())
    }

    pub fn read_pixels(&mut self, report: &FrameReport) -> Result<Vec<u8>> {
        self.pipeline.read_pixels(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SoftwareBackend;
    use crate::frame::PixelFormat;
    use crate::shader::ShaderVariant;

    #[test]
    fn animated_blur_ramps_over_configured_duration() {
        let config = BlurConfig::default().with_animation_duration(Duration::from_secs(1));
        let mut preview = PreviewBlur::new(SoftwareBackend::new(), config);
        let pixels = vec![200u8; 4 * 4 * 4];
        let frame = VideoFrame::new(4, 4, PixelFormat::Rgba8, &pixels);

        preview.set_blur_and_start_animated(1.0);
        assert_eq!(preview.blur(), 1.0);

        let start = preview.render_frame(&frame, Duration::ZERO).unwrap();
        assert_eq!(start.variant, ShaderVariant::Disabled);

        let middle = preview
            .render_frame(&frame, Duration::from_millis(500))
            .unwrap();
        assert_eq!(middle.intensity, 0.5);
        assert_eq!(middle.kernel_index, Some(5));

        let end = preview.render_frame(&frame, Duration::from_secs(1)).unwrap();
        assert_eq!(end.intensity, 1.0);
        assert!(!preview.state().animating);
    }

    #[test]
    fn stop_animated_jumps_to_value() {
        let mut preview = PreviewBlur::new(SoftwareBackend::new(), BlurConfig::default());
        preview.set_blur_animated(1.0, true);
        preview.set_blur_and_stop_animated(0.3);
        assert!(!preview.state().animating);
        assert_eq!(preview.state().current_intensity, 0.3);
        assert_eq!(preview.blur(), 0.3);
    }

    #[test]
    fn animation_can_start_on_a_running_host_clock() {
        let config = BlurConfig::default().with_animation_duration(Duration::from_secs(1));
        let mut preview = PreviewBlur::new(SoftwareBackend::new(), config);
        let pixels = vec![200u8; 4 * 4 * 4];
        let frame = VideoFrame::new(4, 4, PixelFormat::Rgba8, &pixels);
        let launch = Duration::from_secs(3600);

        preview.set_blur_animated_at(1.0, launch);
        let first = preview.render_frame(&frame, launch).unwrap();
        assert_eq!(first.variant, ShaderVariant::Disabled);
        assert!(preview.state().animating);

        let middle = preview
            .render_frame(&frame, launch + Duration::from_millis(500))
            .unwrap();
        assert_eq!(middle.intensity, 0.5);
        assert_eq!(preview.animator().clock(), launch + Duration::from_millis(500));

        // Later requests start from the clock of the last frame.
        preview.set_blur_animated(0.0, true);
        assert_eq!(preview.state().start_time, launch + Duration::from_millis(500));
    }

    #[test]
    fn unanimated_set_is_immediate() {
        let mut preview = PreviewBlur::new(SoftwareBackend::new(), BlurConfig::default());
        preview.set_blur_animated(0.6, false);
        assert_eq!(preview.state().current_intensity, 0.6);
        preview.set_blur(2.0);
        assert_eq!(preview.blur(), 1.0);
    }
}
