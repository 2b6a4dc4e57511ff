/// Animated preview blur driven frame by frame on the software backend.
///
/// Run with:   RUST_LOG=lumablur=trace cargo test --test preview_animation
use std::time::Duration;

use lumablur::{BlurConfig, Ease, PreviewBlur, ShaderVariant, SoftwareBackend};
use lumablur_test_frames::{pixel_at, TestFrame};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

#[test]
fn blur_in_widens_kernel_every_frame() {
    init_tracing();
    let frame = TestFrame::single_bright_pixel(21, 21, 10, 10);
    let mut preview = PreviewBlur::new(SoftwareBackend::new(), BlurConfig::default());
    preview.set_blur_and_start_animated(1.0);

    let mut previous_index = 0;
    let mut previous_peak = u8::MAX;
    for ms in (0..=300).step_by(30) {
        let report = preview.render_frame(&frame.as_rgba(), millis(ms)).unwrap();
        let peak = pixel_at(&preview.read_pixels(&report).unwrap(), 21, 10, 10)[0];

        let index = report.kernel_index.unwrap_or(0);
        assert!(index >= previous_index, "kernel index fell at {ms} ms");
        assert!(peak <= previous_peak, "peak rose at {ms} ms");
        previous_index = index;
        previous_peak = peak;
    }

    assert_eq!(previous_index, 10);
    assert!(!preview.state().animating);
}

#[test]
fn retargeting_mid_animation_starts_from_current_value() {
    init_tracing();
    let config = BlurConfig::default().with_animation_duration(Duration::from_secs(1));
    let frame = TestFrame::checkerboard(8, 8, 1);
    let mut preview = PreviewBlur::new(SoftwareBackend::new(), config);

    preview.set_blur_and_start_animated(1.0);
    preview.render_frame(&frame.as_rgba(), Duration::ZERO).unwrap();
    let halfway = preview.render_frame(&frame.as_rgba(), millis(600)).unwrap();
    assert!((halfway.intensity - 0.6).abs() < 1e-6);

    preview.set_blur_and_start_animated(0.0);
    assert_eq!(preview.state().start_intensity, halfway.intensity);
    assert_eq!(preview.state().start_time, millis(600));

    let back = preview.render_frame(&frame.as_rgba(), millis(1100)).unwrap();
    assert!((back.intensity - 0.3).abs() < 1e-6);

    let done = preview.render_frame(&frame.as_rgba(), millis(1600)).unwrap();
    assert_eq!(done.intensity, 0.0);
    assert_eq!(done.variant, ShaderVariant::Disabled);
    assert_eq!(preview.read_pixels(&done).unwrap(), frame.pixels);
}

#[test]
fn eased_animation_lags_linear_early_on() {
    let config = BlurConfig::default().with_animation_duration(millis(400));
    let frame = TestFrame::solid(4, 4, [10, 20, 30, 255]);
    let mut linear = PreviewBlur::new(SoftwareBackend::new(), config.clone());
    let mut eased = PreviewBlur::new(SoftwareBackend::new(), config.with_ease(Ease::InCubic));

    for preview in [&mut linear, &mut eased] {
        preview.set_blur_and_start_animated(1.0);
    }
    let linear_report = linear.render_frame(&frame.as_rgba(), millis(100)).unwrap();
    let eased_report = eased.render_frame(&frame.as_rgba(), millis(100)).unwrap();

    assert!((linear_report.intensity - 0.25).abs() < 1e-6);
    assert!(eased_report.intensity < linear_report.intensity);
    assert_eq!(eased_report.variant, ShaderVariant::SeparableTwoPass);
}

#[test]
fn stopping_freezes_the_rendered_intensity() {
    let frame = TestFrame::gradient(6, 6);
    let mut preview = PreviewBlur::new(SoftwareBackend::new(), BlurConfig::default());
    preview.set_blur_and_start_animated(1.0);
    preview.render_frame(&frame.as_rgba(), Duration::ZERO).unwrap();
    let moving = preview.render_frame(&frame.as_rgba(), millis(150)).unwrap();

    preview.set_blur_and_stop_animated(moving.intensity);
    let frozen = preview.render_frame(&frame.as_rgba(), millis(900)).unwrap();
    assert_eq!(frozen.intensity, moving.intensity);
    assert_eq!(frozen.kernel_index, moving.kernel_index);
}
