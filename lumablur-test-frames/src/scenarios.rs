//! Rendering checks shared by the software and GPU test-suites.
//!
//! Every scenario returns human-readable failures; an empty list means it passed.

use lumablur::{
    Backend, BlurPipeline, BlurState, FrameReport, NormalizedRect, PixelFormat, Result,
    ShaderVariant, TargetRole, VideoFrame, INTENSITY_EPSILON,
};

use crate::frames::{channel_sum, max_channel_difference, pixel_at, TestFrame};

fn render<B: Backend>(
    pipeline: &mut BlurPipeline<B>,
    frame: &VideoFrame<'_>,
    intensity: f32,
) -> Result<(FrameReport, Vec<u8>)> {
    let report = pipeline.render(frame, &BlurState::still(intensity))?;
    let pixels = pipeline.read_pixels(&report)?;
    Ok((report, pixels))
}

/// Intensity at or below epsilon reproduces the input, for RGBA and BGRA input.
pub fn passthrough_is_exact<B: Backend>(pipeline: &mut BlurPipeline<B>) -> Vec<String> {
    let mut failures = Vec::new();
    let frame = TestFrame::gradient(23, 17);
    let bgra = frame.to_bgra();
    let bgra_frame = VideoFrame::new(frame.width, frame.height, PixelFormat::Bgra8, &bgra);

    let inputs = [
        ("rgba", frame.as_rgba(), 0.0),
        ("rgba at epsilon", frame.as_rgba(), INTENSITY_EPSILON),
        ("bgra", bgra_frame, 0.0),
    ];
    for (label, input, intensity) in inputs {
        match render(pipeline, &input, intensity) {
            Ok((report, pixels)) => {
                if report.variant != ShaderVariant::Disabled {
                    failures.push(format!("[{label}] rendered with {:?}", report.variant));
                }
                if pixels != frame.pixels {
                    failures.push(format!(
                        "[{label}] output differs from input by up to {}",
                        max_channel_difference(&pixels, &frame.pixels)
                    ));
                }
            }
            Err(error) => failures.push(format!("[{label}] render failed: {error}")),
        }
    }
    failures
}

/// Two separable passes agree with the single 2-D convolution.
pub fn separable_matches_direct<B: Backend>(
    separable: &mut BlurPipeline<B>,
    direct: &mut BlurPipeline<B>,
    tolerance: u8,
) -> Vec<String> {
    let mut failures = Vec::new();
    let frames = [
        ("bright pixel", TestFrame::single_bright_pixel(33, 33, 16, 16)),
        ("checkerboard 1px", TestFrame::checkerboard(32, 32, 1)),
        ("checkerboard 3px", TestFrame::checkerboard(32, 32, 3)),
    ];

    for (label, frame) in &frames {
        for intensity in [0.3, 0.6, 1.0] {
            let two_pass = render(separable, &frame.as_rgba(), intensity);
            let one_pass = render(direct, &frame.as_rgba(), intensity);
            match (two_pass, one_pass) {
                (Ok((two_pass_report, two_pass)), Ok((one_pass_report, one_pass))) => {
                    if two_pass_report.variant != ShaderVariant::SeparableTwoPass
                        || one_pass_report.variant != ShaderVariant::DirectConvolution
                    {
                        failures.push(format!(
                            "[{label} @ {intensity}] unexpected variants {:?} / {:?}",
                            two_pass_report.variant, one_pass_report.variant
                        ));
                    }
                    let difference = max_channel_difference(&two_pass, &one_pass);
                    if difference > tolerance {
                        failures.push(format!(
                            "[{label} @ {intensity}] separable and direct differ by {difference}"
                        ));
                    }
                }
                (Err(error), _) | (_, Err(error)) => {
                    failures.push(format!("[{label} @ {intensity}] render failed: {error}"));
                }
            }
        }
    }
    failures
}

/// A single bright pixel spreads evenly in all four directions, keeps its
/// energy, and leaves alpha untouched.
pub fn energy_spreads_symmetrically<B: Backend>(
    pipeline: &mut BlurPipeline<B>,
    tolerance: u8,
) -> Vec<String> {
    let mut failures = Vec::new();
    let (size, center) = (33, 16);
    let frame = TestFrame::single_bright_pixel(size, size, center, center);

    let pixels = match render(pipeline, &frame.as_rgba(), 1.0) {
        Ok((_, pixels)) => pixels,
        Err(error) => return vec![format!("render failed: {error}")],
    };
    let red = |x: u32, y: u32| pixel_at(&pixels, size, x, y)[0];

    let peak = red(center, center);
    if peak == 0 || peak == 255 {
        failures.push(format!("centre was not blurred (value {peak})"));
    }

    for distance in 1..=4 {
        let samples = [
            red(center + distance, center),
            red(center - distance, center),
            red(center, center + distance),
            red(center, center - distance),
        ];
        let min = samples.iter().copied().min().unwrap_or(0);
        let max = samples.iter().copied().max().unwrap_or(0);
        if max - min > tolerance {
            failures.push(format!("asymmetric spread at distance {distance}: {samples:?}"));
        }
        if red(center + distance, center) > red(center + distance - 1, center) {
            failures.push(format!("spread increases at distance {distance}"));
        }
    }

    let energy = channel_sum(&pixels, 0);
    if energy.abs_diff(255) > 24 {
        failures.push(format!("red energy {energy} drifted from 255"));
    }
    let min_alpha = pixels.iter().skip(3).step_by(4).copied().min().unwrap_or(0);
    if min_alpha != 255 {
        failures.push(format!("alpha dropped to {min_alpha}"));
    }
    failures
}

/// Pixels outside the bounds stay bit-identical; pixels well inside are blurred.
pub fn bounded_region_preserves_outside<B: Backend>(pipeline: &mut BlurPipeline<B>) -> Vec<String> {
    let mut failures = Vec::new();
    let region = NormalizedRect::new(0.25, 0.25, 0.75, 0.75);
    let frame = TestFrame::checkerboard(32, 32, 1);
    pipeline.set_bounded_region(Some(region));

    let result = render(pipeline, &frame.as_rgba(), 1.0);
    pipeline.set_bounded_region(None);

    let (report, pixels) = match result {
        Ok(rendered) => rendered,
        Err(error) => return vec![format!("render failed: {error}")],
    };
    if report.variant != ShaderVariant::SeparableTwoPassBounded {
        failures.push(format!("rendered with {:?}", report.variant));
    }

    let texel = 1.0 / frame.width as f32;
    let (mut outside, mut inside) = (0, 0);
    for y in 0..frame.height {
        for x in 0..frame.width {
            let u = (x as f32 + 0.5) / frame.width as f32;
            let v = (y as f32 + 0.5) / frame.height as f32;
            let expanded = NormalizedRect::new(
                region.min_x - texel,
                region.min_y - texel,
                region.max_x + texel,
                region.max_y + texel,
            );
            let shrunk = NormalizedRect::new(
                region.min_x + 5.0 * texel,
                region.min_y + 5.0 * texel,
                region.max_x - 5.0 * texel,
                region.max_y - 5.0 * texel,
            );

            let actual = pixel_at(&pixels, frame.width, x, y);
            let original = frame.pixel(x, y);
            if !expanded.contains(u, v) {
                outside += 1;
                if actual != original {
                    failures.push(format!(
                        "outside pixel ({x},{y}) changed from {original:?} to {actual:?}"
                    ));
                }
            } else if shrunk.contains(u, v) {
                inside += 1;
                if actual[0] > 200 || actual[0] < 55 {
                    failures.push(format!("inside pixel ({x},{y}) not blurred: {actual:?}"));
                }
            }
        }
    }
    if outside == 0 || inside == 0 {
        failures.push(format!("degenerate region: {outside} outside, {inside} inside"));
    }
    failures
}

/// Merged bilinear taps approximate the discrete kernel with fewer samples.
pub fn bilinear_matches_discrete<B: Backend>(
    discrete: &mut BlurPipeline<B>,
    bilinear: &mut BlurPipeline<B>,
    tolerance: u8,
) -> Vec<String> {
    let mut failures = Vec::new();
    let frames = [
        ("bright pixel", TestFrame::single_bright_pixel(33, 33, 16, 16)),
        ("checkerboard 2px", TestFrame::checkerboard(32, 32, 2)),
        ("gradient", TestFrame::gradient(29, 19)),
    ];

    for (label, frame) in &frames {
        for intensity in [0.5, 0.8, 1.0] {
            let reference = render(discrete, &frame.as_rgba(), intensity);
            let reduced = render(bilinear, &frame.as_rgba(), intensity);
            match (reference, reduced) {
                (Ok((reference_report, reference)), Ok((reduced_report, reduced))) => {
                    if reduced_report.taps > reference_report.taps {
                        failures.push(format!(
                            "[{label} @ {intensity}] bilinear used {} taps, discrete {}",
                            reduced_report.taps, reference_report.taps
                        ));
                    }
                    let difference = max_channel_difference(&reference, &reduced);
                    if difference > tolerance {
                        failures.push(format!(
                            "[{label} @ {intensity}] bilinear differs by {difference}"
                        ));
                    }
                }
                (Err(error), _) | (_, Err(error)) => {
                    failures.push(format!("[{label} @ {intensity}] render failed: {error}"));
                }
            }
        }
    }
    failures
}

/// Each size change recreates every target exactly once.
pub fn resize_recreates_targets_once<B: Backend>(pipeline: &mut BlurPipeline<B>) -> Vec<String> {
    let mut failures = Vec::new();
    let small = TestFrame::checkerboard(16, 12, 2);
    let large = TestFrame::checkerboard(24, 20, 2);

    for frame in [&small, &small, &large, &large, &large] {
        match render(pipeline, &frame.as_rgba(), 0.7) {
            Ok((report, pixels)) => {
                if (report.width, report.height) != (frame.width, frame.height)
                    || pixels.len() != frame.pixels.len()
                {
                    failures.push(format!(
                        "output is {}x{} for a {}x{} frame",
                        report.width, report.height, frame.width, frame.height
                    ));
                }
            }
            Err(error) => failures.push(format!("render failed: {error}")),
        }
    }

    for role in [TargetRole::Source, TargetRole::Intermediate, TargetRole::Output] {
        let recreations = pipeline.targets().recreations(role);
        if recreations != 1 {
            failures.push(format!("{role} recreated {recreations} times"));
        }
    }
    failures
}
