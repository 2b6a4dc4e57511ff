//! Per-frame render sequence.
//!
//! A frame is uploaded into the `Source` target and then, depending on the
//! intensity and configuration, copied or blurred into `Output`:
//!
//! - intensity at or below [`INTENSITY_EPSILON`]: one unfiltered copy;
//! - separable: a horizontal pass into `Intermediate`, then a vertical pass
//!   into `Output`;
//! - direct: one 2-D convolution pass into `Output`.
//!
//! Any program, target or draw failure degrades the frame to the unfiltered
//! copy. If even the copy cannot run, the report points at `Source`.

use smallvec::SmallVec;

use crate::animator::BlurState;
use crate::backend::Backend;
use crate::config::{BlurConfig, NormalizedRect};
use crate::error::{BlurError, Result};
use crate::frame::VideoFrame;
use crate::kernel::{KernelTable, KernelTaps, SampleReduction};
use crate::program::ProgramCache;
use crate::render_target::{RenderTargetManager, TargetRole};
use crate::selector::{clamp_intensity, KernelSelector};
use crate::shader::{PassUniforms, ShaderVariant, TapTier};

/// Intensities at or below this render an unfiltered copy.
pub const INTENSITY_EPSILON: f32 = 1e-3;

/// What was rendered for a frame and where to find it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    /// Target holding the finished frame.
    pub role: TargetRole,
    pub variant: ShaderVariant,
    pub kernel_index: Option<usize>,
    /// Samples per pass (per axis for the direct variant).
    pub taps: usize,
    /// True when the configured variant could not run for this frame.
    pub degraded: bool,
    pub intensity: f32,
    pub width: u32,
    pub height: u32,
}

struct PlannedPass {
    label: &'static str,
    source: TargetRole,
    destination: TargetRole,
    uniforms: PassUniforms,
}

fn plan_passes(
    variant: ShaderVariant,
    taps: &KernelTaps,
    width: u32,
    height: u32,
    bounds: NormalizedRect,
) -> SmallVec<[PlannedPass; 2]> {
    let mut passes = SmallVec::new();
    match variant {
        ShaderVariant::Disabled => passes.push(PlannedPass {
            label: "passthrough",
            source: TargetRole::Source,
            destination: TargetRole::Output,
            uniforms: PassUniforms::passthrough(),
        }),
        ShaderVariant::DirectConvolution => passes.push(PlannedPass {
            label: "direct",
            source: TargetRole::Source,
            destination: TargetRole::Output,
            uniforms: PassUniforms::direct(taps, width, height),
        }),
        ShaderVariant::SeparableTwoPass | ShaderVariant::SeparableTwoPassBounded => {
            passes.push(PlannedPass {
                label: "horizontal",
                source: TargetRole::Source,
                destination: TargetRole::Intermediate,
                uniforms: PassUniforms::horizontal(taps, width, height, bounds),
            });
            passes.push(PlannedPass {
                label: "vertical",
                source: TargetRole::Intermediate,
                destination: TargetRole::Output,
                uniforms: PassUniforms::vertical(taps, width, height, bounds),
            });
        }
    }
    passes
}

pub struct BlurPipeline<B: Backend> {
    backend: B,
    config: BlurConfig,
    table: KernelTable,
    selector: KernelSelector,
    programs: ProgramCache<B>,
    targets: RenderTargetManager<B>,
    diagnostics: Vec<BlurError>,
}

impl<B: Backend> BlurPipeline<B> {
    pub fn new(backend: B, config: BlurConfig) -> Self {
        let config = config.validated();
        let table = KernelTable::new(config.table_spec());
        let selector = KernelSelector::for_table(&table);

        Self {
            backend,
            config,
            table,
            selector,
            programs: ProgramCache::new(),
            targets: RenderTargetManager::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn config(&self) -> &BlurConfig {
        &self.config
    }

    pub fn kernel_table(&self) -> &KernelTable {
        &self.table
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn programs(&self) -> &ProgramCache<B> {
        &self.programs
    }

    pub fn targets(&self) -> &RenderTargetManager<B> {
        &self.targets
    }

    pub fn set_bounded_region(&mut self, region: Option<NormalizedRect>) {
        self.config.bounded_region = region.map(|rect| {
            NormalizedRect::new(rect.min_x, rect.min_y, rect.max_x, rect.max_y)
        });
    }

    pub fn set_sample_reduction(&mut self, reduction: SampleReduction) {
        self.config.sample_reduction = reduction;
    }

    /// Errors reported since the last call. Each failure appears once.
    pub fn take_diagnostics(&mut self) -> Vec<BlurError> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn output_texture(&self, report: &FrameReport) -> Option<&B::Texture> {
        self.targets.get(report.role).map(|target| target.texture())
    }

    /// Reads the finished frame back as tightly packed RGBA.
    pub fn read_pixels(&mut self, report: &FrameReport) -> Result<Vec<u8>> {
        let target = self
            .targets
            .get(report.role)
            .ok_or_else(|| BlurError::Readback(format!("no {} render target", report.role)))?;
        self.backend.read_pixels(target.texture())
    }

    fn report(&mut self, error: BlurError) {
        if error.is_cached_failure() {
            tracing::trace!(%error, "skipping previously failed resource");
            return;
        }
        tracing::warn!(%error, "blur degraded to pass-through");
        self.diagnostics.push(error);
    }

    /// Renders one frame at the state's current intensity.
    ///
    /// Only an invalid frame or a source target that cannot be populated is an
    /// error; every other failure degrades the frame and is queued in
    /// [`BlurPipeline::take_diagnostics`].
    pub fn render(&mut self, frame: &VideoFrame<'_>, state: &BlurState) -> Result<FrameReport> {
        frame.validate()?;
        let (width, height) = (frame.width, frame.height);

        if let Err(error) = self.upload_source(frame) {
            let returned = error.clone();
            self.report(error);
            return Err(returned);
        }

        let intensity = clamp_intensity(state.current_intensity);
        if intensity <= INTENSITY_EPSILON {
            return Ok(self.passthrough(width, height, intensity, false));
        }

        match self.blur(width, height, intensity) {
            Ok(report) => Ok(report),
            Err(error) => {
                self.report(error);
                Ok(self.passthrough(width, height, intensity, true))
            }
        }
    }

    fn upload_source(&mut self, frame: &VideoFrame<'_>) -> Result<()> {
        let source = self
            .targets
            .ensure(&mut self.backend, TargetRole::Source, frame.width, frame.height)?;
        self.backend.upload(source.texture(), frame)
    }

    fn passthrough(
        &mut self,
        width: u32,
        height: u32,
        intensity: f32,
        degraded: bool,
    ) -> FrameReport {
        let mut report = FrameReport {
            role: TargetRole::Output,
            variant: ShaderVariant::Disabled,
            kernel_index: None,
            taps: 0,
            degraded,
            intensity,
            width,
            height,
        };

        let copied = self.run_passes(
            ShaderVariant::Disabled,
            TapTier::NONE,
            &KernelTaps::default(),
            width,
            height,
        );
        if let Err(error) = copied {
            self.report(error);
            report.role = TargetRole::Source;
            report.degraded = true;
        }
        report
    }

    fn blur(&mut self, width: u32, height: u32, intensity: f32) -> Result<FrameReport> {
        let selection = self.selector.select(intensity, self.config.selection);
        let taps = self
            .table
            .resolve(&selection)
            .taps(self.config.sample_reduction, self.config.max_tap_count);
        let tier = TapTier::for_taps(taps.len(), self.config.max_tap_count);
        let variant = self.config.variant();

        tracing::trace!(
            intensity,
            kernel = selection.index(),
            taps = taps.len(),
            ?variant,
            "blurring frame"
        );
        self.run_passes(variant, tier, &taps, width, height)?;

        Ok(FrameReport {
            role: TargetRole::Output,
            variant,
            kernel_index: Some(selection.index()),
            taps: taps.len(),
            degraded: false,
            intensity,
            width,
            height,
        })
    }

    fn run_passes(
        &mut self,
        variant: ShaderVariant,
        tier: TapTier,
        taps: &KernelTaps,
        width: u32,
        height: u32,
    ) -> Result<()> {
        let program = self.programs.program(&mut self.backend, variant, tier)?;
        let bounds = self.config.bounded_region.unwrap_or(NormalizedRect::FULL);
        let passes = plan_passes(variant, taps, width, height, bounds);

        for pass in &passes {
            self.targets
                .ensure(&mut self.backend, pass.destination, width, height)?;
        }
        for pass in &passes {
            let binding = self.targets.bind(pass.destination);
            binding.draw_from(
                &mut self.backend,
                pass.source,
                pass.label,
                &program,
                &pass.uniforms,
            )?;
        }
        Ok(())
    }
}

impl<B: Backend> Drop for BlurPipeline<B> {
    fn drop(&mut self) {
        self.targets.release(&mut self.backend);
    }
}
