//! CPU reference rasterizer.
//!
//! Shaders are parsed and validated with naga, as a driver would, but draws
//! run the variant's fragment program natively: one fragment per texel, uv at
//! the texel centre, bilinear clamp-to-edge sampling and round-to-nearest
//! 8-bit stores, matching an `Rgba8Unorm` target with a linear sampler.

use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};
use smallvec::SmallVec;

use super::{Backend, PassDescriptor};
use crate::error::{BlurError, Result};
use crate::frame::{VideoFrame, BYTES_PER_PIXEL};
use crate::render_target::TargetRole;
use crate::shader::{PassUniforms, ShaderSource, ShaderStage, ShaderVariant, TapTier};

/// wgpu's default `max_texture_dimension_2d`.
const DEFAULT_MAX_TEXTURE_DIMENSION: u32 = 8192;

#[derive(Debug, Clone)]
pub struct SoftwareShader {
    stage: ShaderStage,
    variant: ShaderVariant,
    label: String,
}

impl SoftwareShader {
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

#[derive(Debug, Clone)]
pub struct SoftwareProgram {
    id: u64,
    label: String,
    variant: ShaderVariant,
    tier: TapTier,
}

impl SoftwareProgram {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn variant(&self) -> ShaderVariant {
        self.variant
    }

    pub fn tier(&self) -> TapTier {
        self.tier
    }
}

#[derive(Debug)]
pub struct SoftwareTexture {
    id: u64,
    role: TargetRole,
    width: u32,
    height: u32,
}

impl SoftwareTexture {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn role(&self) -> TargetRole {
        self.role
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Counters of the work the backend was asked to do.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SoftwareStats {
    pub shaders_compiled: usize,
    pub programs_linked: usize,
    pub textures_created: usize,
    pub textures_destroyed: usize,
    pub uploads: usize,
    pub draws: usize,
}

pub struct SoftwareBackend {
    textures: HashMap<u64, Vec<u8>>,
    next_id: u64,
    stats: SoftwareStats,
    max_texture_dimension: u32,
    compile_failures: HashSet<ShaderVariant>,
    link_failures: HashSet<ShaderVariant>,
    pending_draw_failures: usize,
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self {
            textures: HashMap::new(),
            next_id: 1,
            stats: SoftwareStats::default(),
            max_texture_dimension: DEFAULT_MAX_TEXTURE_DIMENSION,
            compile_failures: HashSet::new(),
            link_failures: HashSet::new(),
            pending_draw_failures: 0,
        }
    }

    pub fn stats(&self) -> SoftwareStats {
        self.stats
    }

    /// Textures created and not yet destroyed.
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn set_max_texture_dimension(&mut self, dimension: u32) {
        self.max_texture_dimension = dimension;
    }

    /// Makes every later compile of `variant`'s shaders fail.
    pub fn inject_compile_failure(&mut self, variant: ShaderVariant) {
        self.compile_failures.insert(variant);
    }

    /// Makes every later link of a `variant` program fail.
    pub fn inject_link_failure(&mut self, variant: ShaderVariant) {
        self.link_failures.insert(variant);
    }

    /// Makes the next `count` draws fail.
    pub fn fail_next_draws(&mut self, count: usize) {
        self.pending_draw_failures = count;
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

fn compile_diagnostic(source: &ShaderSource) -> Option<String> {
    let module = match naga::front::wgsl::parse_str(&source.code) {
        Ok(module) => module,
        Err(error) => return Some(error.emit_to_string(&source.code)),
    };

    if let Err(error) = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    {
        return Some(error.to_string());
    }

    let expected_stage = match source.stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    };
    let entry_point = source.stage.entry_point();
    let has_entry_point = module
        .entry_points
        .iter()
        .any(|entry| entry.name == entry_point && entry.stage == expected_stage);
    if !has_entry_point {
        return Some(format!("missing {:?} entry point `{entry_point}`", source.stage));
    }

    None
}

impl Backend for SoftwareBackend {
    type Shader = SoftwareShader;
    type Program = SoftwareProgram;
    type Texture = SoftwareTexture;

    fn compile_shader(&mut self, source: &ShaderSource) -> Result<SoftwareShader> {
        let diagnostic = if self.compile_failures.contains(&source.variant) {
            Some("shader compiler rejected the module".to_string())
        } else {
            compile_diagnostic(source)
        };

        if let Some(diagnostic) = diagnostic {
            return Err(BlurError::ShaderCompile {
                label: source.label.clone(),
                diagnostic,
            });
        }

        self.stats.shaders_compiled += 1;
        Ok(SoftwareShader {
            stage: source.stage,
            variant: source.variant,
            label: source.label.clone(),
        })
    }

    fn link_program(
        &mut self,
        label: &str,
        variant: ShaderVariant,
        tier: TapTier,
        vertex: &SoftwareShader,
        fragment: &SoftwareShader,
    ) -> Result<SoftwareProgram> {
        let link_error = |diagnostic: String| BlurError::ProgramLink {
            label: label.to_string(),
            diagnostic,
        };

        if vertex.stage != ShaderStage::Vertex || fragment.stage != ShaderStage::Fragment {
            return Err(link_error(format!(
                "expected vertex and fragment shaders, got {:?} and {:?}",
                vertex.stage, fragment.stage
            )));
        }
        if fragment.variant != variant {
            return Err(link_error(format!(
                "fragment shader `{}` was built for {:?}",
                fragment.label, fragment.variant
            )));
        }
        if self.link_failures.contains(&variant) {
            return Err(link_error("linker rejected the program".to_string()));
        }

        self.stats.programs_linked += 1;
        Ok(SoftwareProgram {
            id: self.allocate_id(),
            label: label.to_string(),
            variant,
            tier,
        })
    }

    fn create_texture(
        &mut self,
        role: TargetRole,
        width: u32,
        height: u32,
    ) -> Result<SoftwareTexture> {
        let incomplete = |reason: String| BlurError::FramebufferIncomplete {
            role,
            width,
            height,
            reason,
        };
        if width == 0 || height == 0 {
            return Err(incomplete("zero-sized attachment".to_string()));
        }
        if width > self.max_texture_dimension || height > self.max_texture_dimension {
            return Err(incomplete(format!(
                "exceeds the maximum texture dimension {}",
                self.max_texture_dimension
            )));
        }

        let id = self.allocate_id();
        self.textures.insert(
            id,
            vec![0; width as usize * height as usize * BYTES_PER_PIXEL],
        );
        self.stats.textures_created += 1;

        Ok(SoftwareTexture {
            id,
            role,
            width,
            height,
        })
    }

    fn destroy_texture(&mut self, texture: SoftwareTexture) {
        if self.textures.remove(&texture.id).is_some() {
            self.stats.textures_destroyed += 1;
        }
    }

    fn upload(&mut self, texture: &SoftwareTexture, frame: &VideoFrame<'_>) -> Result<()> {
        if (frame.width, frame.height) != texture.size() {
            return Err(BlurError::DrawFailed {
                label: "upload".to_string(),
                reason: format!(
                    "frame is {}x{}, texture is {}x{}",
                    frame.width, frame.height, texture.width, texture.height
                ),
            });
        }
        let pixels = frame.to_rgba8()?;
        let storage = self
            .textures
            .get_mut(&texture.id)
            .ok_or_else(|| BlurError::DrawFailed {
                label: "upload".to_string(),
                reason: "texture was destroyed".to_string(),
            })?;
        storage.copy_from_slice(&pixels);
        self.stats.uploads += 1;
        Ok(())
    }

    fn draw(&mut self, pass: &PassDescriptor<'_, Self>) -> Result<()> {
        let failed = |reason: &str| BlurError::DrawFailed {
            label: pass.label.to_string(),
            reason: reason.to_string(),
        };

        if self.pending_draw_failures > 0 {
            self.pending_draw_failures -= 1;
            return Err(failed("device rejected the draw"));
        }
        if pass.source.id == pass.destination.id {
            return Err(failed("source and destination are the same texture"));
        }
        if pass.source.size() != pass.destination.size() {
            return Err(failed("source and destination sizes differ"));
        }
        if !self.textures.contains_key(&pass.destination.id) {
            return Err(failed("destination texture was destroyed"));
        }
        let source = self
            .textures
            .get(&pass.source.id)
            .ok_or_else(|| failed("source texture was destroyed"))?;

        let view = TexelView {
            data: source,
            width: pass.source.width,
            height: pass.source.height,
        };
        let output = shade(pass.program, pass.uniforms, &view);
        self.textures.insert(pass.destination.id, output);
        self.stats.draws += 1;
        Ok(())
    }

    fn read_pixels(&mut self, texture: &SoftwareTexture) -> Result<Vec<u8>> {
        self.textures
            .get(&texture.id)
            .cloned()
            .ok_or_else(|| BlurError::Readback(format!("texture {} was destroyed", texture.id)))
    }
}

struct TexelView<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
}

impl TexelView<'_> {
    fn fetch(&self, x: i64, y: i64) -> [f32; 4] {
        let x = x.clamp(0, self.width as i64 - 1) as usize;
        let y = y.clamp(0, self.height as i64 - 1) as usize;
        let offset = (y * self.width as usize + x) * BYTES_PER_PIXEL;
        let texel = &self.data[offset..offset + BYTES_PER_PIXEL];
        [
            texel[0] as f32 / 255.0,
            texel[1] as f32 / 255.0,
            texel[2] as f32 / 255.0,
            texel[3] as f32 / 255.0,
        ]
    }

    /// Linear filtering with clamp-to-edge addressing.
    fn sample(&self, uv: [f32; 2]) -> [f32; 4] {
        let x = uv[0] * self.width as f32 - 0.5;
        let y = uv[1] * self.height as f32 - 0.5;
        let (x0, y0) = (x.floor(), y.floor());
        let (fx, fy) = (x - x0, y - y0);
        let (x0, y0) = (x0 as i64, y0 as i64);

        let top = lerp4(self.fetch(x0, y0), self.fetch(x0 + 1, y0), fx);
        let bottom = lerp4(self.fetch(x0, y0 + 1), self.fetch(x0 + 1, y0 + 1), fx);
        lerp4(top, bottom, fy)
    }
}

fn lerp4(a: [f32; 4], b: [f32; 4], t: f32) -> [f32; 4] {
    std::array::from_fn(|channel| a[channel] + (b[channel] - a[channel]) * t)
}

fn accumulate(color: &mut [f32; 4], sample: [f32; 4], weight: f32) {
    for (channel, value) in color.iter_mut().zip(sample) {
        *channel += weight * value;
    }
}

fn to_unorm8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn shade(program: &SoftwareProgram, uniforms: &PassUniforms, source: &TexelView<'_>) -> Vec<u8> {
    let header = &uniforms.header;
    let taps: SmallVec<[(f32, f32); 32]> = uniforms
        .taps
        .iter()
        .take(uniforms.effective_tap_count(program.tier))
        .collect();
    let [min_x, min_y, max_x, max_y] = header.bounds;

    let convolve = |uv: [f32; 2]| {
        let mut color = [0.0; 4];
        for &(offset, weight) in &taps {
            let at = [
                uv[0] + offset * header.direction[0],
                uv[1] + offset * header.direction[1],
            ];
            accumulate(&mut color, source.sample(at), weight);
        }
        color
    };

    let direct = |uv: [f32; 2]| {
        let mut color = [0.0; 4];
        for &(vertical_offset, vertical_weight) in &taps {
            for &(horizontal_offset, horizontal_weight) in &taps {
                let at = [
                    uv[0] + horizontal_offset * header.texel_size[0],
                    uv[1] + vertical_offset * header.texel_size[1],
                ];
                accumulate(
                    &mut color,
                    source.sample(at),
                    horizontal_weight * vertical_weight,
                );
            }
        }
        color
    };

    let (width, height) = (source.width as usize, source.height as usize);
    let mut output = Vec::with_capacity(width * height * BYTES_PER_PIXEL);
    for y in 0..height {
        for x in 0..width {
            let uv = [
                (x as f32 + 0.5) / width as f32,
                (y as f32 + 0.5) / height as f32,
            ];
            let color = match program.variant {
                ShaderVariant::Disabled => source.sample(uv),
                ShaderVariant::SeparableTwoPass => convolve(uv),
                ShaderVariant::SeparableTwoPassBounded => {
                    let outside =
                        uv[0] < min_x || uv[1] < min_y || uv[0] > max_x || uv[1] > max_y;
                    if outside {
                        source.sample(uv)
                    } else {
                        convolve(uv)
                    }
                }
                ShaderVariant::DirectConvolution => direct(uv),
            };
            output.extend(color.map(to_unorm8));
        }
    }
    output
}
