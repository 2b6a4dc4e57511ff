//! WGSL templates for the blur variants and the uniform block they read.
//!
//! Every variant shares one fullscreen-triangle vertex stage. The fragment stages
//! bind the source texture, its sampler, and (for the blurring variants) a
//! uniform block whose tap array length is the program's [`TapTier`].

use std::fmt;

use crate::config::NormalizedRect;
use crate::kernel::KernelTaps;

// ── Variants ─────────────────────────────────────────────────────────────────

/// The rendering programs a frame can run through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderVariant {
    /// Unfiltered copy of the source.
    Disabled,
    /// Single 2-D pass with the outer product of the kernel taps.
    DirectConvolution,
    /// Horizontal pass followed by a vertical pass.
    SeparableTwoPass,
    /// Two passes; fragments outside the bounds rectangle pass through.
    SeparableTwoPassBounded,
}

impl ShaderVariant {
    pub const ALL: [ShaderVariant; 4] = [
        ShaderVariant::Disabled,
        ShaderVariant::DirectConvolution,
        ShaderVariant::SeparableTwoPass,
        ShaderVariant::SeparableTwoPassBounded,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ShaderVariant::Disabled => "disabled",
            ShaderVariant::DirectConvolution => "direct",
            ShaderVariant::SeparableTwoPass => "separable",
            ShaderVariant::SeparableTwoPassBounded => "separable_bounded",
        }
    }

    pub fn blurs(self) -> bool {
        !matches!(self, ShaderVariant::Disabled)
    }

    pub fn pass_count(self) -> usize {
        match self {
            ShaderVariant::Disabled | ShaderVariant::DirectConvolution => 1,
            ShaderVariant::SeparableTwoPass | ShaderVariant::SeparableTwoPassBounded => 2,
        }
    }

    /// Globals a linked program of this variant must expose.
    pub fn required_bindings(self) -> &'static [&'static str] {
        if self.blurs() {
            &[SOURCE_TEXTURE, SOURCE_SAMPLER, PARAMS]
        } else {
            &[SOURCE_TEXTURE, SOURCE_SAMPLER]
        }
    }
}

pub const SOURCE_TEXTURE: &str = "source_texture";
pub const SOURCE_SAMPLER: &str = "source_sampler";
pub const PARAMS: &str = "params";

// ── Tap tiers ────────────────────────────────────────────────────────────────

/// Length of the tap array a program is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TapTier(u32);

impl TapTier {
    /// Tier of the Disabled program, which reads no taps.
    pub const NONE: TapTier = TapTier(0);
    pub const MIN: u32 = 8;

    pub fn new(slots: u32) -> Self {
        TapTier(slots)
    }

    /// Smallest power-of-two tier (at least [`TapTier::MIN`]) holding `taps`,
    /// never above the tier of `max_tap_count`.
    pub fn for_taps(taps: usize, max_tap_count: usize) -> Self {
        let cap = (max_tap_count.max(Self::MIN as usize)).next_power_of_two();
        let wanted = taps.max(Self::MIN as usize).next_power_of_two();
        TapTier(wanted.min(cap) as u32)
    }

    pub fn slots(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TapTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Sources ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn entry_point(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vs_main",
            ShaderStage::Fragment => "fs_main",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    pub stage: ShaderStage,
    pub variant: ShaderVariant,
    pub tier: TapTier,
    pub label: String,
    pub code: String,
}

/// Both stages of one (variant, tier) program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSources {
    pub variant: ShaderVariant,
    pub tier: TapTier,
    pub vertex: ShaderSource,
    pub fragment: ShaderSource,
}

impl ProgramSources {
    pub fn label(&self) -> String {
        program_label(self.variant, self.tier)
    }
}

pub fn program_label(variant: ShaderVariant, tier: TapTier) -> String {
    format!("{}_{}", variant.label(), tier)
}

/// Fullscreen triangle: 3 vertices cover the whole target, no vertex buffer.
pub(crate) const FULLSCREEN_TRIANGLE_VS: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) vi: u32) -> VertexOutput {
    let corner = vec2<f32>(f32((vi << 1u) & 2u), f32(vi & 2u));
    var out: VertexOutput;
    out.position = vec4<f32>(corner * 2.0 - 1.0, 0.0, 1.0);
    out.uv = vec2<f32>(corner.x, 1.0 - corner.y);
    return out;
}
"#;

const SOURCE_BINDINGS: &str = r#"
@group(0) @binding(0) var source_texture: texture_2d<f32>;
@group(0) @binding(1) var source_sampler: sampler;
"#;

/// `{MAX_TAPS}` is replaced with the tier.
const PARAMS_BLOCK: &str = r#"
struct BlurParams {
    direction: vec2<f32>,
    tap_count: u32,
    reserved: u32,
    bounds: vec4<f32>,
    texel_size: vec2<f32>,
    padding: vec2<f32>,
    // x: offset in texels along the pass direction, y: weight
    taps: array<vec4<f32>, {MAX_TAPS}>,
};

@group(0) @binding(2) var<uniform> params: BlurParams;

fn sample_source(uv: vec2<f32>) -> vec4<f32> {
    return textureSampleLevel(source_texture, source_sampler, uv, 0.0);
}
"#;

const DISABLED_FS: &str = r#"
@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSampleLevel(source_texture, source_sampler, uv, 0.0);
}
"#;

const CONVOLVE_1D: &str = r#"
fn convolve(uv: vec2<f32>) -> vec4<f32> {
    var color = vec4<f32>(0.0);
    let count = min(params.tap_count, {MAX_TAPS}u);
    for (var i = 0u; i < count; i += 1u) {
        let tap = params.taps[i];
        color += tap.y * sample_source(uv + tap.x * params.direction);
    }
    return color;
}
"#;

const SEPARABLE_FS: &str = r#"
@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return convolve(uv);
}
"#;

const SEPARABLE_BOUNDED_FS: &str = r#"
fn outside_bounds(uv: vec2<f32>) -> bool {
    let b = params.bounds;
    return uv.x < b.x || uv.y < b.y || uv.x > b.z || uv.y > b.w;
}

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    if outside_bounds(uv) {
        return sample_source(uv);
    }
    return convolve(uv);
}
"#;

const DIRECT_FS: &str = r#"
@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    var color = vec4<f32>(0.0);
    let count = min(params.tap_count, {MAX_TAPS}u);
    for (var row = 0u; row < count; row += 1u) {
        let vertical = params.taps[row];
        for (var column = 0u; column < count; column += 1u) {
            let horizontal = params.taps[column];
            let offset = vec2<f32>(horizontal.x, vertical.x) * params.texel_size;
            color += horizontal.y * vertical.y * sample_source(uv + offset);
        }
    }
    return color;
}
"#;

/// Builds both stages for a variant with `tier` baked into the tap array.
pub fn program_sources(variant: ShaderVariant, tier: TapTier) -> ProgramSources {
    let fragment_body = match variant {
        ShaderVariant::Disabled => format!("{SOURCE_BINDINGS}\n{DISABLED_FS}"),
        ShaderVariant::DirectConvolution => {
            format!("{SOURCE_BINDINGS}\n{PARAMS_BLOCK}\n{DIRECT_FS}")
        }
        ShaderVariant::SeparableTwoPass => {
            format!("{SOURCE_BINDINGS}\n{PARAMS_BLOCK}\n{CONVOLVE_1D}\n{SEPARABLE_FS}")
        }
        ShaderVariant::SeparableTwoPassBounded => {
            format!("{SOURCE_BINDINGS}\n{PARAMS_BLOCK}\n{CONVOLVE_1D}\n{SEPARABLE_BOUNDED_FS}")
        }
    };
    // WGSL arrays need at least one element.
    let slots = tier.slots().max(1).to_string();
    let label = program_label(variant, tier);

    ProgramSources {
        variant,
        tier,
        vertex: ShaderSource {
            stage: ShaderStage::Vertex,
            variant,
            tier,
            label: format!("{label}_vs"),
            code: FULLSCREEN_TRIANGLE_VS.to_string(),
        },
        fragment: ShaderSource {
            stage: ShaderStage::Fragment,
            variant,
            tier,
            label: format!("{label}_fs"),
            code: fragment_body.replace("{MAX_TAPS}", &slots),
        },
    }
}

// ── Uniforms ─────────────────────────────────────────────────────────────────

/// Fixed-size head of `BlurParams`, laid out as WGSL expects.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PassHeader {
    pub direction: [f32; 2],
    pub tap_count: u32,
    pub reserved: u32,
    pub bounds: [f32; 4],
    pub texel_size: [f32; 2],
    pub padding: [f32; 2],
}

/// Bytes of one tap entry (`vec4<f32>`).
pub const TAP_STRIDE: usize = 16;

/// Everything one pass reads from its uniform block.
#[derive(Debug, Clone, PartialEq)]
pub struct PassUniforms {
    pub header: PassHeader,
    pub taps: KernelTaps,
}

impl PassUniforms {
    pub fn passthrough() -> Self {
        Self {
            header: PassHeader {
                bounds: NormalizedRect::FULL.to_array(),
                ..bytemuck::Zeroable::zeroed()
            },
            taps: KernelTaps::default(),
        }
    }

    fn with_taps(
        direction: [f32; 2],
        taps: &KernelTaps,
        width: u32,
        height: u32,
        bounds: NormalizedRect,
    ) -> Self {
        Self {
            header: PassHeader {
                direction,
                tap_count: taps.len() as u32,
                reserved: 0,
                bounds: bounds.to_array(),
                texel_size: texel_size(width, height),
                padding: [0.0; 2],
            },
            taps: taps.clone(),
        }
    }

    pub fn horizontal(taps: &KernelTaps, width: u32, height: u32, bounds: NormalizedRect) -> Self {
        let [texel_x, _] = texel_size(width, height);
        Self::with_taps([texel_x, 0.0], taps, width, height, bounds)
    }

    pub fn vertical(taps: &KernelTaps, width: u32, height: u32, bounds: NormalizedRect) -> Self {
        let [_, texel_y] = texel_size(width, height);
        Self::with_taps([0.0, texel_y], taps, width, height, bounds)
    }

    pub fn direct(taps: &KernelTaps, width: u32, height: u32) -> Self {
        Self::with_taps([0.0; 2], taps, width, height, NormalizedRect::FULL)
    }

    /// Number of taps a program of `tier` will read.
    pub fn effective_tap_count(&self, tier: TapTier) -> usize {
        (self.header.tap_count.min(tier.slots()) as usize).min(self.taps.len())
    }

    /// Uniform buffer contents for a program compiled at `tier`. Taps beyond
    /// the tier are dropped; the array is zero-padded to the full tier length.
    pub fn to_bytes(&self, tier: TapTier) -> Vec<u8> {
        let slots = tier.slots() as usize;
        let mut header = self.header;
        header.tap_count = self.effective_tap_count(tier) as u32;

        let mut bytes = Vec::with_capacity(std::mem::size_of::<PassHeader>() + slots * TAP_STRIDE);
        bytes.extend_from_slice(bytemuck::bytes_of(&header));
        for (offset, weight) in self.taps.iter().take(slots) {
            bytes.extend_from_slice(bytemuck::cast_slice(&[offset, weight, 0.0f32, 0.0f32]));
        }
        bytes.resize(std::mem::size_of::<PassHeader>() + slots * TAP_STRIDE, 0);
        bytes
    }
}

fn texel_size(width: u32, height: u32) -> [f32; 2] {
    [1.0 / width.max(1) as f32, 1.0 / height.max(1) as f32]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{KernelTable, SampleReduction};

    fn parse(source: &ShaderSource) -> naga::Module {
        naga::front::wgsl::parse_str(&source.code)
            .unwrap_or_else(|error| panic!("{}: {}", source.label, error.emit_to_string(&source.code)))
    }

    #[test]
    fn every_variant_parses_and_validates() {
        for variant in ShaderVariant::ALL {
            let tier = if variant.blurs() {
                TapTier::new(16)
            } else {
                TapTier::NONE
            };
            let sources = program_sources(variant, tier);
            for source in [&sources.vertex, &sources.fragment] {
                let module = parse(source);
                naga::valid::Validator::new(
                    naga::valid::ValidationFlags::all(),
                    naga::valid::Capabilities::all(),
                )
                .validate(&module)
                .unwrap_or_else(|error| panic!("{}: {error}", source.label));
            }
        }
    }

    #[test]
    fn tier_is_baked_into_the_fragment_stage() {
        let sources = program_sources(ShaderVariant::SeparableTwoPass, TapTier::new(32));
        assert!(sources.fragment.code.contains("array<vec4<f32>, 32>"));
        assert!(sources.fragment.code.contains("min(params.tap_count, 32u)"));
        assert!(!sources.fragment.code.contains("{MAX_TAPS}"));
        assert_eq!(sources.label(), "separable_32");
    }

    #[test]
    fn params_block_size_matches_uniform_bytes() {
        let tier = TapTier::new(16);
        let sources = program_sources(ShaderVariant::DirectConvolution, tier);
        let module = parse(&sources.fragment);
        let params = module
            .global_variables
            .iter()
            .find(|(_, var)| var.name.as_deref() == Some(PARAMS))
            .map(|(_, var)| var)
            .expect("params global");
        let size = module.types[params.ty].inner.size(module.to_ctx());

        let uniforms = PassUniforms::direct(&KernelTaps::default(), 8, 8);
        assert_eq!(size as usize, uniforms.to_bytes(tier).len());
        assert_eq!(std::mem::size_of::<PassHeader>(), 48);
    }

    #[test]
    fn tiers_are_powers_of_two_capped_by_configuration() {
        assert_eq!(TapTier::for_taps(3, 32), TapTier::new(8));
        assert_eq!(TapTier::for_taps(9, 32), TapTier::new(16));
        assert_eq!(TapTier::for_taps(17, 32), TapTier::new(32));
        assert_eq!(TapTier::for_taps(13, 12), TapTier::new(16));
        assert_eq!(TapTier::for_taps(40, 32), TapTier::new(32));
    }

    #[test]
    fn uniform_bytes_pack_taps_as_vec4() {
        let taps = KernelTable::default()
            .kernel(10)
            .taps(SampleReduction::Discrete, 32);
        let uniforms = PassUniforms::horizontal(&taps, 100, 50, NormalizedRect::FULL);
        let bytes = uniforms.to_bytes(TapTier::new(16));

        assert_eq!(bytes.len(), 48 + 16 * 16);
        let header: PassHeader = bytemuck::pod_read_unaligned(&bytes[..48]);
        assert_eq!(header.tap_count, 9);
        assert_eq!(header.direction, [0.01, 0.0]);
        assert_eq!(header.texel_size, [0.01, 0.02]);

        let first: [f32; 4] = bytemuck::pod_read_unaligned(&bytes[48..64]);
        assert_eq!(first, [-4.0, taps.weights()[0], 0.0, 0.0]);
        assert!(bytes[48 + 9 * 16..].iter().all(|&byte| byte == 0));
    }

    #[test]
    fn taps_beyond_tier_are_dropped() {
        let taps = KernelTable::default()
            .kernel(10)
            .taps(SampleReduction::Discrete, 32);
        let uniforms = PassUniforms::vertical(&taps, 10, 10, NormalizedRect::FULL);
        assert_eq!(uniforms.effective_tap_count(TapTier::new(8)), 8);
        assert_eq!(uniforms.to_bytes(TapTier::new(8)).len(), 48 + 8 * 16);
    }
}
