//! The GPU seam the pipeline renders through.
//!
//! [`WgpuBackend`] drives a real device. [`SoftwareBackend`] executes the same
//! programs on the CPU, texel for texel, and is what the test-suite renders with.

mod software;
mod wgpu_device;

pub use software::{SoftwareBackend, SoftwareProgram, SoftwareShader, SoftwareStats, SoftwareTexture};
pub use wgpu_device::{WgpuBackend, WgpuProgram, WgpuTexture, TARGET_FORMAT};

use crate::error::Result;
use crate::frame::VideoFrame;
use crate::render_target::TargetRole;
use crate::shader::{PassUniforms, ShaderSource, ShaderVariant, TapTier};

/// One fullscreen draw from `source` into `destination`.
pub struct PassDescriptor<'a, B: Backend + ?Sized> {
    pub label: &'a str,
    pub program: &'a B::Program,
    pub source: &'a B::Texture,
    pub destination: &'a B::Texture,
    pub uniforms: &'a PassUniforms,
}

pub trait Backend {
    type Shader;
    type Program;
    type Texture;

    fn compile_shader(&mut self, source: &ShaderSource) -> Result<Self::Shader>;

    fn link_program(
        &mut self,
        label: &str,
        variant: ShaderVariant,
        tier: TapTier,
        vertex: &Self::Shader,
        fragment: &Self::Shader,
    ) -> Result<Self::Program>;

    /// Creates a renderable, sampleable RGBA texture. Fails with
    /// `FramebufferIncomplete` when the target cannot be rendered to.
    fn create_texture(&mut self, role: TargetRole, width: u32, height: u32)
        -> Result<Self::Texture>;

    fn destroy_texture(&mut self, texture: Self::Texture);

    /// Uploads a validated frame into a texture of the same size.
    fn upload(&mut self, texture: &Self::Texture, frame: &VideoFrame<'_>) -> Result<()>;

    fn draw(&mut self, pass: &PassDescriptor<'_, Self>) -> Result<()>;

    /// Tightly packed RGBA bytes of a texture.
    fn read_pixels(&mut self, texture: &Self::Texture) -> Result<Vec<u8>>;
}
