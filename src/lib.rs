pub use wgpu;

mod animator;
mod backend;
mod config;
mod error;
mod frame;
mod kernel;
mod pipeline;
mod preview;
mod program;
mod render_target;
mod selector;
mod shader;
mod util;

pub use animator::{BlurState, Ease, IntensityAnimator};
pub use backend::{
    Backend, PassDescriptor, SoftwareBackend, SoftwareProgram, SoftwareShader, SoftwareStats,
    SoftwareTexture, WgpuBackend, WgpuProgram, WgpuTexture, TARGET_FORMAT,
};
pub use config::{BlurConfig, BlurStrategy, NormalizedRect, MAX_TAP_COUNT_LIMIT};
pub use error::{BlurError, Result};
pub use frame::{PixelFormat, VideoFrame};
pub use kernel::{GaussianKernel, KernelTable, KernelTableSpec, KernelTaps, SampleReduction};
pub use pipeline::{BlurPipeline, FrameReport, INTENSITY_EPSILON};
pub use preview::PreviewBlur;
pub use program::{BindingSlot, CompiledProgram, ProgramCache};
pub use render_target::{FramebufferBinding, RenderTarget, RenderTargetManager, TargetRole};
pub use selector::{clamp_intensity, KernelBlend, KernelSelector, Selection, SelectionPolicy};
pub use shader::{
    program_sources, PassHeader, PassUniforms, ProgramSources, ShaderSource, ShaderStage,
    ShaderVariant, TapTier,
};
