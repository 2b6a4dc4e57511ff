use crate::render_target::TargetRole;
use crate::shader::{ShaderVariant, TapTier};

pub type Result<T, E = BlurError> = std::result::Result<T, E>;

/// Errors produced while setting up or running the blur pipeline.
///
/// Shader, link and framebuffer errors are configuration failures: they are
/// reported once, cached, and the affected frames fall back to an unfiltered
/// copy of the source. The `*Unusable` variants are what later requests get
/// back for an already-failed resource.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BlurError {
    #[error("shader `{label}` failed to compile: {diagnostic}")]
    ShaderCompile { label: String, diagnostic: String },

    #[error("program `{label}` failed to link: {diagnostic}")]
    ProgramLink { label: String, diagnostic: String },

    #[error("render target {role} ({width}x{height}) is incomplete: {reason}")]
    FramebufferIncomplete {
        role: TargetRole,
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("program {variant:?} (tier {tier}) previously failed and is marked unusable")]
    ProgramUnusable {
        variant: ShaderVariant,
        tier: TapTier,
    },

    #[error("render target {role} ({width}x{height}) previously failed and is marked unusable")]
    TargetUnusable {
        role: TargetRole,
        width: u32,
        height: u32,
    },

    #[error("pass `{label}` failed: {reason}")]
    DrawFailed { label: String, reason: String },

    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("texture readback failed: {0}")]
    Readback(String),

    #[error("no suitable GPU adapter: {0}")]
    AdapterUnavailable(String),

    #[error("GPU device request failed: {0}")]
    DeviceRequest(String),
}

impl BlurError {
    /// True for errors that repeat an earlier, already reported failure.
    pub fn is_cached_failure(&self) -> bool {
        matches!(
            self,
            BlurError::ProgramUnusable { .. } | BlurError::TargetUnusable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_failures_are_distinguished_from_fresh_ones() {
        let fresh = BlurError::ShaderCompile {
            label: "separable_fs".into(),
            diagnostic: "expected `;`".into(),
        };
        let cached = BlurError::ProgramUnusable {
            variant: ShaderVariant::SeparableTwoPass,
            tier: TapTier::new(16),
        };
        assert!(!fresh.is_cached_failure());
        assert!(cached.is_cached_failure());
    }

    #[test]
    fn display_carries_compiler_diagnostic() {
        let error = BlurError::ShaderCompile {
            label: "direct_fs".into(),
            diagnostic: "unknown identifier `tapz`".into(),
        };
        assert_eq!(
            error.to_string(),
            "shader `direct_fs` failed to compile: unknown identifier `tapz`"
        );
    }
}
