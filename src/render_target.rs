//! Offscreen render targets sized to the current frame.

use std::fmt;
use std::ops::{Deref, DerefMut};

use ahash::{HashMap, HashMapExt};

use crate::backend::{Backend, PassDescriptor};
use crate::error::{BlurError, Result};
use crate::program::CompiledProgram;
use crate::shader::PassUniforms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetRole {
    /// The uploaded camera frame.
    Source,
    /// Output of the horizontal pass.
    Intermediate,
    Output,
}

impl fmt::Display for TargetRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TargetRole::Source => "source",
            TargetRole::Intermediate => "pass1-output",
            TargetRole::Output => "output",
        })
    }
}

pub struct RenderTarget<T> {
    texture: T,
    width: u32,
    height: u32,
    generation: u64,
}

impl<T> RenderTarget<T> {
    pub fn texture(&self) -> &T {
        &self.texture
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Bumped every time the target is recreated.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// At most one target per [`TargetRole`]. Targets are never resized in place:
/// a size change destroys the old texture and creates a new one.
pub struct RenderTargetManager<B: Backend> {
    targets: HashMap<TargetRole, RenderTarget<B::Texture>>,
    failed: HashMap<TargetRole, (u32, u32)>,
    recreations: HashMap<TargetRole, u32>,
    next_generation: u64,
    bound: Option<TargetRole>,
}

impl<B: Backend> Default for RenderTargetManager<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> RenderTargetManager<B> {
    pub fn new() -> Self {
        Self {
            targets: HashMap::new(),
            failed: HashMap::new(),
            recreations: HashMap::new(),
            next_generation: 0,
            bound: None,
        }
    }

    pub fn get(&self, role: TargetRole) -> Option<&RenderTarget<B::Texture>> {
        self.targets.get(&role)
    }

    /// Number of times the role's target was replaced because the size changed.
    pub fn recreations(&self, role: TargetRole) -> u32 {
        self.recreations.get(&role).copied().unwrap_or(0)
    }

    pub fn bound_role(&self) -> Option<TargetRole> {
        self.bound
    }

    /// Returns the role's target at `width`x`height`, creating or recreating it.
    ///
    /// A size that failed before is not retried: it returns `TargetUnusable`
    /// until a different size is requested.
    pub fn ensure(
        &mut self,
        backend: &mut B,
        role: TargetRole,
        width: u32,
        height: u32,
    ) -> Result<&RenderTarget<B::Texture>> {
        if self.failed.get(&role) == Some(&(width, height)) {
            return Err(BlurError::TargetUnusable {
                role,
                width,
                height,
            });
        }

        let current_size = self.targets.get(&role).map(RenderTarget::size);
        let replaced = match current_size {
            Some(size) if size == (width, height) => false,
            Some(size) => {
                tracing::debug!(
                    %role,
                    from = ?size,
                    to = ?(width, height),
                    "recreating render target"
                );
                if let Some(stale) = self.targets.remove(&role) {
                    backend.destroy_texture(stale.texture);
                }
                true
            }
            None => {
                tracing::debug!(%role, width, height, "creating render target");
                false
            }
        };

        if !self.targets.contains_key(&role) {
            let texture = match backend.create_texture(role, width, height) {
                Ok(texture) => texture,
                Err(error) => {
                    self.failed.insert(role, (width, height));
                    return Err(error);
                }
            };
            self.failed.remove(&role);
            if replaced {
                *self.recreations.entry(role).or_insert(0) += 1;
            }
            self.next_generation += 1;
            self.targets.insert(
                role,
                RenderTarget {
                    texture,
                    width,
                    height,
                    generation: self.next_generation,
                },
            );
        }

        self.targets.get(&role).ok_or(BlurError::TargetUnusable {
            role,
            width,
            height,
        })
    }

    /// Makes `role` the active framebuffer until the guard drops.
    pub fn bind(&mut self, role: TargetRole) -> FramebufferBinding<'_, B> {
        let previous = self.bound.replace(role);
        FramebufferBinding {
            manager: self,
            role,
            previous,
        }
    }

    /// Destroys every target.
    pub fn release(&mut self, backend: &mut B) {
        for (_, target) in self.targets.drain() {
            backend.destroy_texture(target.texture);
        }
        self.failed.clear();
    }
}

/// Scoped framebuffer binding. Restores the previously bound role on drop,
/// whether or not the pass drawn through it succeeded.
pub struct FramebufferBinding<'a, B: Backend> {
    manager: &'a mut RenderTargetManager<B>,
    role: TargetRole,
    previous: Option<TargetRole>,
}

impl<B: Backend> FramebufferBinding<'_, B> {
    pub fn role(&self) -> TargetRole {
        self.role
    }

    /// Draws a fullscreen pass sampling `source` into the bound target.
    pub fn draw_from(
        &self,
        backend: &mut B,
        source: TargetRole,
        label: &str,
        program: &CompiledProgram<B>,
        uniforms: &PassUniforms,
    ) -> Result<()> {
        let missing = |role: TargetRole| BlurError::DrawFailed {
            label: label.to_string(),
            reason: format!("no {role} render target"),
        };
        let source_target = self.manager.get(source).ok_or_else(|| missing(source))?;
        let destination = self.manager.get(self.role).ok_or_else(|| missing(self.role))?;

        tracing::trace!(label, %source, destination = %self.role, "blur pass");
        backend.draw(&PassDescriptor {
            label,
            program: program.handle(),
            source: source_target.texture(),
            destination: destination.texture(),
            uniforms,
        })
    }
}

impl<B: Backend> Deref for FramebufferBinding<'_, B> {
    type Target = RenderTargetManager<B>;

    fn deref(&self) -> &Self::Target {
        self.manager
    }
}

impl<B: Backend> DerefMut for FramebufferBinding<'_, B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.manager
    }
}

impl<B: Backend> Drop for FramebufferBinding<'_, B> {
    fn drop(&mut self) {
        self.manager.bound = self.previous;
    }
}
