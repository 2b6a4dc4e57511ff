//! Compiled GPU programs, cached per variant and tap tier.

use std::sync::Arc;

use ahash::{HashMap, HashMapExt};

use crate::backend::Backend;
use crate::error::{BlurError, Result};
use crate::shader::{program_sources, ShaderSource, ShaderVariant, TapTier};

/// Where a shader global is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingSlot {
    pub group: u32,
    pub binding: u32,
}

#[derive(Debug, Clone, PartialEq)]
struct ReflectedBinding {
    name: String,
    slot: BindingSlot,
    space: naga::AddressSpace,
    size: u32,
}

/// Lists the bound globals a stage declares.
fn reflect_bindings(source: &ShaderSource) -> Result<Vec<ReflectedBinding>> {
    let module = naga::front::wgsl::parse_str(&source.code).map_err(|error| {
        BlurError::ShaderCompile {
            label: source.label.clone(),
            diagnostic: error.emit_to_string(&source.code),
        }
    })?;

    Ok(module
        .global_variables
        .iter()
        .filter_map(|(_, global)| {
            let binding = global.binding.as_ref()?;
            Some(ReflectedBinding {
                name: global.name.clone().unwrap_or_default(),
                slot: BindingSlot {
                    group: binding.group,
                    binding: binding.binding,
                },
                space: global.space,
                size: module.types[global.ty].inner.size(module.to_ctx()),
            })
        })
        .collect())
}

/// Merges the binding tables of both stages. Two globals may share a slot
/// only if they agree on name, address space and size.
fn merge_interfaces(
    label: &str,
    stages: &[Vec<ReflectedBinding>],
) -> Result<HashMap<String, BindingSlot>> {
    let mut by_slot: HashMap<BindingSlot, &ReflectedBinding> = HashMap::new();
    for reflected in stages.iter().flatten() {
        match by_slot.get(&reflected.slot) {
            Some(existing) if *existing != reflected => {
                return Err(BlurError::ProgramLink {
                    label: label.to_string(),
                    diagnostic: format!(
                        "group {} binding {} is declared as both `{}` and `{}`",
                        reflected.slot.group, reflected.slot.binding, existing.name, reflected.name
                    ),
                });
            }
            Some(_) => {}
            None => {
                by_slot.insert(reflected.slot, reflected);
            }
        }
    }

    Ok(by_slot
        .into_values()
        .map(|reflected| (reflected.name.clone(), reflected.slot))
        .collect())
}

/// A linked program together with its binding table.
pub struct CompiledProgram<B: Backend> {
    handle: B::Program,
    label: String,
    variant: ShaderVariant,
    tier: TapTier,
    bindings: HashMap<String, BindingSlot>,
}

impl<B: Backend> CompiledProgram<B> {
    pub fn handle(&self) -> &B::Program {
        &self.handle
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

    pub fn binding(&self, name: &str) -> Option<BindingSlot> {
        self.bindings.get(name).copied()
    }

    pub fn bindings(&self) -> &HashMap<String, BindingSlot> {
        &self.bindings
    }
}

enum CacheEntry<B: Backend> {
    Ready(Arc<CompiledProgram<B>>),
    Unusable,
}

/// Builds programs on first request and hands out shared references after.
/// Failed builds are remembered and never retried.
pub struct ProgramCache<B: Backend> {
    entries: HashMap<(ShaderVariant, TapTier), CacheEntry<B>>,
    compiled: usize,
}

impl<B: Backend> Default for ProgramCache<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> ProgramCache<B> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            compiled: 0,
        }
    }

    /// Number of programs successfully linked so far.
    pub fn compiled_count(&self) -> usize {
        self.compiled
    }

    pub fn is_unusable(&self, variant: ShaderVariant, tier: TapTier) -> bool {
        matches!(self.entries.get(&(variant, tier)), Some(CacheEntry::Unusable))
    }

    pub fn program(
        &mut self,
        backend: &mut B,
        variant: ShaderVariant,
        tier: TapTier,
    ) -> Result<Arc<CompiledProgram<B>>> {
        match self.entries.get(&(variant, tier)) {
            Some(CacheEntry::Ready(program)) => return Ok(Arc::clone(program)),
            Some(CacheEntry::Unusable) => {
                return Err(BlurError::ProgramUnusable { variant, tier });
            }
            None => {}
        }

        match build_program(backend, variant, tier) {
            Ok(program) => {
                let program = Arc::new(program);
                self.compiled += 1;
                tracing::debug!(label = program.label(), "compiled blur program");
                self.entries
                    .insert((variant, tier), CacheEntry::Ready(Arc::clone(&program)));
                Ok(program)
            }
            Err(error) => {
                self.entries.insert((variant, tier), CacheEntry::Unusable);
                Err(error)
            }
        }
    }
}

fn build_program<B: Backend>(
    backend: &mut B,
    variant: ShaderVariant,
    tier: TapTier,
) -> Result<CompiledProgram<B>> {
    let sources = program_sources(variant, tier);
    let label = sources.label();

    let vertex = backend.compile_shader(&sources.vertex)?;
    let fragment = backend.compile_shader(&sources.fragment)?;

    let interfaces = [
        reflect_bindings(&sources.vertex)?,
        reflect_bindings(&sources.fragment)?,
    ];
    let bindings = merge_interfaces(&label, &interfaces)?;

    let handle = backend.link_program(&label, variant, tier, &vertex, &fragment)?;

    if let Some(missing) = variant
        .required_bindings()
        .iter()
        .find(|name| !bindings.contains_key(**name))
    {
        return Err(BlurError::ProgramLink {
            label,
            diagnostic: format!("required binding `{missing}` not found"),
        });
    }

    Ok(CompiledProgram {
        handle,
        label,
        variant,
        tier,
        bindings,
    })
}
