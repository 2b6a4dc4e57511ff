use std::sync::Arc;

use super::{Backend, PassDescriptor};
use crate::error::{BlurError, Result};
use crate::frame::VideoFrame;
use crate::render_target::TargetRole;
use crate::shader::{ShaderSource, ShaderStage, ShaderVariant, TapTier};
use crate::util::{compute_padded_bytes_per_row, copy_padded_readback_rows, decide_buffer_sizing};

pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

pub struct WgpuProgram {
    pipeline: wgpu::RenderPipeline,
    variant: ShaderVariant,
    tier: TapTier,
}

impl WgpuProgram {
    pub fn pipeline(&self) -> &wgpu::RenderPipeline {
        &self.pipeline
    }

    pub fn variant(&self) -> ShaderVariant {
        self.variant
    }

    pub fn tier(&self) -> TapTier {
        self.tier
    }
}

pub struct WgpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl WgpuTexture {
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn size(&self) -> (u32, u32) {
        let size = self.texture.size();
        (size.width, size.height)
    }
}

/// Renders on a wgpu device. Every pass is submitted before `draw` returns.
pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    sampler: wgpu::Sampler,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    uniform_buffer: Option<wgpu::Buffer>,
    readback_buffer: Option<wgpu::Buffer>,
    readback_bytes: Vec<u8>,
}

impl WgpuBackend {
    pub async fn try_new_headless() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|error| BlurError::AdapterUnavailable(error.to_string()))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("lumablur_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
                trace: Default::default(),
            })
            .await
            .map_err(|error| BlurError::DeviceRequest(error.to_string()))?;

        Ok(Self::from_device(Arc::new(device), Arc::new(queue)))
    }

    /// Shares a device the host already owns.
    pub fn from_device(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("blur_source_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let bind_group_layout = create_blur_bind_group_layout(&device);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("blur_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        Self {
            device,
            queue,
            sampler,
            bind_group_layout,
            pipeline_layout,
            uniform_buffer: None,
            readback_buffer: None,
            readback_bytes: Vec::new(),
        }
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    /// Runs `operation` inside validation and out-of-memory error scopes.
    fn scoped<T>(&self, operation: impl FnOnce(&wgpu::Device) -> T) -> (T, Option<wgpu::Error>) {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = operation(&self.device);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        (value, validation.or(out_of_memory))
    }

    fn ensure_uniform_buffer(&mut self, required_size: usize) {
        let existing_size = self.uniform_buffer.as_ref().map(wgpu::Buffer::size);
        if decide_buffer_sizing(existing_size, required_size).should_reallocate {
            self.uniform_buffer = Some(self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("blur_params_buffer"),
                size: required_size as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
        }
    }

    fn ensure_readback_buffer(&mut self, required_size: usize) {
        let existing_size = self.readback_buffer.as_ref().map(wgpu::Buffer::size);
        if decide_buffer_sizing(existing_size, required_size).should_reallocate {
            self.readback_buffer = Some(self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("blur_readback_buffer"),
                size: required_size as u64,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
        }
    }
}

fn create_blur_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("blur_bgl"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    })
}

fn map_readback_buffer_into(
    device: &wgpu::Device,
    buffer: &wgpu::Buffer,
    size: u64,
    mapped_bytes: &mut Vec<u8>,
) -> Result<()> {
    mapped_bytes.clear();

    let buffer_slice = buffer.slice(..size);
    let (sender, receiver) = std::sync::mpsc::channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        if sender.send(result).is_err() {
            tracing::warn!("Failed to send map_async result from callback");
        }
    });

    let _ = device.poll(wgpu::PollType::Wait);

    receiver
        .recv()
        .map_err(|error| BlurError::Readback(format!("map callback dropped: {error}")))?
        .map_err(|error| BlurError::Readback(format!("failed to map buffer: {error}")))?;

    let mapped_range = buffer_slice.get_mapped_range();
    mapped_bytes.extend_from_slice(&mapped_range);
    drop(mapped_range);
    buffer.unmap();
    Ok(())
}

impl Backend for WgpuBackend {
    type Shader = wgpu::ShaderModule;
    type Program = WgpuProgram;
    type Texture = WgpuTexture;

    fn compile_shader(&mut self, source: &ShaderSource) -> Result<wgpu::ShaderModule> {
        let (module, error) = self.scoped(|device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&source.label),
                source: wgpu::ShaderSource::Wgsl(source.code.as_str().into()),
            })
        });

        let info = pollster::block_on(module.get_compilation_info());
        let mut diagnostics: Vec<String> = info
            .messages
            .iter()
            .filter(|message| message.message_type == wgpu::CompilationMessageType::Error)
            .map(|message| message.message.clone())
            .collect();
        if diagnostics.is_empty() {
            if let Some(error) = error {
                diagnostics.push(error.to_string());
            }
        }

        if diagnostics.is_empty() {
            Ok(module)
        } else {
            Err(BlurError::ShaderCompile {
                label: source.label.clone(),
                diagnostic: diagnostics.join("\n"),
            })
        }
    }

    fn link_program(
        &mut self,
        label: &str,
        variant: ShaderVariant,
        tier: TapTier,
        vertex: &wgpu::ShaderModule,
        fragment: &wgpu::ShaderModule,
    ) -> Result<WgpuProgram> {
        let (pipeline, error) = self.scoped(|device| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: vertex,
                    entry_point: Some(ShaderStage::Vertex.entry_point()),
                    compilation_options: Default::default(),
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: fragment,
                    entry_point: Some(ShaderStage::Fragment.entry_point()),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: TARGET_FORMAT,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        });

        match error {
            Some(error) => Err(BlurError::ProgramLink {
                label: label.to_string(),
                diagnostic: error.to_string(),
            }),
            None => Ok(WgpuProgram {
                pipeline,
                variant,
                tier,
            }),
        }
    }

    fn create_texture(&mut self, role: TargetRole, width: u32, height: u32) -> Result<WgpuTexture> {
        let incomplete = |reason: String| BlurError::FramebufferIncomplete {
            role,
            width,
            height,
            reason,
        };
        let max_dimension = self.device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 {
            return Err(incomplete("zero-sized attachment".to_string()));
        }
        if width > max_dimension || height > max_dimension {
            return Err(incomplete(format!(
                "exceeds the maximum texture dimension {max_dimension}"
            )));
        }

        let label = format!("blur_{role}_texture");
        let (texture, error) = self.scoped(|device| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: TARGET_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC
                    | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            })
        });
        if let Some(error) = error {
            return Err(incomplete(error.to_string()));
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(WgpuTexture { texture, view })
    }

    fn destroy_texture(&mut self, texture: WgpuTexture) {
        texture.texture.destroy();
    }

    fn upload(&mut self, texture: &WgpuTexture, frame: &VideoFrame<'_>) -> Result<()> {
        if (frame.width, frame.height) != texture.size() {
            return Err(BlurError::DrawFailed {
                label: "upload".to_string(),
                reason: format!(
                    "frame is {}x{}, texture is {:?}",
                    frame.width,
                    frame.height,
                    texture.size()
                ),
            });
        }
        let pixels = frame.to_rgba8()?;

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(frame.width * 4),
                rows_per_image: Some(frame.height),
            },
            wgpu::Extent3d {
                width: frame.width,
                height: frame.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn draw(&mut self, pass: &PassDescriptor<'_, Self>) -> Result<()> {
        let bytes = pass.uniforms.to_bytes(pass.program.tier);
        self.ensure_uniform_buffer(bytes.len());
        let Some(uniform_buffer) = self.uniform_buffer.as_ref() else {
            return Err(BlurError::DrawFailed {
                label: pass.label.to_string(),
                reason: "uniform buffer unavailable".to_string(),
            });
        };
        self.queue.write_buffer(uniform_buffer, 0, &bytes);

        let ((), error) = self.scoped(|device| {
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(pass.label),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&pass.source.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: uniform_buffer.as_entire_binding(),
                    },
                ],
            });

            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(pass.label),
            });
            {
                let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some(pass.label),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &pass.destination.view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                render_pass.set_pipeline(&pass.program.pipeline);
                render_pass.set_bind_group(0, &bind_group, &[]);
                render_pass.draw(0..3, 0..1);
            }
            self.queue.submit(std::iter::once(encoder.finish()));
        });

        match error {
            Some(error) => Err(BlurError::DrawFailed {
                label: pass.label.to_string(),
                reason: error.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn read_pixels(&mut self, texture: &WgpuTexture) -> Result<Vec<u8>> {
        let (width, height) = texture.size();
        let (unpadded_bytes_per_row, padded_bytes_per_row) = compute_padded_bytes_per_row(width, 4);
        let buffer_size = padded_bytes_per_row as usize * height as usize;
        self.ensure_readback_buffer(buffer_size);
        let Some(readback_buffer) = self.readback_buffer.as_ref() else {
            return Err(BlurError::Readback("readback buffer unavailable".to_string()));
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("blur_readback_encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: readback_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let mut readback_bytes = std::mem::take(&mut self.readback_bytes);
        let mapped = map_readback_buffer_into(
            &self.device,
            readback_buffer,
            buffer_size as u64,
            &mut readback_bytes,
        );
        let result = mapped.map(|()| {
            let mut pixels = Vec::new();
            copy_padded_readback_rows(
                &readback_bytes,
                height,
                unpadded_bytes_per_row,
                padded_bytes_per_row,
                &mut pixels,
            );
            pixels
        });
        self.readback_bytes = readback_bytes;
        result
    }
}
