//! [`GpuBackend`] on top of `wgpu`.
//!
//! Commands are encoded as they arrive: a clear is a render pass that only clears, and
//! every quad draw is its own render pass loading the bound target. The encoder is
//! submitted at the end of the frame or before a readback.

use ahash::{HashMap, HashMapExt};
use futures::executor::block_on;
use tracing::{debug, info, warn};
use wgpu::util::DeviceExt;
use wgpu::{CompositeAlphaMode, InstanceDescriptor, SurfaceTarget};

use crate::color::Color;
use crate::config::WgpuBackendConfig;
use crate::error::GpuError;
use crate::filter::FilterEffect;
use crate::gpu::{
    BlendMode, GpuBackend, ProgramDescriptor, Quad, QuadDraw, QuadVertex, ShaderSource, Target,
    QUAD_INDICES,
};
use crate::id::{ProgramId, TargetId, TextureId};
use crate::image_data::Image;
use crate::shaders::{build_program_wgsl, validate_custom_filter, PASSTHROUGH_FS};

/// Format of uploaded images and of the headless screen.
const IMAGE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

const QUAD_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct QuadUniforms {
    mvp: [[f32; 4]; 4],
    intensity: f32,
    _padding: [f32; 3],
}

impl QuadUniforms {
    fn new(mvp: [[f32; 4]; 4], intensity: f32) -> Self {
        Self {
            mvp,
            intensity,
            _padding: [0.0; 3],
        }
    }
}

struct Program {
    source_over: wgpu::RenderPipeline,
    replace: wgpu::RenderPipeline,
}

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: (u32, u32),
}

struct QuadBuffers {
    full_screen: wgpu::Buffer,
    centered: wgpu::Buffer,
    indices: wgpu::Buffer,
}

/// Renders through `wgpu`, either into a window surface or into a headless texture.
pub struct WgpuBackend {
    surface: Option<wgpu::Surface<'static>>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,

    /// The screen when there is no surface.
    headless_screen: Option<GpuTexture>,
    frame: Option<(wgpu::SurfaceTexture, wgpu::TextureView)>,
    encoder: Option<wgpu::CommandEncoder>,

    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    quads: QuadBuffers,

    programs: HashMap<ProgramId, Program>,
    textures: HashMap<TextureId, GpuTexture>,
    targets: HashMap<TargetId, TextureId>,
    bound: Target,
    blend_mode: BlendMode,
    next_handle: u64,
}

impl WgpuBackend {
    /// Creates a backend presenting to `window`.
    pub async fn new(
        window: impl Into<SurfaceTarget<'static>>,
        physical_size: (u32, u32),
        backend_config: WgpuBackendConfig,
    ) -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&InstanceDescriptor::default());
        let surface = instance
            .create_surface(window)
            .map_err(|err| GpuError::Surface(err.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: backend_config.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| GpuError::NoAdapter)?;
        let (device, queue) = request_device(&adapter).await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| GpuError::Surface("surface reports no formats".into()))?;

        let alpha_mode = if backend_config.transparent
            && surface_caps
                .alpha_modes
                .contains(&CompositeAlphaMode::PreMultiplied)
        {
            info!("Using PreMultiplied alpha mode for transparency");
            CompositeAlphaMode::PreMultiplied
        } else if backend_config.transparent
            && surface_caps
                .alpha_modes
                .contains(&CompositeAlphaMode::PostMultiplied)
        {
            info!("Using PostMultiplied alpha mode for transparency");
            CompositeAlphaMode::PostMultiplied
        } else {
            if backend_config.transparent {
                warn!("Transparency requested but no suitable alpha mode available, falling back to Opaque");
            }
            CompositeAlphaMode::Opaque
        };

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: physical_size.0.max(1),
            height: physical_size.1.max(1),
            present_mode: if backend_config.vsync {
                wgpu::PresentMode::AutoVsync
            } else {
                wgpu::PresentMode::AutoNoVsync
            },
            desired_maximum_frame_latency: 2,
            alpha_mode,
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        Ok(Self::build_from_device(Some(surface), device, queue, config))
    }

    /// Creates a backend without a window. The screen is an off-screen texture that
    /// [`GpuBackend::read_pixels`] can read back.
    ///
    /// Fails with [`GpuError::NoAdapter`] where no GPU is available.
    pub async fn new_headless(
        physical_size: (u32, u32),
        backend_config: WgpuBackendConfig,
    ) -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: backend_config.power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| GpuError::NoAdapter)?;
        let (device, queue) = request_device(&adapter).await?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            format: IMAGE_FORMAT,
            width: physical_size.0.max(1),
            height: physical_size.1.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            desired_maximum_frame_latency: 2,
            alpha_mode: CompositeAlphaMode::Opaque,
            view_formats: vec![],
        };

        let mut backend = Self::build_from_device(None, device, queue, config);
        backend.headless_screen = Some(backend.create_render_texture(
            "headless_screen",
            (backend.config.width, backend.config.height),
        ));
        Ok(backend)
    }

    fn build_from_device(
        surface: Option<wgpu::Surface<'static>>,
        device: wgpu::Device,
        queue: wgpu::Queue,
        config: wgpu::SurfaceConfiguration,
    ) -> Self {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("quad_bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("quad_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let quads = QuadBuffers {
            full_screen: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("full_screen_quad"),
                contents: bytemuck::cast_slice(&Quad::FullScreen.vertices()),
                usage: wgpu::BufferUsages::VERTEX,
            }),
            centered: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("centered_quad"),
                contents: bytemuck::cast_slice(&Quad::Centered.vertices()),
                usage: wgpu::BufferUsages::VERTEX,
            }),
            indices: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("quad_indices"),
                contents: bytemuck::cast_slice(&QUAD_INDICES),
                usage: wgpu::BufferUsages::INDEX,
            }),
        };

        Self {
            surface,
            device,
            queue,
            config,
            headless_screen: None,
            frame: None,
            encoder: None,
            bind_group_layout,
            pipeline_layout,
            sampler,
            quads,
            programs: HashMap::new(),
            textures: HashMap::new(),
            targets: HashMap::new(),
            bound: Target::Screen,
            blend_mode: BlendMode::default(),
            next_handle: 0,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Format of the screen and of every off-screen target.
    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    fn next_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn create_render_texture(&self, label: &str, size: (u32, u32)) -> GpuTexture {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.0,
                height: size.1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.config.format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        GpuTexture {
            texture,
            view,
            size,
        }
    }

    fn build_pipeline(
        &self,
        label: &str,
        module: &wgpu::ShaderModule,
        blend: wgpu::BlendState,
    ) -> wgpu::RenderPipeline {
        self.device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &QUAD_ATTRIBUTES,
                    }],
                },
                fragment: Some(wgpu::FragmentState {
                    module,
                    entry_point: Some("fs_main"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.config.format,
                        blend: Some(blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
    }

    /// Submits everything encoded so far.
    fn flush(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    fn read_texture(&self, texture: &GpuTexture) -> Option<Vec<u8>> {
        let (width, height) = texture.size;
        let (unpadded_bytes_per_row, padded_bytes_per_row) = compute_padded_bytes_per_row(width);

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback_buffer"),
            size: padded_bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback_encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
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

        let padded = map_readback_buffer(&self.device, &buffer)?;
        let mut pixels = Vec::with_capacity((unpadded_bytes_per_row * height) as usize);
        for row in padded
            .chunks_exact(padded_bytes_per_row as usize)
            .take(height as usize)
        {
            pixels.extend_from_slice(&row[..unpadded_bytes_per_row as usize]);
        }

        if matches!(
            texture.texture.format(),
            wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb
        ) {
            pixels.chunks_exact_mut(4).for_each(|pixel| pixel.swap(0, 2));
        }
        Some(pixels)
    }
}

async fn request_device(adapter: &wgpu::Adapter) -> Result<(wgpu::Device, wgpu::Queue), GpuError> {
    adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("strata_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
        })
        .await
        .map_err(|err| GpuError::Device(err.to_string()))
}

fn compute_padded_bytes_per_row(width: u32) -> (u32, u32) {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded = unpadded.div_ceil(align) * align;
    (unpadded, padded)
}

fn map_readback_buffer(device: &wgpu::Device, buffer: &wgpu::Buffer) -> Option<Vec<u8>> {
    let buffer_slice = buffer.slice(..);
    let (sender, receiver) = std::sync::mpsc::channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        if sender.send(result).is_err() {
            warn!("Failed to send map_async result from callback");
        }
    });

    let _ = device.poll(wgpu::MaintainBase::Wait);

    match receiver.recv() {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            warn!(error = ?err, "Failed to map readback buffer");
            return None;
        }
        Err(err) => {
            warn!(error = %err, "Failed to receive mapped buffer result");
            return None;
        }
    }

    let bytes = buffer_slice.get_mapped_range().to_vec();
    buffer.unmap();
    Some(bytes)
}

/// The view draws into when `bound` is current.
fn resolve_view<'a>(
    bound: Target,
    frame: Option<&'a (wgpu::SurfaceTexture, wgpu::TextureView)>,
    headless_screen: Option<&'a GpuTexture>,
    targets: &HashMap<TargetId, TextureId>,
    textures: &'a HashMap<TextureId, GpuTexture>,
) -> Option<&'a wgpu::TextureView> {
    match bound {
        Target::Screen => frame
            .map(|(_, view)| view)
            .or_else(|| headless_screen.map(|screen| &screen.view)),
        Target::Offscreen(target) => {
            let texture = targets.get(&target)?;
            textures.get(texture).map(|texture| &texture.view)
        }
    }
}

fn blend_state(mode: BlendMode) -> wgpu::BlendState {
    match mode {
        BlendMode::SourceOver => wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::SrcAlpha,
                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                operation: wgpu::BlendOperation::Add,
            },
        },
        BlendMode::Replace => wgpu::BlendState::REPLACE,
    }
}

impl GpuBackend for WgpuBackend {
    fn begin_frame(&mut self) -> Result<(), GpuError> {
        self.bound = Target::Screen;
        let Some(surface) = &self.surface else {
            return Ok(());
        };

        let frame = match surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                debug!("surface lost or outdated, reconfiguring");
                surface.configure(&self.device, &self.config);
                surface
                    .get_current_texture()
                    .map_err(|err| GpuError::Surface(err.to_string()))?
            }
            Err(err) => return Err(GpuError::Surface(err.to_string())),
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.frame = Some((frame, view));
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), GpuError> {
        self.flush();
        if let Some((frame, _view)) = self.frame.take() {
            frame.present();
        }
        Ok(())
    }

    fn set_blend_mode(&mut self, mode: BlendMode) {
        self.blend_mode = mode;
    }

    fn create_program(&mut self, descriptor: &ProgramDescriptor<'_>) -> Result<ProgramId, GpuError> {
        let fragment = match descriptor.source {
            ShaderSource::Passthrough => PASSTHROUGH_FS,
            ShaderSource::Filter(effect) => effect.fragment_source(),
        };
        if let ShaderSource::Filter(FilterEffect::Custom(_)) = descriptor.source {
            validate_custom_filter(descriptor.label, fragment)?;
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(descriptor.label),
                source: wgpu::ShaderSource::Wgsl(build_program_wgsl(fragment).into()),
            });
        let program = Program {
            source_over: self.build_pipeline(
                descriptor.label,
                &module,
                blend_state(BlendMode::SourceOver),
            ),
            replace: self.build_pipeline(descriptor.label, &module, blend_state(BlendMode::Replace)),
        };
        if let Some(err) = block_on(self.device.pop_error_scope()) {
            return Err(GpuError::ShaderCompilation {
                label: descriptor.label.to_string(),
                message: err.to_string(),
            });
        }

        let id = ProgramId(self.next_handle());
        self.programs.insert(id, program);
        debug!(program = %id, label = descriptor.label, "created program");
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        if self.programs.remove(&program).is_none() {
            debug!(%program, "delete of unknown program ignored");
        }
    }

    fn create_texture(&mut self, image: &Image) -> Result<TextureId, GpuError> {
        let (width, height) = image.size();
        let max = self.device.limits().max_texture_dimension_2d;
        if width > max || height > max {
            return Err(GpuError::TextureAllocation(format!(
                "{width}x{height} exceeds the device limit of {max}"
            )));
        }

        let extent = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("content_texture"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: IMAGE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.pixels(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            extent,
        );
        if let Some(err) = block_on(self.device.pop_error_scope()) {
            return Err(GpuError::TextureAllocation(err.to_string()));
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = TextureId(self.next_handle());
        self.textures.insert(
            id,
            GpuTexture {
                texture,
                view,
                size: (width, height),
            },
        );
        Ok(id)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if self.targets.values().any(|backing| *backing == texture) {
            warn!(%texture, "refusing to delete a target's backing texture directly");
            return;
        }
        if self.textures.remove(&texture).is_none() {
            debug!(%texture, "delete of unknown texture ignored");
        }
    }

    fn create_target(&mut self, size: (u32, u32)) -> Result<(TargetId, TextureId), GpuError> {
        let (width, height) = size;
        let max = self.device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(GpuError::IncompleteTarget {
                width,
                height,
                reason: format!("dimensions must be within 1..={max}"),
            });
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let render_texture = self.create_render_texture("intermediate_target", size);
        if let Some(err) = block_on(self.device.pop_error_scope()) {
            return Err(GpuError::IncompleteTarget {
                width,
                height,
                reason: err.to_string(),
            });
        }

        let target = TargetId(self.next_handle());
        let texture = TextureId(self.next_handle());
        self.textures.insert(texture, render_texture);
        self.targets.insert(target, texture);
        Ok((target, texture))
    }

    fn delete_target(&mut self, target: TargetId) {
        match self.targets.remove(&target) {
            Some(texture) => {
                self.textures.remove(&texture);
            }
            None => debug!(%target, "delete of unknown target ignored"),
        }
    }

    fn bind_target(&mut self, target: Target) {
        self.bound = target;
    }

    fn clear(&mut self, color: Color) {
        let Some(view) = resolve_view(
            self.bound,
            self.frame.as_ref(),
            self.headless_screen.as_ref(),
            &self.targets,
            &self.textures,
        ) else {
            warn!(target = ?self.bound, "clear without a drawable target skipped");
            return;
        };

        let [r, g, b, a] = color.normalize();
        let encoder = self.encoder.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("frame_encoder"),
                })
        });
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("clear_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: r as f64,
                        g: g as f64,
                        b: b as f64,
                        a: a as f64,
                    }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }

    fn draw_quad(&mut self, draw: &QuadDraw) {
        let Some(program) = self.programs.get(&draw.program) else {
            warn!(program = %draw.program, "draw with unknown program skipped");
            return;
        };
        if let Target::Offscreen(target) = self.bound {
            if self.targets.get(&target) == Some(&draw.texture) {
                warn!(%target, "draw sampling the bound target's own texture skipped");
                return;
            }
        }
        let Some(source) = self.textures.get(&draw.texture) else {
            warn!(texture = %draw.texture, "draw with unknown texture skipped");
            return;
        };
        let Some(view) = resolve_view(
            self.bound,
            self.frame.as_ref(),
            self.headless_screen.as_ref(),
            &self.targets,
            &self.textures,
        ) else {
            warn!(target = ?self.bound, "draw without a drawable target skipped");
            return;
        };

        let uniforms = QuadUniforms::new(draw.mvp, draw.intensity);
        let uniform_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("quad_uniforms"),
                contents: bytemuck::cast_slice(&[uniforms]),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("quad_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&source.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        let pipeline = match self.blend_mode {
            BlendMode::SourceOver => &program.source_over,
            BlendMode::Replace => &program.replace,
        };
        let vertices = match draw.quad {
            Quad::FullScreen => &self.quads.full_screen,
            Quad::Centered => &self.quads.centered,
        };

        let encoder = self.encoder.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("frame_encoder"),
                })
        });
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("quad_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.set_vertex_buffer(0, vertices.slice(..));
        pass.set_index_buffer(self.quads.indices.slice(..), wgpu::IndexFormat::Uint16);
        pass.draw_indexed(0..QUAD_INDICES.len() as u32, 0, 0..1);
    }

    fn viewport_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn resize(&mut self, size: (u32, u32)) {
        if size.0 == 0 || size.1 == 0 || size == self.viewport_size() {
            return;
        }
        self.config.width = size.0;
        self.config.height = size.1;

        if let Some(surface) = &self.surface {
            surface.configure(&self.device, &self.config);
        }
        if self.headless_screen.is_some() {
            self.flush();
            self.headless_screen = Some(self.create_render_texture("headless_screen", size));
        }
    }

    /// Reads back an off-screen target, or the screen of a headless backend. Surface
    /// frames are not readable.
    fn read_pixels(&mut self, target: Target) -> Option<Vec<u8>> {
        self.flush();
        match target {
            Target::Screen => self
                .headless_screen
                .as_ref()
                .and_then(|screen| self.read_texture(screen)),
            Target::Offscreen(target) => {
                let texture = self.targets.get(&target)?;
                self.textures
                    .get(texture)
                    .and_then(|texture| self.read_texture(texture))
            }
        }
    }
}
