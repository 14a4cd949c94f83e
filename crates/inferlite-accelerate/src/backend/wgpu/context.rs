use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use futures::channel::oneshot;
use inferlite_kernel_api::{DDim, KernelError, KernelResult};
use log::{debug, error, info};
use pollster::block_on;
use wgpu::util::DeviceExt;

use super::cache::key::compute_pipeline_hash_bytes;
use super::cache::persist::{default_cache_dir, persist_pipeline_meta};
use super::cache::registry::PipelineRegistry;
use super::config::{
    select_image_tile, ImageContextOptions, DEFAULT_IMAGE_TILE, MAX_IMAGE_TILE,
};
use super::image::{DeviceImage, ImageLayout};
use super::pipelines::{
    create_pipeline, program_name, render_wgsl, PipelineBundle, ProgramKind,
};
use super::types::{self, ImagePrecision};
use crate::telemetry::KernelTelemetry;

const IMAGE_OP: &str = "image";

/// Device, queue and shared caches used by every image kernel.
///
/// Shareable across threads. Error scopes live on a single device-wide
/// stack, so every push/pop pair runs under `scope_lock`.
pub struct ImageContext {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    adapter_info: wgpu::AdapterInfo,
    limits: wgpu::Limits,
    image_tile: u32,
    pipelines: PipelineRegistry,
    pipeline_cache_dir: Option<PathBuf>,
    telemetry: KernelTelemetry,
    scope_lock: Mutex<()>,
}

impl ImageContext {
    pub fn new(opts: ImageContextOptions) -> Result<Self> {
        block_on(Self::new_async(opts))
    }

    pub async fn new_async(opts: ImageContextOptions) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: opts.power_preference.to_wgpu(),
                force_fallback_adapter: opts.force_fallback_adapter,
                compatible_surface: None,
            })
            .await
            .ok_or_else(|| anyhow!("wgpu: no compatible adapter found"))?;
        let adapter_info = adapter.get_info();

        let (device_raw, queue_raw) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("InferLite Image Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                },
                None,
            )
            .await?;
        let device = Arc::new(device_raw);
        install_device_error_handlers(&device);
        let queue = Arc::new(queue_raw);
        let limits = device.limits();

        let image_tile = opts
            .image_tile
            .unwrap_or(DEFAULT_IMAGE_TILE)
            .clamp(1, MAX_IMAGE_TILE);
        let pipeline_cache_dir = if opts.persist_pipelines {
            opts.pipeline_cache_dir.clone().or_else(|| {
                default_cache_dir().map(|d| d.join(format!("device-{}", adapter_info.device)))
            })
        } else {
            None
        };

        info!(
            "wgpu adapter '{}' ({:?}) ready: image_tile={} max_invocations={} \
             max_texture_2d={} max_layers={}",
            adapter_info.name,
            adapter_info.backend,
            image_tile,
            limits.max_compute_invocations_per_workgroup,
            limits.max_texture_dimension_2d,
            limits.max_texture_array_layers,
        );
        if let Some(dir) = &pipeline_cache_dir {
            debug!("persisting image pipelines to {}", dir.display());
        }

        Ok(Self {
            device,
            queue,
            adapter_info,
            limits,
            image_tile,
            pipelines: PipelineRegistry::new(),
            pipeline_cache_dir,
            telemetry: KernelTelemetry::new(),
            scope_lock: Mutex::new(()),
        })
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    pub fn limits(&self) -> &wgpu::Limits {
        &self.limits
    }

    pub fn image_tile(&self) -> u32 {
        self.image_tile
    }

    pub fn telemetry(&self) -> &KernelTelemetry {
        &self.telemetry
    }

    pub fn pipeline_cache_dir(&self) -> Option<&Path> {
        self.pipeline_cache_dir.as_deref()
    }

    pub fn cached_program_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Workgroup edge for a program writing `layout`.
    pub fn tile_for(&self, layout: &ImageLayout) -> u32 {
        select_image_tile(
            layout.width as u32,
            layout.height as u32,
            self.image_tile,
            self.limits.max_compute_invocations_per_workgroup,
        )
    }

    /// Allocate an uninitialised image of `dims`.
    pub fn create_image<P: ImagePrecision>(
        &self,
        dims: impl Into<DDim>,
    ) -> KernelResult<DeviceImage> {
        self.allocate_image::<P>(IMAGE_OP, "inferlite-image", dims.into())
    }

    pub(crate) fn allocate_image<P: ImagePrecision>(
        &self,
        op: &'static str,
        label: &str,
        dims: DDim,
    ) -> KernelResult<DeviceImage> {
        if dims.rank() > 4 {
            return Err(KernelError::invalid_shape(
                op,
                format!("rank {} exceeds 4 for {dims}", dims.rank()),
            ));
        }
        let layout = ImageLayout::from_dims(&dims).ok_or_else(|| {
            KernelError::invalid_shape(op, format!("element count of {dims} overflows"))
        })?;
        if dims.has_zero_extent() {
            return Err(KernelError::invalid_shape(
                op,
                format!("zero-sized extent in {dims}"),
            ));
        }
        let max_2d = self.limits.max_texture_dimension_2d as usize;
        if layout.width > max_2d || layout.height > max_2d {
            return Err(KernelError::allocation(
                op,
                format!(
                    "image {}x{} exceeds max texture dimension {max_2d}",
                    layout.width, layout.height
                ),
            ));
        }
        let max_layers = self.limits.max_texture_array_layers as usize;
        let texture_extent = layout.texture_extent();
        if texture_extent.depth_or_array_layers as usize > max_layers {
            return Err(KernelError::allocation(
                op,
                format!("{} layers exceed max array layers {max_layers}", layout.layers),
            ));
        }

        let scope = self.error_scope();
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: texture_extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: P::TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(label),
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });
        let validation = block_on(self.device.pop_error_scope());
        let oom = block_on(self.device.pop_error_scope());
        drop(scope);
        if let Some(err) = oom.or(validation) {
            return Err(KernelError::allocation(op, err.to_string()));
        }

        Ok(DeviceImage {
            texture,
            view,
            dims,
            layout,
            precision: P::PRECISION,
            label: label.to_string(),
        })
    }

    /// Allocate an image of `dims` and fill it from row-major `values`.
    pub fn upload_image<P: ImagePrecision>(
        &self,
        values: &[f32],
        dims: impl Into<DDim>,
    ) -> KernelResult<DeviceImage> {
        let image = self.allocate_image::<P>(IMAGE_OP, "inferlite-upload", dims.into())?;
        self.write_image::<P>(&image, values)?;
        Ok(image)
    }

    /// Overwrite the contents of `image` with row-major `values`.
    pub fn write_image<P: ImagePrecision>(
        &self,
        image: &DeviceImage,
        values: &[f32],
    ) -> KernelResult<()> {
        if image.precision != P::PRECISION {
            return Err(KernelError::invalid_param(
                IMAGE_OP,
                format!(
                    "image '{}' holds {} data, writer expects {}",
                    image.label,
                    image.precision.as_str(),
                    P::PRECISION.as_str()
                ),
            ));
        }
        let expected = image.layout.element_count();
        if values.len() != expected {
            return Err(KernelError::invalid_shape(
                IMAGE_OP,
                format!(
                    "{} values supplied for image of dims {} ({expected} elements)",
                    values.len(),
                    image.dims
                ),
            ));
        }
        let layout = image.layout;
        let bytes = P::encode_texels(&layout.pack(values));
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &image.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &bytes,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(layout.width as u32 * P::TEXEL_BYTES),
                rows_per_image: Some(layout.height as u32),
            },
            layout.extent(),
        );
        self.telemetry.record_upload_bytes(bytes.len() as u64);
        Ok(())
    }

    /// Copy `image` back to the host as row-major values. Waits for all
    /// previously submitted work.
    pub fn download_image(&self, image: &DeviceImage) -> KernelResult<Vec<f32>> {
        let layout = image.layout;
        let texel_bytes = types::texel_bytes(image.precision);
        let row_bytes = layout.width as u32 * texel_bytes;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_row_bytes = row_bytes.div_ceil(align) * align;
        let rows = (layout.height * layout.layers) as u64;
        let size_bytes = padded_row_bytes as u64 * rows;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("inferlite-image-readback"),
            size: size_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("inferlite-download-encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &image.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row_bytes),
                    rows_per_image: Some(layout.height as u32),
                },
            },
            layout.extent(),
        );
        self.queue.submit(Some(encoder.finish()));

        let padded = block_on(self.map_readback_bytes(staging))?;
        let mut packed = Vec::with_capacity(row_bytes as usize * rows as usize);
        for row in padded.chunks_exact(padded_row_bytes as usize) {
            packed.extend_from_slice(&row[..row_bytes as usize]);
        }
        self.telemetry.record_download_bytes(packed.len() as u64);
        let texels = types::decode_texels(image.precision, &packed);
        Ok(layout.unpack(&texels))
    }

    async fn map_readback_bytes(&self, staging: wgpu::Buffer) -> KernelResult<Vec<u8>> {
        let slice = staging.slice(..);
        let (tx, rx) = oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        self.device.poll(wgpu::Maintain::Wait);
        let map_result = rx
            .await
            .map_err(|_| KernelError::execution(IMAGE_OP, "map_async callback dropped"))?;
        map_result.map_err(|e| KernelError::execution(IMAGE_OP, e.to_string()))?;
        let data = slice.get_mapped_range();
        let out = data.to_vec();
        drop(data);
        staging.unmap();
        Ok(out)
    }

    /// Uniform buffer initialised with `value`.
    pub fn create_param_buffer<T: bytemuck::Pod>(
        &self,
        op: &'static str,
        label: &str,
        value: &T,
    ) -> KernelResult<wgpu::Buffer> {
        let _scope = self.error_scope();
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::bytes_of(value),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
        if let Some(err) = block_on(self.device.pop_error_scope()) {
            return Err(KernelError::allocation(op, err.to_string()));
        }
        Ok(buffer)
    }

    /// Compiled `kind` program for precision `P` and workgroup `tile`,
    /// shared through the context cache.
    pub fn program<P: ImagePrecision>(
        &self,
        kind: ProgramKind,
        tile: u32,
    ) -> KernelResult<Arc<PipelineBundle>> {
        let name = program_name::<P>(kind);
        let source = render_wgsl::<P>(kind, tile);
        self.compile_program(kind, P::TEXTURE_FORMAT, &name, tile, &source, true)
    }

    pub(crate) fn compile_program(
        &self,
        kind: ProgramKind,
        format: wgpu::TextureFormat,
        name: &str,
        tile: u32,
        source: &str,
        persist: bool,
    ) -> KernelResult<Arc<PipelineBundle>> {
        let layout_tag = kind.layout_tag(format);
        let key = compute_pipeline_hash_bytes(source.as_bytes(), &layout_tag, tile);
        if let Some(bundle) = self.pipelines.get(&key) {
            self.telemetry.record_pipeline_hit();
            return Ok(bundle);
        }
        self.telemetry.record_pipeline_miss();

        let scope = self.error_scope();
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let bundle = create_pipeline(&self.device, name, kind, format, tile, source);
        let validation = block_on(self.device.pop_error_scope());
        drop(scope);
        if let Some(err) = validation {
            return Err(KernelError::compile(kind.base_name(), name, err.to_string()));
        }
        debug!("compiled program '{name}' (tile {tile}, key {key:016x})");

        let bundle = Arc::new(bundle);
        self.pipelines.insert(key, bundle.clone());
        if persist {
            if let Some(dir) = &self.pipeline_cache_dir {
                persist_pipeline_meta(dir, key, name, kind, &layout_tag, tile, source.as_bytes());
            }
        }
        Ok(bundle)
    }

    /// Encode work with `record` into one command buffer and submit it
    /// without waiting. Validation errors raised while encoding or
    /// submitting come back as [`KernelError::Execution`].
    ///
    /// `record` runs with the error-scope lock held and must not call back
    /// into methods that allocate or compile.
    pub fn submit_with<F>(&self, op: &'static str, label: &str, record: F) -> KernelResult<()>
    where
        F: FnOnce(&mut wgpu::CommandEncoder),
    {
        let _scope = self.error_scope();
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        record(&mut encoder);
        self.queue.submit(Some(encoder.finish()));
        if let Some(err) = block_on(self.device.pop_error_scope()) {
            return Err(KernelError::execution(op, err.to_string()));
        }
        Ok(())
    }

    fn error_scope(&self) -> MutexGuard<'_, ()> {
        self.scope_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn install_device_error_handlers(device: &wgpu::Device) {
    device.on_uncaptured_error(Box::new(|error| {
        error!("wgpu uncaptured error: {:?}", error);
    }));
    device.set_device_lost_callback(|reason, message| {
        error!("wgpu device lost: reason={:?}, message={}", reason, message);
    });
}
