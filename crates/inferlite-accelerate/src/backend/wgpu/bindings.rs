use wgpu::{
    BindGroupLayoutEntry, BindingType, BufferBindingType, ShaderStages, StorageTextureAccess,
    TextureSampleType, TextureViewDimension,
};

use super::pipelines::ProgramKind;

/// Sampled (read-only) image input, read with `textureLoad`.
pub fn image_read_entry(binding: u32) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::COMPUTE,
        ty: BindingType::Texture {
            sample_type: TextureSampleType::Float { filterable: false },
            view_dimension: TextureViewDimension::D2Array,
            multisampled: false,
        },
        count: None,
    }
}

/// Write-only storage image output.
pub fn image_write_entry(binding: u32, format: wgpu::TextureFormat) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::COMPUTE,
        ty: BindingType::StorageTexture {
            access: StorageTextureAccess::WriteOnly,
            format,
            view_dimension: TextureViewDimension::D2Array,
        },
        count: None,
    }
}

pub fn uniform_entry(binding: u32) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::COMPUTE,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Layout entries matching the `@binding` declarations of each program.
pub fn layout_entries(kind: ProgramKind, format: wgpu::TextureFormat) -> Vec<BindGroupLayoutEntry> {
    match kind {
        ProgramKind::Mul => vec![
            image_read_entry(0),
            image_read_entry(1),
            image_write_entry(2, format),
            uniform_entry(3),
        ],
        ProgramKind::Reshape => vec![
            image_read_entry(0),
            image_write_entry(1, format),
            uniform_entry(2),
        ],
    }
}
