use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use super::bindings::layout_entries;
use super::shaders::{mul::MUL_SHADER, reshape::RESHAPE_SHADER};
use super::types::ImagePrecision;

/// Compute programs the image backend knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgramKind {
    Mul,
    Reshape,
}

impl ProgramKind {
    pub const ALL: [ProgramKind; 2] = [ProgramKind::Mul, ProgramKind::Reshape];

    pub fn base_name(self) -> &'static str {
        match self {
            ProgramKind::Mul => "mul",
            ProgramKind::Reshape => "reshape",
        }
    }

    fn template(self) -> &'static str {
        match self {
            ProgramKind::Mul => MUL_SHADER,
            ProgramKind::Reshape => RESHAPE_SHADER,
        }
    }

    /// Bind group layout tag, e.g. `mul:rgba16float`. Persisted alongside the
    /// WGSL so the layout can be rebuilt without the precision type.
    pub fn layout_tag(self, format: wgpu::TextureFormat) -> String {
        format!("{}:{}", self.base_name(), wgsl_format_name(format))
    }

    pub fn parse_layout_tag(tag: &str) -> Option<(ProgramKind, wgpu::TextureFormat)> {
        let (name, fmt) = tag.split_once(':')?;
        let kind = match name {
            "mul" => ProgramKind::Mul,
            "reshape" => ProgramKind::Reshape,
            _ => return None,
        };
        let format = match fmt {
            "rgba32float" => wgpu::TextureFormat::Rgba32Float,
            "rgba16float" => wgpu::TextureFormat::Rgba16Float,
            _ => return None,
        };
        Some((kind, format))
    }
}

fn wgsl_format_name(format: wgpu::TextureFormat) -> &'static str {
    match format {
        wgpu::TextureFormat::Rgba16Float => "rgba16float",
        _ => "rgba32float",
    }
}

/// `mul`, `mul_half`, `reshape`, `reshape_half`.
pub fn program_name<P: ImagePrecision>(kind: ProgramKind) -> String {
    format!("{}{}", kind.base_name(), P::PROGRAM_SUFFIX)
}

/// WGSL source for `kind`, specialised to the precision's storage format and
/// a square workgroup of `tile x tile`.
pub fn render_wgsl<P: ImagePrecision>(kind: ProgramKind, tile: u32) -> String {
    kind.template()
        .replace("@FMT@", P::WGSL_FORMAT)
        .replace("@WG@", &tile.to_string())
}

#[derive(Debug)]
pub struct PipelineBundle {
    pub pipeline: wgpu::ComputePipeline,
    pub layout: wgpu::BindGroupLayout,
    pub name: String,
    pub kind: ProgramKind,
    pub tile: u32,
}

pub fn create_pipeline(
    device: &wgpu::Device,
    name: &str,
    kind: ProgramKind,
    format: wgpu::TextureFormat,
    tile: u32,
    shader_source: &str,
) -> PipelineBundle {
    let entries = layout_entries(kind, format);
    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(&format!("inferlite-{name}-bgl")),
        entries: &entries,
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&format!("inferlite-{name}-layout")),
        bind_group_layouts: &[&layout],
        push_constant_ranges: &[],
    });
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&format!("inferlite-{name}-shader")),
        source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(shader_source)),
    });
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(&format!("inferlite-{name}-pipeline")),
        module: &module,
        layout: Some(&pipeline_layout),
        entry_point: "main",
    });
    PipelineBundle {
        pipeline,
        layout,
        name: name.to_string(),
        kind,
        tile,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::wgpu::types::{Float, Half};

    #[test]
    fn program_names_carry_precision_suffix() {
        assert_eq!(program_name::<Float>(ProgramKind::Mul), "mul");
        assert_eq!(program_name::<Half>(ProgramKind::Mul), "mul_half");
        assert_eq!(program_name::<Half>(ProgramKind::Reshape), "reshape_half");
    }

    #[test]
    fn rendered_wgsl_has_no_placeholders() {
        let src = render_wgsl::<Half>(ProgramKind::Reshape, 4);
        assert!(!src.contains("@FMT@"));
        assert!(!src.contains("@WG@"));
        assert!(src.contains("texture_storage_2d_array<rgba16float, write>"));
        assert!(src.contains("@workgroup_size(4, 4, 1)"));
    }

    #[test]
    fn layout_tags_round_trip() {
        for kind in ProgramKind::ALL {
            for format in [
                wgpu::TextureFormat::Rgba32Float,
                wgpu::TextureFormat::Rgba16Float,
            ] {
                let tag = kind.layout_tag(format);
                assert_eq!(ProgramKind::parse_layout_tag(&tag), Some((kind, format)));
            }
        }
        assert_eq!(ProgramKind::parse_layout_tag("conv:rgba32float"), None);
    }
}
