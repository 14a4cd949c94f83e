use crate::backend::wgpu::image::ImageLayout;

pub fn dispatch_size_dim(elements: u32, tile: u32) -> u32 {
    if elements == 0 {
        0
    } else {
        elements.div_ceil(tile.max(1)).max(1)
    }
}

/// Workgroup counts covering every texel of an image: `(ceil(W / tile),
/// ceil(H / tile), layers)`.
pub fn image_grid(layout: &ImageLayout, tile: u32) -> (u32, u32, u32) {
    (
        dispatch_size_dim(layout.width as u32, tile),
        dispatch_size_dim(layout.height as u32, tile),
        layout.layers as u32,
    )
}

/// Record one compute pass into `encoder`.
pub fn encode_pass(
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    pipeline: &wgpu::ComputePipeline,
    bind_group: &wgpu::BindGroup,
    grid: (u32, u32, u32),
) {
    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some(label),
        timestamp_writes: None,
    });
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, bind_group, &[]);
    pass.dispatch_workgroups(grid.0, grid.1, grid.2);
}

#[cfg(test)]
mod tests {
    use super::*;
    use inferlite_kernel_api::DDim;

    #[test]
    fn grid_rounds_up_per_axis() {
        let layout = ImageLayout::from_dims(&DDim::from([2, 5, 9, 17])).expect("layout");
        assert_eq!(image_grid(&layout, 8), (3, 2, 4));
        assert_eq!(dispatch_size_dim(0, 8), 0);
        assert_eq!(dispatch_size_dim(1, 8), 1);
    }
}
