use inferlite_kernel_api::{DDim, PrecisionType};

const MIN_TEXTURE_LAYERS: usize = 2;

/// Mapping from a logical tensor shape to a 2-D texture array.
///
/// Dims are left-padded to `[N, C, H, W]`. Width is `W`, height is `H` and
/// there are `N * ceil(C / 4)` layers; channel `c` of batch `n` lives in
/// layer `n * slices + c / 4`, component `c % 4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageLayout {
    pub nchw: [usize; 4],
    /// Four-channel slices per batch item.
    pub slices: usize,
    pub width: usize,
    pub height: usize,
    pub layers: usize,
}

impl ImageLayout {
    /// `None` for rank > 4 or when the texel storage size overflows.
    pub fn from_dims(dims: &DDim) -> Option<Self> {
        let rank = dims.rank();
        if rank > 4 {
            return None;
        }
        let mut nchw = [1usize; 4];
        nchw[4 - rank..].copy_from_slice(dims.dims());
        let [n, c, h, w] = nchw;
        let slices = c.div_ceil(4);
        let layers = n.checked_mul(slices)?;
        // rgba host buffers hold four values per texel
        w.checked_mul(h)?.checked_mul(layers)?.checked_mul(4)?;
        dims.production()?;
        Some(Self {
            nchw,
            slices,
            width: w,
            height: h,
            layers,
        })
    }

    pub fn texel_count(&self) -> usize {
        self.width * self.height * self.layers
    }

    pub fn element_count(&self) -> usize {
        self.nchw.iter().product()
    }

    /// Copy extent covering the logical layers.
    pub fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width as u32,
            height: self.height as u32,
            depth_or_array_layers: self.layers as u32,
        }
    }

    /// Size of the backing texture. GL infers the view dimension of a
    /// single-layer texture as `D2`, so every image gets at least two layers
    /// to keep its `D2Array` view valid.
    pub fn texture_extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            depth_or_array_layers: self.layers.max(MIN_TEXTURE_LAYERS) as u32,
            ..self.extent()
        }
    }

    /// Index into an rgba host buffer of `texel_count() * 4` values.
    pub fn slot(&self, n: usize, c: usize, h: usize, w: usize) -> usize {
        let layer = n * self.slices + c / 4;
        ((layer * self.height + h) * self.width + w) * 4 + c % 4
    }

    /// Row-major tensor values -> rgba texel values, unused channels zero.
    pub fn pack(&self, values: &[f32]) -> Vec<f32> {
        let mut texels = vec![0.0f32; self.texel_count() * 4];
        let [n, c, h, w] = self.nchw;
        let mut src = values.iter();
        for ni in 0..n {
            for ci in 0..c {
                for hi in 0..h {
                    for wi in 0..w {
                        if let Some(v) = src.next() {
                            texels[self.slot(ni, ci, hi, wi)] = *v;
                        }
                    }
                }
            }
        }
        texels
    }

    /// Inverse of [`ImageLayout::pack`].
    pub fn unpack(&self, texels: &[f32]) -> Vec<f32> {
        let [n, c, h, w] = self.nchw;
        let mut out = Vec::with_capacity(self.element_count());
        for ni in 0..n {
            for ci in 0..c {
                for hi in 0..h {
                    for wi in 0..w {
                        out.push(
                            texels
                                .get(self.slot(ni, ci, hi, wi))
                                .copied()
                                .unwrap_or_default(),
                        );
                    }
                }
            }
        }
        out
    }
}

/// GPU-resident tensor stored as a 2-D texture array.
///
/// Owned by the tensor layer; kernels only borrow it.
#[derive(Debug)]
pub struct DeviceImage {
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    pub(crate) dims: DDim,
    pub(crate) layout: ImageLayout,
    pub(crate) precision: PrecisionType,
    pub(crate) label: String,
}

impl DeviceImage {
    pub fn dims(&self) -> &DDim {
        &self.dims
    }

    pub fn layout(&self) -> &ImageLayout {
        &self.layout
    }

    pub fn precision(&self) -> PrecisionType {
        self.precision
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Identity of the underlying texture, used for alias checks.
    pub fn same_texture(&self, other: &DeviceImage) -> bool {
        std::ptr::eq(self, other) || self.texture.global_id() == other.texture.global_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_is_single_layer() {
        let layout = ImageLayout::from_dims(&DDim::from([3, 4])).expect("layout");
        assert_eq!(layout.nchw, [1, 1, 3, 4]);
        assert_eq!((layout.width, layout.height, layout.layers), (4, 3, 1));
        assert_eq!(layout.extent().depth_or_array_layers, 1);
        assert_eq!(layout.texture_extent().depth_or_array_layers, 2);
        assert_eq!(layout.slot(0, 0, 2, 1), ((2 * 4) + 1) * 4);
    }

    #[test]
    fn channels_pack_into_slices() {
        let layout = ImageLayout::from_dims(&DDim::from([2, 6, 1, 1])).expect("layout");
        assert_eq!(layout.slices, 2);
        assert_eq!(layout.layers, 4);
        assert_eq!(layout.texture_extent(), layout.extent());
        // channel 5 of batch 1 -> layer 3, component 1
        assert_eq!(layout.slot(1, 5, 0, 0), 3 * 4 + 1);
    }

    #[test]
    fn pack_then_unpack_restores_row_major_order() {
        let layout = ImageLayout::from_dims(&DDim::from([1, 5, 2, 3])).expect("layout");
        let values: Vec<f32> = (0..30).map(|v| v as f32).collect();
        let texels = layout.pack(&values);
        assert_eq!(texels.len(), layout.texel_count() * 4);
        // channels 5..8 of the second slice stay zero
        assert_eq!(texels[layout.slot(0, 4, 0, 0) + 1], 0.0);
        assert_eq!(layout.unpack(&texels), values);
    }

    #[test]
    fn oversized_dims_have_no_layout() {
        assert!(ImageLayout::from_dims(&DDim::from([usize::MAX, 8, 1, 1])).is_none());
        assert!(ImageLayout::from_dims(&DDim::from([1, 1, usize::MAX, 2])).is_none());
        assert!(ImageLayout::from_dims(&DDim::from([usize::MAX / 2, 1, 1, 1])).is_none());
    }

    #[test]
    fn rank_above_four_is_rejected() {
        assert!(ImageLayout::from_dims(&DDim::from([1, 1, 1, 1, 1])).is_none());
        let scalar = ImageLayout::from_dims(&DDim::default()).expect("rank 0");
        assert_eq!(scalar.texel_count(), 1);
    }
}
