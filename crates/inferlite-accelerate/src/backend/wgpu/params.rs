use bytemuck::{Pod, Zeroable};

use super::image::ImageLayout;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct MulParams {
    pub m: u32,
    pub k: u32,
    pub n: u32,
    pub _pad: u32,
}

impl MulParams {
    pub fn new(m: usize, k: usize, n: usize) -> Self {
        Self {
            m: m as u32,
            k: k as u32,
            n: n as u32,
            _pad: 0,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct ReshapeParams {
    pub in_dims: [u32; 4],
    pub out_dims: [u32; 4],
    pub in_slices: u32,
    pub out_slices: u32,
    pub _pad: [u32; 2],
}

impl ReshapeParams {
    pub fn new(src: &ImageLayout, dst: &ImageLayout) -> Self {
        Self {
            in_dims: src.nchw.map(|d| d as u32),
            out_dims: dst.nchw.map(|d| d as u32),
            in_slices: src.slices as u32,
            out_slices: dst.slices as u32,
            _pad: [0; 2],
        }
    }
}
