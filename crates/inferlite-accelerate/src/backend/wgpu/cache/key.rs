use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Cache key for a compiled program: WGSL text, bind group layout tag and
/// workgroup tile.
pub fn compute_pipeline_hash_bytes(shader_bytes: &[u8], layout_tag: &str, tile: u32) -> u64 {
    let mut hasher = DefaultHasher::new();
    shader_bytes.hash(&mut hasher);
    layout_tag.hash(&mut hasher);
    tile.hash(&mut hasher);
    hasher.finish()
}
