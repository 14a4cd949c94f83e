/// Copies elements between two image layouts in row-major order: output
/// element `i` takes input element `i`. One invocation per output texel.
pub const RESHAPE_SHADER: &str = r#"
struct Params {
    in_dims: vec4<u32>,
    out_dims: vec4<u32>,
    in_slices: u32,
    out_slices: u32,
    _pad0: u32,
    _pad1: u32,
};

@group(0) @binding(0) var Src: texture_2d_array<f32>;
@group(0) @binding(1) var Dst: texture_storage_2d_array<@FMT@, write>;
@group(0) @binding(2) var<uniform> params: Params;

fn pick(v: vec4<f32>, lane: u32) -> f32 {
    if (lane == 0u) {
        return v.x;
    }
    if (lane == 1u) {
        return v.y;
    }
    if (lane == 2u) {
        return v.z;
    }
    return v.w;
}

fn load_linear(idx: u32) -> f32 {
    let c_dim = params.in_dims.y;
    let h_dim = params.in_dims.z;
    let w_dim = params.in_dims.w;
    let w = idx % w_dim;
    let h = (idx / w_dim) % h_dim;
    let c = (idx / (w_dim * h_dim)) % c_dim;
    let n = idx / (w_dim * h_dim * c_dim);
    let layer = n * params.in_slices + c / 4u;
    let texel = textureLoad(Src, vec2<i32>(i32(w), i32(h)), i32(layer), 0);
    return pick(texel, c % 4u);
}

@compute @workgroup_size(@WG@, @WG@, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let c_dim = params.out_dims.y;
    let h_dim = params.out_dims.z;
    let w_dim = params.out_dims.w;
    let layers = params.out_dims.x * params.out_slices;
    if (gid.x >= w_dim || gid.y >= h_dim || gid.z >= layers) {
        return;
    }
    let n = gid.z / params.out_slices;
    let c_base = (gid.z % params.out_slices) * 4u;
    var texel = vec4<f32>(0.0, 0.0, 0.0, 0.0);
    for (var lane: u32 = 0u; lane < 4u; lane = lane + 1u) {
        let c = c_base + lane;
        if (c < c_dim) {
            let idx = ((n * c_dim + c) * h_dim + gid.y) * w_dim + gid.x;
            let v = load_linear(idx);
            if (lane == 0u) {
                texel.x = v;
            } else if (lane == 1u) {
                texel.y = v;
            } else if (lane == 2u) {
                texel.z = v;
            } else {
                texel.w = v;
            }
        }
    }
    textureStore(Dst, vec2<i32>(i32(gid.x), i32(gid.y)), i32(gid.z), texel);
}
"#;
