/// Matrix product over canonical matrix images: `X[m, k]` is `k` wide and `m`
/// tall, `Y[k, n]` is `n` wide and `k` tall, the output `[m, n]` is `n` wide and
/// `m` tall. Values live in channel 0 of layer 0.
pub const MUL_SHADER: &str = r#"
struct Params {
    m: u32,
    k: u32,
    n: u32,
    _pad: u32,
};

@group(0) @binding(0) var X: texture_2d_array<f32>;
@group(0) @binding(1) var Y: texture_2d_array<f32>;
@group(0) @binding(2) var Out: texture_storage_2d_array<@FMT@, write>;
@group(0) @binding(3) var<uniform> params: Params;

@compute @workgroup_size(@WG@, @WG@, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let col = gid.x;
    let row = gid.y;
    if (row >= params.m || col >= params.n) {
        return;
    }
    var acc: f32 = 0.0;
    for (var p: u32 = 0u; p < params.k; p = p + 1u) {
        let a = textureLoad(X, vec2<i32>(i32(p), i32(row)), 0, 0).x;
        let b = textureLoad(Y, vec2<i32>(i32(col), i32(p)), 0, 0).x;
        acc = acc + a * b;
    }
    textureStore(Out, vec2<i32>(i32(col), i32(row)), 0, vec4<f32>(acc, 0.0, 0.0, 0.0));
}
"#;
