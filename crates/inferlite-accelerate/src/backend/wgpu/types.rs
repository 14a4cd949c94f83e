use inferlite_half::{f16, floats_to_halves, halves_to_floats};
use inferlite_kernel_api::PrecisionType;

/// Compile-time precision capability of an image kernel.
///
/// Everything that differs between the float and half variants lives here;
/// kernel bodies are written once against this trait.
pub trait ImagePrecision: Send + Sync + 'static {
    const PRECISION: PrecisionType;
    const TEXTURE_FORMAT: wgpu::TextureFormat;
    /// Storage texel format spelled as in WGSL.
    const WGSL_FORMAT: &'static str;
    /// Appended to the base program name (`mul` -> `mul_half`).
    const PROGRAM_SUFFIX: &'static str;
    /// Bytes per rgba texel.
    const TEXEL_BYTES: u32;

    /// Encode rgba-ordered host values into texture bytes.
    fn encode_texels(values: &[f32]) -> Vec<u8>;

    /// Decode tightly packed texture bytes back into rgba-ordered values.
    fn decode_texels(bytes: &[u8]) -> Vec<f32>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Float;

#[derive(Debug, Clone, Copy, Default)]
pub struct Half;

impl ImagePrecision for Float {
    const PRECISION: PrecisionType = PrecisionType::Float;
    const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
    const WGSL_FORMAT: &'static str = "rgba32float";
    const PROGRAM_SUFFIX: &'static str = "";
    const TEXEL_BYTES: u32 = 16;

    fn encode_texels(values: &[f32]) -> Vec<u8> {
        bytemuck::cast_slice(values).to_vec()
    }

    fn decode_texels(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }
}

impl ImagePrecision for Half {
    const PRECISION: PrecisionType = PrecisionType::Fp16;
    const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
    const WGSL_FORMAT: &'static str = "rgba16float";
    const PROGRAM_SUFFIX: &'static str = "_half";
    const TEXEL_BYTES: u32 = 8;

    fn encode_texels(values: &[f32]) -> Vec<u8> {
        let halves = floats_to_halves(values);
        bytemuck::cast_slice(&halves).to_vec()
    }

    fn decode_texels(bytes: &[u8]) -> Vec<f32> {
        let halves: Vec<f16> = bytes
            .chunks_exact(2)
            .map(|c| f16::from_bits(u16::from_le_bytes([c[0], c[1]])))
            .collect();
        halves_to_floats(&halves)
    }
}

/// Runtime counterpart of [`ImagePrecision::TEXEL_BYTES`].
pub fn texel_bytes(precision: PrecisionType) -> u32 {
    match precision {
        PrecisionType::Float => Float::TEXEL_BYTES,
        PrecisionType::Fp16 => Half::TEXEL_BYTES,
    }
}

/// Runtime counterpart of [`ImagePrecision::decode_texels`].
pub fn decode_texels(precision: PrecisionType, bytes: &[u8]) -> Vec<f32> {
    match precision {
        PrecisionType::Float => Float::decode_texels(bytes),
        PrecisionType::Fp16 => Half::decode_texels(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_texels_round_trip_bit_exact() {
        let values = [1.0f32, -0.0, f32::INFINITY, 3.25];
        let bytes = Float::encode_texels(&values);
        assert_eq!(bytes.len(), 16);
        let back = Float::decode_texels(&bytes);
        assert_eq!(back[1].to_bits(), (-0.0f32).to_bits());
        assert_eq!(back, values.to_vec());
    }

    #[test]
    fn half_texels_use_two_bytes_per_channel() {
        let values = [1.0f32, 0.5, -2.0, 65504.0];
        let bytes = Half::encode_texels(&values);
        assert_eq!(bytes.len(), Half::TEXEL_BYTES as usize);
        assert_eq!(decode_texels(PrecisionType::Fp16, &bytes), values.to_vec());
    }
}
