//! Half-precision conversion used by the GPU image kernels.
//!
//! Device images in `Fp16` precision are stored as `rgba16float` textures; the
//! host side keeps tensors in `f32`. These helpers are the only place where the
//! two representations meet, so upload/download and tests share one rounding
//! behaviour:
//!
//! - `f32 -> f16` rounds to nearest (ties to even). Magnitudes past
//!   [`f16::MAX`] saturate to a signed infinity, tiny magnitudes become signed
//!   subnormals or signed zero.
//! - `f16 -> f32` is exact.
//! - NaN, infinities and the sign of zero survive both directions.

use thiserror::Error;

pub use half::f16;

/// 16-bit IEEE-754 binary16 value as stored in `Fp16` device images.
pub type HalfFloat = f16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HalfConvertError {
    #[error("bulk conversion of {count} elements needs {count} source slots, got {len}")]
    SourceTooSmall { count: usize, len: usize },
    #[error("bulk conversion of {count} elements needs {count} destination slots, got {len}")]
    DestinationTooSmall { count: usize, len: usize },
}

#[inline]
pub fn float_to_half(value: f32) -> HalfFloat {
    f16::from_f32(value)
}

#[inline]
pub fn half_to_float(value: HalfFloat) -> f32 {
    value.to_f32()
}

fn check_lengths(count: usize, src_len: usize, dst_len: usize) -> Result<(), HalfConvertError> {
    if src_len < count {
        return Err(HalfConvertError::SourceTooSmall {
            count,
            len: src_len,
        });
    }
    if dst_len < count {
        return Err(HalfConvertError::DestinationTooSmall {
            count,
            len: dst_len,
        });
    }
    Ok(())
}

/// Convert the first `count` floats of `src` into `dst[..count]`, in order.
///
/// Nothing is written when either slice is shorter than `count`. Elements of
/// `dst` past `count` are left untouched.
pub fn float_array_to_half_array(
    src: &[f32],
    dst: &mut [HalfFloat],
    count: usize,
) -> Result<(), HalfConvertError> {
    check_lengths(count, src.len(), dst.len())?;
    for (out, value) in dst[..count].iter_mut().zip(&src[..count]) {
        *out = float_to_half(*value);
    }
    Ok(())
}

/// Widen the first `count` halves of `src` into `dst[..count]`, in order.
pub fn half_array_to_float_array(
    src: &[HalfFloat],
    dst: &mut [f32],
    count: usize,
) -> Result<(), HalfConvertError> {
    check_lengths(count, src.len(), dst.len())?;
    for (out, value) in dst[..count].iter_mut().zip(&src[..count]) {
        *out = half_to_float(*value);
    }
    Ok(())
}

/// Owning variant of [`float_array_to_half_array`] used by image uploads.
pub fn floats_to_halves(src: &[f32]) -> Vec<HalfFloat> {
    src.iter().copied().map(float_to_half).collect()
}

/// Owning variant of [`half_array_to_float_array`] used by image readback.
pub fn halves_to_floats(src: &[HalfFloat]) -> Vec<f32> {
    src.iter().copied().map(half_to_float).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_values_round_trip() {
        for value in [0.0f32, 1.0, -2.5, 0.5, 1024.0, 65504.0, -65504.0] {
            assert_eq!(half_to_float(float_to_half(value)), value);
        }
    }

    #[test]
    fn overflow_saturates_to_signed_infinity() {
        assert_eq!(float_to_half(1.0e6), f16::INFINITY);
        assert_eq!(float_to_half(-1.0e6), f16::NEG_INFINITY);
        // 65520 is the first value that rounds past MAX
        assert_eq!(float_to_half(65519.0), f16::MAX);
        assert_eq!(float_to_half(65520.0), f16::INFINITY);
    }

    #[test]
    fn underflow_keeps_sign() {
        let tiny = float_to_half(-1.0e-10);
        assert_eq!(tiny.to_bits(), 0x8000);
        let subnormal = float_to_half(6.0e-8);
        assert!(subnormal.to_bits() > 0 && subnormal.to_bits() < 0x0400);
    }

    #[test]
    fn rounds_ties_to_even() {
        // 2049 sits halfway between 2048 and 2050 in binary16
        assert_eq!(half_to_float(float_to_half(2049.0)), 2048.0);
        assert_eq!(half_to_float(float_to_half(2051.0)), 2052.0);
    }

    #[test]
    fn bulk_rejects_short_buffers_without_writing() {
        let src = [1.0f32, 2.0];
        let mut dst = [f16::ZERO; 4];
        let err = float_array_to_half_array(&src, &mut dst, 3).unwrap_err();
        assert_eq!(err, HalfConvertError::SourceTooSmall { count: 3, len: 2 });
        assert!(dst.iter().all(|h| h.to_bits() == 0));

        let halves = [f16::ONE; 3];
        let mut floats = [0.0f32; 2];
        let err = half_array_to_float_array(&halves, &mut floats, 3).unwrap_err();
        assert_eq!(
            err,
            HalfConvertError::DestinationTooSmall { count: 3, len: 2 }
        );
        assert_eq!(floats, [0.0, 0.0]);
    }

    #[test]
    fn bulk_leaves_tail_untouched() {
        let src = [1.5f32, -3.0, 7.0];
        let mut dst = [f16::from_f32(9.0); 3];
        float_array_to_half_array(&src, &mut dst, 2).unwrap();
        assert_eq!(halves_to_floats(&dst), vec![1.5, -3.0, 9.0]);
    }

    #[test]
    fn zero_count_is_a_no_op() {
        let mut dst: [f16; 0] = [];
        float_array_to_half_array(&[], &mut dst, 0).unwrap();
    }
}
