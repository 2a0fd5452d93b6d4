//! # Precision-Polymorphic Numeric Transforms
//!
//! The source dispatches elementwise field transforms through a C++
//! template instantiated per precision; that becomes, here, a runtime
//! branch on `Precision` that picks a monomorphic body per call (Design
//! Notes §9). Every transform upconverts each element to `f64` to apply the
//! closure and narrows back to the field's native precision on write —
//! `output_size_bytes == input_size_bytes` (the precision-preservation
//! property) holds regardless, since the narrowing is applied per element
//! before writing the same number of bytes back.

use crate::error::{MultioError, Result};
use crate::metadata::Precision;

fn read_elem(precision: Precision, bytes: &[u8]) -> f64 {
    match precision {
        Precision::Single => f32::from_ne_bytes(bytes.try_into().unwrap()) as f64,
        Precision::Double => f64::from_ne_bytes(bytes.try_into().unwrap()),
    }
}

fn write_elem(precision: Precision, bytes: &mut [u8], value: f64) {
    match precision {
        Precision::Single => bytes.copy_from_slice(&(value as f32).to_ne_bytes()),
        Precision::Double => bytes.copy_from_slice(&value.to_ne_bytes()),
    }
}

/// Apply `f` to every element of `bytes`, interpreted at `precision`.
///
/// If `missing` is `Some(missing_value)`, any element exactly equal to it is
/// left unchanged instead of passed through `f` (§4.4 missing-value
/// masking: "a sentinel compare against `missingValue` preserves
/// missingness through the transform").
pub fn transform_unary(
    precision: Precision,
    bytes: &mut [u8],
    missing: Option<f64>,
    mut f: impl FnMut(f64) -> f64,
) -> Result<()> {
    let elem = precision.size_of();
    if bytes.len() % elem != 0 || bytes.is_empty() {
        return Err(MultioError::FieldError(format!(
            "payload is empty or not a multiple of element size {elem}"
        )));
    }
    for chunk in bytes.chunks_exact_mut(elem) {
        let value = read_elem(precision, chunk);
        let out = match missing {
            Some(m) if value == m => value,
            _ => f(value),
        };
        write_elem(precision, chunk, out);
    }
    Ok(())
}

/// Combine two equal-length, equal-precision buffers elementwise via `f`,
/// writing the result into `u_bytes` in place. Used by Windspeed, where the
/// combining function needs to know per-element whether either input was
/// missing so it can emit the action's configured output missing value
/// instead of computing `hypot`.
pub fn transform_binary(
    precision: Precision,
    u_bytes: &mut [u8],
    v_bytes: &[u8],
    u_missing: Option<f64>,
    v_missing: Option<f64>,
    mut f: impl FnMut(f64, f64) -> f64,
    missing_out: f64,
) -> Result<()> {
    let elem = precision.size_of();
    if u_bytes.len() != v_bytes.len() || u_bytes.len() % elem != 0 || u_bytes.is_empty() {
        return Err(MultioError::FieldError(
            "payloads are empty or of different sizes".into(),
        ));
    }
    for (u_chunk, v_chunk) in u_bytes.chunks_exact_mut(elem).zip(v_bytes.chunks_exact(elem)) {
        let u_value = read_elem(precision, u_chunk);
        let v_value = read_elem(precision, v_chunk);
        let is_missing = u_missing.map(|m| u_value == m).unwrap_or(false)
            || v_missing.map(|m| v_value == m).unwrap_or(false);
        let out = if is_missing { missing_out } else { f(u_value, v_value) };
        write_elem(precision, u_chunk, out);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unary_respects_missing_value() {
        let mut bytes = Vec::new();
        for v in [270.0f32, 9999.0, 280.0] {
            bytes.extend_from_slice(&v.to_ne_bytes());
        }
        transform_unary(Precision::Single, &mut bytes, Some(9999.0), |v| v - 273.15).unwrap();
        let values: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(values, vec![-3.15, 9999.0, 6.85]);
    }

    #[test]
    fn binary_is_commutative() {
        let mut u = Vec::new();
        let mut v = Vec::new();
        for val in [3.0f32, 0.0] {
            u.extend_from_slice(&val.to_ne_bytes());
        }
        for val in [4.0f32, 5.0] {
            v.extend_from_slice(&val.to_ne_bytes());
        }
        let mut u2 = v.clone();
        let v2 = u.clone();

        transform_binary(Precision::Single, &mut u, &v, None, None, |a, b| a.hypot(b), -1.0)
            .unwrap();
        transform_binary(Precision::Single, &mut u2, &v2, None, None, |a, b| a.hypot(b), -1.0)
            .unwrap();
        assert_eq!(u, u2);
    }
}
