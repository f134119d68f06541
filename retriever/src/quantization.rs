//! Scalar quantization of embedding vectors.

use half::f16;
use safetensors::Dtype;

use crate::config::QuantizationMode;

impl QuantizationMode {
    /// Tensor dtype used to persist vectors in this mode.
    pub fn dtype(self) -> Dtype {
        match self {
            QuantizationMode::Float32 => Dtype::F32,
            QuantizationMode::Float16 => Dtype::F16,
            QuantizationMode::Int8 => Dtype::I8,
        }
    }

    /// Returns `values` as they read back after storage at this precision.
    pub fn apply(self, values: &[f32]) -> Vec<f32> {
        match self {
            QuantizationMode::Float32 => values.to_vec(),
            QuantizationMode::Float16 => values
                .iter()
                .map(|v| f16::from_f32(*v).to_f32())
                .collect(),
            QuantizationMode::Int8 => {
                let (codes, scale) = quantize_i8(values);
                dequantize_i8(&codes, scale)
            }
        }
    }
}

/// Symmetric per-vector 8-bit quantization. Returns the codes and the scale.
pub(crate) fn quantize_i8(values: &[f32]) -> (Vec<i8>, f32) {
    let max = values.iter().fold(0.0f32, |acc, v| acc.max(v.abs()));
    if max <= f32::EPSILON {
        return (vec![0; values.len()], 0.0);
    }
    let scale = max / i8::MAX as f32;
    let codes = values
        .iter()
        .map(|v| (v / scale).round().clamp(-(i8::MAX as f32), i8::MAX as f32) as i8)
        .collect();
    (codes, scale)
}

pub(crate) fn dequantize_i8(codes: &[i8], scale: f32) -> Vec<f32> {
    codes.iter().map(|code| *code as f32 * scale).collect()
}
