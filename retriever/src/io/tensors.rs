use bytemuck::{cast_slice, pod_collect_to_vec};
use half::f16;
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors, serialize};

use super::PayloadError;
use crate::config::QuantizationMode;
use crate::quantization::{dequantize_i8, quantize_i8};

const EMBEDDINGS_TENSOR: &str = "embeddings";
const SCALES_TENSOR: &str = "scales";

/// Encodes a row-major `rows x dims` matrix at the precision of `mode`.
pub fn encode_matrix(
    data: &[f32],
    rows: usize,
    dims: usize,
    mode: QuantizationMode,
) -> Result<Vec<u8>, PayloadError> {
    let expected = rows
        .checked_mul(dims)
        .ok_or(PayloadError::InvalidShape {
            expected: rows,
            found: dims,
        })?;
    if expected != data.len() {
        return Err(PayloadError::InvalidShape {
            expected,
            found: data.len(),
        });
    }
    let shape = vec![rows, dims];
    let bytes = match mode {
        QuantizationMode::Float32 => {
            let tensor = TensorView::new(Dtype::F32, shape, cast_slice(data))?;
            serialize(std::iter::once((EMBEDDINGS_TENSOR.to_string(), tensor)), &None)?
        }
        QuantizationMode::Float16 => {
            let halves: Vec<f16> = data.iter().map(|v| f16::from_f32(*v)).collect();
            let tensor = TensorView::new(Dtype::F16, shape, cast_slice(&halves))?;
            serialize(std::iter::once((EMBEDDINGS_TENSOR.to_string(), tensor)), &None)?
        }
        QuantizationMode::Int8 => {
            let mut codes = Vec::with_capacity(data.len());
            let mut scales = Vec::with_capacity(rows);
            if dims > 0 {
                for row in data.chunks(dims) {
                    let (row_codes, scale) = quantize_i8(row);
                    codes.extend(row_codes);
                    scales.push(scale);
                }
            }
            let tensor = TensorView::new(Dtype::I8, shape, cast_slice(&codes))?;
            let scales_tensor = TensorView::new(Dtype::F32, vec![rows], cast_slice(&scales))?;
            serialize(
                [
                    (EMBEDDINGS_TENSOR.to_string(), tensor),
                    (SCALES_TENSOR.to_string(), scales_tensor),
                ],
                &None,
            )?
        }
    };
    Ok(bytes)
}

/// Decodes a matrix written by [`encode_matrix`], returning `(data, rows, dims)`.
pub fn decode_matrix(
    bytes: &[u8],
    mode: QuantizationMode,
) -> Result<(Vec<f32>, usize, usize), PayloadError> {
    let tensors = SafeTensors::deserialize(bytes)?;
    let tensor = tensors.tensor(EMBEDDINGS_TENSOR)?;
    if tensor.dtype() != mode.dtype() {
        return Err(PayloadError::UnsupportedDType {
            expected: mode.dtype(),
            found: tensor.dtype(),
        });
    }
    let shape = tensor.shape();
    if shape.len() != 2 {
        return Err(PayloadError::InvalidShape {
            expected: 2,
            found: shape.len(),
        });
    }
    let rows = shape[0];
    let dims = shape[1];
    let data = match mode {
        QuantizationMode::Float32 => pod_collect_to_vec::<u8, f32>(tensor.data()),
        QuantizationMode::Float16 => pod_collect_to_vec::<u8, f16>(tensor.data())
            .into_iter()
            .map(f16::to_f32)
            .collect(),
        QuantizationMode::Int8 => {
            let codes = pod_collect_to_vec::<u8, i8>(tensor.data());
            let scales_view = tensors.tensor(SCALES_TENSOR)?;
            if scales_view.dtype() != Dtype::F32 {
                return Err(PayloadError::UnsupportedDType {
                    expected: Dtype::F32,
                    found: scales_view.dtype(),
                });
            }
            let scales = pod_collect_to_vec::<u8, f32>(scales_view.data());
            if scales.len() != rows {
                return Err(PayloadError::InvalidShape {
                    expected: rows,
                    found: scales.len(),
                });
            }
            let mut data = Vec::with_capacity(codes.len());
            if dims > 0 {
                for (row, scale) in codes.chunks(dims).zip(scales) {
                    data.extend(dequantize_i8(row, scale));
                }
            }
            data
        }
    };
    Ok((data, rows, dims))
}
