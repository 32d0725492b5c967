//! Weight blob encoding
//!
//! A single network is written as
//!
//! ```text
//! [u32 LE metadata length][metadata JSON][payload]
//! ```
//!
//! where the metadata is a JSON array of `{"name", "shape", "dtype"}` entries
//! and the payload is every tensor's `f32` values, little-endian, concatenated
//! in metadata order. Several blobs can be packed into one container with
//! [`encode_segments`], which writes all `u32` length prefixes first and then
//! the segment bytes.
//!
//! Decoding checks every declared length against the bytes actually present
//! and fails with [`RlError::CorruptWeights`] instead of reading past the end.

use super::error::{Result, RlError};
use burn::tensor::{Tensor, backend::Backend};
use serde::{Deserialize, Serialize};

const DTYPE_F32: &str = "float32";
const LEN_PREFIX: usize = 4;

/// A parameter tensor copied to host memory under its stable name
#[derive(Debug, Clone, PartialEq)]
pub struct NamedTensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

impl NamedTensor {
    pub fn new(name: impl Into<String>, shape: Vec<usize>, values: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            shape,
            values,
        }
    }

    /// Copy a tensor back to the host
    pub fn from_tensor<B: Backend, const D: usize>(
        name: impl Into<String>,
        tensor: Tensor<B, D>,
    ) -> Result<Self> {
        let shape = tensor.dims().to_vec();
        Ok(Self::new(name, shape, to_host(tensor)?))
    }

    /// Element count implied by the shape, `None` if it overflows `usize`
    pub fn numel(&self) -> Option<usize> {
        checked_numel(&self.shape)
    }
}

/// Product of `shape` without wrapping
pub(crate) fn checked_numel(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
}

/// Read a tensor's values back as a flat `f32` vector
pub fn to_host<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| RlError::Tensor(format!("{e:?}")))
}

#[derive(Debug, Serialize, Deserialize)]
struct WeightSpec {
    name: String,
    shape: Vec<usize>,
    dtype: String,
}

/// Encode named parameters into a self-describing blob
pub fn encode(params: &[NamedTensor]) -> Result<Vec<u8>> {
    let specs: Vec<WeightSpec> = params
        .iter()
        .map(|p| WeightSpec {
            name: p.name.clone(),
            shape: p.shape.clone(),
            dtype: DTYPE_F32.to_string(),
        })
        .collect();
    let metadata =
        serde_json::to_vec(&specs).map_err(|e| RlError::CorruptWeights(e.to_string()))?;
    let metadata_len = u32::try_from(metadata.len())
        .map_err(|_| RlError::CorruptWeights("metadata exceeds u32 length".to_string()))?;

    let payload_len: usize = params.iter().map(|p| p.values.len() * 4).sum();
    let mut bytes = Vec::with_capacity(LEN_PREFIX + metadata.len() + payload_len);
    bytes.extend_from_slice(&metadata_len.to_le_bytes());
    bytes.extend_from_slice(&metadata);
    for param in params {
        for value in &param.values {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
    }
    Ok(bytes)
}

/// Decode a blob produced by [`encode`]
pub fn decode(bytes: &[u8]) -> Result<Vec<NamedTensor>> {
    let metadata_len = read_u32(bytes, 0)? as usize;
    let metadata_end = LEN_PREFIX
        .checked_add(metadata_len)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| {
            RlError::CorruptWeights(format!(
                "metadata length {metadata_len} exceeds blob of {} bytes",
                bytes.len()
            ))
        })?;

    let specs: Vec<WeightSpec> = serde_json::from_slice(&bytes[LEN_PREFIX..metadata_end])
        .map_err(|e| RlError::CorruptWeights(format!("metadata: {e}")))?;

    let mut offset = metadata_end;
    let mut params = Vec::with_capacity(specs.len());
    for spec in specs {
        if spec.dtype != DTYPE_F32 {
            return Err(RlError::CorruptWeights(format!(
                "{} has unsupported dtype {}",
                spec.name, spec.dtype
            )));
        }
        let numel = checked_numel(&spec.shape).ok_or_else(|| {
            RlError::CorruptWeights(format!("shape of {} overflows", spec.name))
        })?;
        let end = numel
            .checked_mul(4)
            .and_then(|n| offset.checked_add(n))
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| {
                RlError::CorruptWeights(format!("payload truncated at {}", spec.name))
            })?;

        let values = bytes[offset..end]
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        params.push(NamedTensor::new(spec.name, spec.shape, values));
        offset = end;
    }

    if offset != bytes.len() {
        return Err(RlError::CorruptWeights(format!(
            "{} trailing bytes after payload",
            bytes.len() - offset
        )));
    }
    Ok(params)
}

/// Pack blobs as `[u32 len_0]..[u32 len_n][bytes_0]..[bytes_n]`
pub fn encode_segments(segments: &[&[u8]]) -> Result<Vec<u8>> {
    let total: usize = segments.iter().map(|s| s.len()).sum();
    let mut bytes = Vec::with_capacity(LEN_PREFIX * segments.len() + total);
    for segment in segments {
        let len = u32::try_from(segment.len())
            .map_err(|_| RlError::CorruptWeights("segment exceeds u32 length".to_string()))?;
        bytes.extend_from_slice(&len.to_le_bytes());
    }
    for segment in segments {
        bytes.extend_from_slice(segment);
    }
    Ok(bytes)
}

/// Split a container written by [`encode_segments`] into `count` segments
pub fn decode_segments(bytes: &[u8], count: usize) -> Result<Vec<&[u8]>> {
    let mut lengths = Vec::with_capacity(count);
    for i in 0..count {
        lengths.push(read_u32(bytes, i * LEN_PREFIX)? as usize);
    }

    let mut offset = LEN_PREFIX * count;
    let mut segments = Vec::with_capacity(count);
    for (i, len) in lengths.into_iter().enumerate() {
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| {
                RlError::CorruptWeights(format!(
                    "segment {i} declares {len} bytes but only {} remain",
                    bytes.len().saturating_sub(offset)
                ))
            })?;
        segments.push(&bytes[offset..end]);
        offset = end;
    }

    if offset != bytes.len() {
        return Err(RlError::CorruptWeights(format!(
            "{} trailing bytes after segment {}",
            bytes.len() - offset,
            count.saturating_sub(1)
        )));
    }
    Ok(segments)
}

fn read_u32(bytes: &[u8], at: usize) -> Result<u32> {
    bytes
        .get(at..at + LEN_PREFIX)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| RlError::CorruptWeights(format!("length prefix at byte {at} is truncated")))
}
