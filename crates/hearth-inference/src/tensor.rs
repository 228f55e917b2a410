use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named tensors, ordered by name so serialization is canonical.
pub type TensorMap = BTreeMap<String, Tensor>;

/// Element storage of a tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dtype", content = "values", rename_all = "lowercase")]
pub enum TensorData {
    /// 32-bit floats (activations, logits, sensor features).
    F32(Vec<f32>),
    /// 64-bit integers (token ids, class indices).
    I64(Vec<i64>),
}

impl TensorData {
    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            TensorData::F32(v) => v.len(),
            TensorData::I64(v) => v.len(),
        }
    }

    /// Whether the tensor holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A dense tensor with a row-major shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    /// Dimensions, outermost first.
    pub shape: Vec<usize>,
    /// Flat element buffer.
    pub data: TensorData,
}

impl Tensor {
    /// A one-dimensional float tensor.
    pub fn f32(values: Vec<f32>) -> Self {
        Self {
            shape: vec![values.len()],
            data: TensorData::F32(values),
        }
    }

    /// A one-dimensional integer tensor.
    pub fn i64(values: Vec<i64>) -> Self {
        Self {
            shape: vec![values.len()],
            data: TensorData::I64(values),
        }
    }

    /// Replace the shape, keeping the buffer.
    pub fn with_shape(mut self, shape: Vec<usize>) -> Self {
        self.shape = shape;
        self
    }

    /// Whether `shape` accounts for exactly the number of stored elements.
    pub fn is_consistent(&self) -> bool {
        self.shape.iter().product::<usize>() == self.data.len()
    }

    /// Float values, if this is a float tensor.
    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            TensorData::F32(v) => Some(v),
            TensorData::I64(_) => None,
        }
    }

    /// Integer values, if this is an integer tensor.
    pub fn as_i64(&self) -> Option<&[i64]> {
        match &self.data {
            TensorData::I64(v) => Some(v),
            TensorData::F32(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_consistency() {
        let t = Tensor::f32(vec![1.0, 2.0, 3.0, 4.0]).with_shape(vec![2, 2]);
        assert!(t.is_consistent());
        let bad = Tensor::i64(vec![1, 2, 3]).with_shape(vec![2, 2]);
        assert!(!bad.is_consistent());
    }

    #[test]
    fn test_typed_access() {
        let t = Tensor::i64(vec![7, 8]);
        assert_eq!(t.as_i64(), Some(&[7, 8][..]));
        assert!(t.as_f32().is_none());
    }

    #[test]
    fn test_serialized_form() {
        let t = Tensor::f32(vec![0.5]);
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["data"]["dtype"], "f32");
        assert_eq!(json["shape"][0], 1);
    }
}
