//! Host tensor and the view trait every codec consumes
//!
//! Codecs never own compute buffers. They need exactly four things from a
//! tensor: its [`DType`], its host-order shape, a way to force pending work
//! to finish, and a row-major byte view (copying into one if necessary).
//! [`TensorView`] captures that contract; [`Tensor`] is the owned,
//! always-contiguous implementation codecs produce when loading.
//!
//! All byte buffers are little-endian, row-major.

use crate::{DType, Element, Result, TensorIoError};
use std::borrow::Cow;
use tracing::debug;

/// What a codec requires from an external tensor abstraction.
pub trait TensorView {
    fn dtype(&self) -> DType;

    /// Dimension sizes in host order (slowest-varying first).
    fn shape(&self) -> &[usize];

    /// Force any deferred computation to completion.
    fn eval(&self) -> Result<()> {
        Ok(())
    }

    /// Row-major bytes, or `None` if the storage is not contiguous.
    fn contiguous_bytes(&self) -> Option<&[u8]>;

    /// Copy into a contiguous row-major [`Tensor`].
    fn to_contiguous(&self) -> Result<Tensor>;

    fn numel(&self) -> usize {
        self.shape().iter().product()
    }

    fn ndim(&self) -> usize {
        self.shape().len()
    }

    fn nbytes(&self) -> usize {
        self.numel() * self.dtype().size()
    }
}

impl<T: TensorView + ?Sized> TensorView for &T {
    fn dtype(&self) -> DType {
        (**self).dtype()
    }

    fn shape(&self) -> &[usize] {
        (**self).shape()
    }

    fn eval(&self) -> Result<()> {
        (**self).eval()
    }

    fn contiguous_bytes(&self) -> Option<&[u8]> {
        (**self).contiguous_bytes()
    }

    fn to_contiguous(&self) -> Result<Tensor> {
        (**self).to_contiguous()
    }
}

/// Owned, contiguous host tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    dtype: DType,
    shape: Vec<usize>,
    data: Vec<u8>,
}

impl Tensor {
    /// Wrap raw little-endian bytes. The length must match `shape` and `dtype`.
    pub fn from_bytes(dtype: DType, shape: Vec<usize>, data: Vec<u8>) -> Result<Self> {
        let expected = shape.iter().product::<usize>() * dtype.size();
        if data.len() != expected {
            return Err(TensorIoError::format(format!(
                "{dtype} tensor of shape {shape:?} needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self { dtype, shape, data })
    }

    pub fn from_slice<T: Element>(values: &[T], shape: &[usize]) -> Result<Self> {
        Self::from_bytes(T::DTYPE, shape.to_vec(), bytemuck::cast_slice(values).to_vec())
    }

    /// 0-dimensional tensor holding one value.
    pub fn scalar<T: Element>(value: T) -> Self {
        Self { dtype: T::DTYPE, shape: Vec::new(), data: bytemuck::bytes_of(&value).to_vec() }
    }

    pub fn from_bools(values: &[bool], shape: &[usize]) -> Result<Self> {
        let data = values.iter().map(|&b| u8::from(b)).collect();
        Self::from_bytes(DType::Bool, shape.to_vec(), data)
    }

    pub fn zeros(dtype: DType, shape: &[usize]) -> Self {
        let len = shape.iter().product::<usize>() * dtype.size();
        Self { dtype, shape: shape.to_vec(), data: vec![0; len] }
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn nbytes(&self) -> usize {
        self.data.len()
    }

    /// Copy the elements out as `T`. Fails if `T` does not match the dtype.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        if T::DTYPE != self.dtype {
            return Err(TensorIoError::format(format!(
                "cannot read {} tensor as {}",
                self.dtype,
                T::DTYPE
            )));
        }
        Ok(bytemuck::pod_collect_to_vec(&self.data))
    }

    pub fn to_bools(&self) -> Result<Vec<bool>> {
        if self.dtype != DType::Bool {
            return Err(TensorIoError::format(format!("cannot read {} tensor as bool", self.dtype)));
        }
        Ok(self.data.iter().map(|&b| b != 0).collect())
    }

    /// Same bytes, new shape. The element count must not change.
    pub fn reshape(self, shape: &[usize]) -> Result<Self> {
        Self::from_bytes(self.dtype, shape.to_vec(), self.data)
    }
}

impl TensorView for Tensor {
    fn dtype(&self) -> DType {
        self.dtype
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn contiguous_bytes(&self) -> Option<&[u8]> {
        Some(&self.data)
    }

    fn to_contiguous(&self) -> Result<Tensor> {
        Ok(self.clone())
    }
}

/// Evaluate `tensor` and return its row-major bytes, copying into a
/// contiguous layout when the view is strided.
///
/// `name` only feeds error messages.
pub fn contiguous_data<'a, T: TensorView + ?Sized>(
    name: &str,
    tensor: &'a T,
) -> Result<Cow<'a, [u8]>> {
    tensor.eval()?;
    let expected = tensor.nbytes();

    if let Some(bytes) = tensor.contiguous_bytes() {
        if bytes.len() != expected {
            return Err(TensorIoError::contiguity(
                name,
                format!("contiguous view has {} bytes, expected {expected}", bytes.len()),
            ));
        }
        return Ok(Cow::Borrowed(bytes));
    }

    debug!(tensor = name, "copying non-contiguous tensor into row-major layout");
    let repaired = tensor.to_contiguous().map_err(|e| {
        TensorIoError::contiguity(name, format!("cannot copy into row-major layout: {e}"))
    })?;
    if repaired.shape() != tensor.shape() || repaired.dtype() != tensor.dtype() {
        return Err(TensorIoError::contiguity(
            name,
            format!(
                "contiguous copy changed layout from {} {:?} to {} {:?}",
                tensor.dtype(),
                tensor.shape(),
                repaired.dtype(),
                repaired.shape()
            ),
        ));
    }
    Ok(Cow::Owned(repaired.into_data()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use half::f16;

    #[test]
    fn from_slice_round_trips_values() {
        let t = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], &[3, 2]).unwrap();
        assert_eq!(t.dtype(), DType::F32);
        assert_eq!(t.shape(), &[3, 2]);
        assert_eq!(t.nbytes(), 24);
        assert_eq!(t.to_vec::<f32>().unwrap(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn from_bytes_rejects_length_mismatch() {
        let err = Tensor::from_bytes(DType::I32, vec![2], vec![0; 7]).unwrap_err();
        assert!(matches!(err, TensorIoError::Format(_)));
    }

    #[test]
    fn scalar_is_zero_dimensional() {
        let t = Tensor::scalar(f16::from_f32(0.5));
        assert_eq!(t.ndim(), 0);
        assert_eq!(t.numel(), 1);
        assert_eq!(t.to_vec::<f16>().unwrap(), vec![f16::from_f32(0.5)]);
    }

    #[test]
    fn to_vec_checks_dtype() {
        let t = Tensor::from_slice(&[1i32, 2], &[2]).unwrap();
        assert!(t.to_vec::<f32>().is_err());
        assert!(t.to_bools().is_err());
    }

    #[test]
    fn bools_are_single_bytes() {
        let t = Tensor::from_bools(&[true, false, true], &[3]).unwrap();
        assert_eq!(t.data(), &[1, 0, 1]);
        assert_eq!(t.to_bools().unwrap(), vec![true, false, true]);
    }

    #[test]
    fn reshape_keeps_bytes() {
        let t = Tensor::from_slice(&[1u8, 2, 3, 4, 5, 6], &[6]).unwrap();
        let r = t.clone().reshape(&[2, 3]).unwrap();
        assert_eq!(r.data(), t.data());
        assert!(t.reshape(&[4]).is_err());
    }

    #[test]
    fn contiguous_data_borrows_owned_tensors() {
        let t = Tensor::zeros(DType::F16, &[4]);
        let bytes = contiguous_data("t", &t).unwrap();
        assert!(matches!(bytes, Cow::Borrowed(_)));
        assert_eq!(bytes.len(), 8);
    }
}
