//! Common types shared across the tensorio crates
//!
//! This crate provides the foundational pieces every codec builds on: the
//! closed [`DType`] enumeration, the owned host [`Tensor`], the
//! [`TensorView`] trait describing what a codec needs from an external tensor
//! abstraction, the [`TensorIoError`] taxonomy, and [`CodecConfig`].

pub mod config;
pub mod dtype;
pub mod error;
pub mod tensor;

pub use config::*;
pub use dtype::*;
pub use error::*;
pub use tensor::*;

/// Round `off` up to the next multiple of `align` (a power of two).
#[inline]
pub fn align_up(off: usize, align: usize) -> usize {
    if align == 0 {
        return off;
    }
    debug_assert!(align.is_power_of_two(), "alignment should be power-of-two");
    (off + align - 1) & !(align - 1)
}
