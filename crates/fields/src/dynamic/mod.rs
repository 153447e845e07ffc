//! Type-erased values and arrays.
//!
//! Multi-functions, procedures and the field graph all move data around
//! without knowing its concrete type. The containers in this module pair the
//! data with a `&'static dyn ValueType` descriptor. Every concrete type `T`
//! that implements [`FieldValue`] gets one static descriptor, created from a
//! generic implementation.
//!
//! The typed counterparts ([`VArray`], [`MutableSpan`], [`VectorArray`]) are
//! what the bodies of multi-functions work with. Conversion from an erased
//! container to a typed one checks the type id and panics on mismatch, since
//! a mismatch always indicates a bug in the code that wired the call up.

mod buffer;
mod mutable_array;
mod span;
mod value;
mod value_type;
mod varray;
mod vector_array;

use std::any::Any;

pub use buffer::GBuffer;
pub use mutable_array::{GVMutableArray, VMutableArray};
pub use span::{GMutableSpan, MutableSpan};
pub use value::GValue;
pub use value_type::{FieldValue, ValueType, WithValueType};
pub use varray::{GVArray, VArray};
pub use vector_array::{GVVectorArray, GVectorArray, VVectorArray, VectorArray};

/// Upcast to [`Any`], used to downcast trait objects to their concrete type.
///
/// Call this on a `&dyn Trait`, never on an `Arc<dyn Trait>`: the smart
/// pointer is itself `Any` and would be returned instead of its contents.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}
