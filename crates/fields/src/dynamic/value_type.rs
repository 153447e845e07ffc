use super::{GBuffer, GMutableSpan, GVArray, GValue, GVectorArray, VArray, VectorArray};
use crate::hash::default_hash;
use std::{
    any::{type_name, TypeId},
    fmt::{self, Debug},
    marker::PhantomData,
    mem,
};

/// A type that can flow through fields and multi-functions.
///
/// Values must be cheap enough to clone and have a default, which is used to
/// initialize buffers before a multi-function writes its outputs. Two values
/// that compare equal must have the same [`hash_value`](Self::hash_value).
pub trait FieldValue: Clone + Default + Debug + PartialEq + Send + Sync + 'static {
    fn hash_value(&self) -> u64;

    /// The runtime descriptor of this type.
    fn value_type() -> &'static dyn ValueType {
        <Self as WithValueType>::VALUE_TYPE
    }
}

macro_rules! hashable_field_values {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FieldValue for $ty {
                fn hash_value(&self) -> u64 {
                    default_hash(self)
                }
            }
        )*
    };
}

hashable_field_values!(bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, String);

impl FieldValue for f32 {
    fn hash_value(&self) -> u64 {
        default_hash(&self.to_bits())
    }
}

impl FieldValue for f64 {
    fn hash_value(&self) -> u64 {
        default_hash(&self.to_bits())
    }
}

macro_rules! float_vectors {
    ($($n:literal),*) => {
        $(
            impl FieldValue for [f32; $n] {
                fn hash_value(&self) -> u64 {
                    default_hash(&self.map(f32::to_bits))
                }
            }
        )*
    };
}

float_vectors!(2, 3, 4);

/// Runtime description of a [`FieldValue`] type.
///
/// Descriptors are compared by the type they describe, never by address.
pub trait ValueType: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn value_type_id(&self) -> TypeId;

    fn size_of(&self) -> usize;

    fn align_of(&self) -> usize;

    /// Whether dropping a value of this type is a no-op.
    fn is_trivially_destructible(&self) -> bool;

    fn default_value(&self) -> GValue;

    /// Allocates `len` default-initialized values covering the indices
    /// `offset..offset + len`.
    fn new_buffer(&self, offset: usize, len: usize) -> GBuffer;

    /// Allocates `len` empty vectors with elements of this type.
    fn new_vector_array(&self, len: usize) -> GVectorArray;

    /// Copies the contents of `span` into a new virtual array that keeps the
    /// span's indices.
    fn copy_span(&self, span: &GMutableSpan<'_>) -> GVArray;
}

impl PartialEq for dyn ValueType {
    fn eq(&self, other: &Self) -> bool {
        self.value_type_id() == other.value_type_id()
    }
}

impl Eq for dyn ValueType {}

impl Debug for dyn ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Associates a static [`ValueType`] descriptor with every [`FieldValue`].
pub trait WithValueType {
    const VALUE_TYPE: &'static dyn ValueType;
}

impl<T: FieldValue> WithValueType for T {
    const VALUE_TYPE: &'static dyn ValueType = &TypeImpl::<T>(PhantomData);
}

struct TypeImpl<T>(PhantomData<fn() -> T>);

impl<T: FieldValue> ValueType for TypeImpl<T> {
    fn name(&self) -> &'static str {
        type_name::<T>()
    }

    fn value_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn size_of(&self) -> usize {
        mem::size_of::<T>()
    }

    fn align_of(&self) -> usize {
        mem::align_of::<T>()
    }

    fn is_trivially_destructible(&self) -> bool {
        !mem::needs_drop::<T>()
    }

    fn default_value(&self) -> GValue {
        GValue::new(T::default())
    }

    fn new_buffer(&self, offset: usize, len: usize) -> GBuffer {
        GBuffer::from_vec_at(vec![T::default(); len], offset)
    }

    fn new_vector_array(&self, len: usize) -> GVectorArray {
        VectorArray::<T>::new(len).into()
    }

    fn copy_span(&self, span: &GMutableSpan<'_>) -> GVArray {
        VArray::from_vec_at(span.as_slice::<T>().to_vec(), span.offset()).into()
    }
}

#[cfg(test)]
mod test {
    use super::FieldValue;

    #[test]
    fn descriptors_compare_by_type() {
        assert_eq!(i32::value_type(), i32::value_type());
        assert_ne!(i32::value_type(), u32::value_type());
        assert_eq!(f32::value_type().size_of(), 4);
        assert!(i64::value_type().is_trivially_destructible());
        assert!(!String::value_type().is_trivially_destructible());
        assert_eq!(
            <[f32; 3]>::value_type().default_value().get::<[f32; 3]>(),
            Some(&[0.0; 3])
        );
    }

    #[test]
    fn float_hashes_follow_bits() {
        assert_eq!(1.5f32.hash_value(), 1.5f32.hash_value());
        assert_ne!(0.0f64.hash_value(), (-0.0f64).hash_value());
    }
}
