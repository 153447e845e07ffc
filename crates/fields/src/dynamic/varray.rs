use super::{FieldValue, GBuffer, GMutableSpan, GValue, MutableSpan, ValueType};
use crate::index_mask::IndexMask;
use std::{
    any::Any,
    borrow::Cow,
    fmt::{self, Debug},
    sync::Arc,
};

/// Read-only virtual array.
///
/// A virtual array provides one value per index without necessarily storing
/// them: it is either a single value repeated `len` times, a shared buffer or
/// a function of the index. Clones share the underlying data.
pub struct VArray<T> {
    len: usize,
    repr: Repr<T>,
}

enum Repr<T> {
    Single(T),
    /// `data[i]` is the value at index `offset + i`.
    Span {
        data: Arc<Vec<T>>,
        offset: usize,
    },
    Func(Arc<dyn Fn(usize) -> T + Send + Sync>),
}

impl<T: Clone> Clone for VArray<T> {
    fn clone(&self) -> Self {
        let repr = match &self.repr {
            Repr::Single(value) => Repr::Single(value.clone()),
            Repr::Span { data, offset } => Repr::Span {
                data: data.clone(),
                offset: *offset,
            },
            Repr::Func(f) => Repr::Func(f.clone()),
        };
        Self {
            len: self.len,
            repr,
        }
    }
}

impl<T: FieldValue> VArray<T> {
    pub fn for_single(value: T, len: usize) -> Self {
        Self {
            len,
            repr: Repr::Single(value),
        }
    }

    pub fn from_vec(data: Vec<T>) -> Self {
        Self::from_vec_at(data, 0)
    }

    /// Array of length `offset + data.len()` whose values at indices below
    /// `offset` must not be accessed.
    pub fn from_vec_at(data: Vec<T>, offset: usize) -> Self {
        Self::from_arc_at(Arc::new(data), offset)
    }

    pub fn from_arc(data: Arc<Vec<T>>) -> Self {
        Self::from_arc_at(data, 0)
    }

    fn from_arc_at(data: Arc<Vec<T>>, offset: usize) -> Self {
        Self {
            len: offset + data.len(),
            repr: Repr::Span { data, offset },
        }
    }

    pub fn from_func<F>(len: usize, f: F) -> Self
    where
        F: Fn(usize) -> T + Send + Sync + 'static,
    {
        Self {
            len,
            repr: Repr::Func(Arc::new(f)),
        }
    }

    pub fn empty() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_single(&self) -> bool {
        matches!(self.repr, Repr::Single(_))
    }

    /// The repeated value, if the array stores a single value.
    pub fn get_internal_single(&self) -> Option<&T> {
        match &self.repr {
            Repr::Single(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_span(&self) -> bool {
        matches!(self.repr, Repr::Span { offset: 0, .. })
    }

    /// The stored values, if the array is a buffer that starts at index 0.
    pub fn get_internal_span(&self) -> Option<&[T]> {
        match &self.repr {
            Repr::Span { data, offset: 0 } => Some(data.as_slice()),
            _ => None,
        }
    }

    pub fn get(&self, index: usize) -> T {
        debug_assert!(index < self.len, "index {index} out of bounds");
        match &self.repr {
            Repr::Single(value) => value.clone(),
            Repr::Span { data, offset } => {
                stored(data, *offset, index).cloned().unwrap_or_default()
            }
            Repr::Func(f) => f(index),
        }
    }

    /// Like [`get`](Self::get), but borrows stored values instead of
    /// cloning them.
    pub fn get_ref(&self, index: usize) -> Cow<'_, T> {
        match &self.repr {
            Repr::Single(value) => Cow::Borrowed(value),
            Repr::Span { data, offset } => match stored(data, *offset, index) {
                Some(value) => Cow::Borrowed(value),
                None => Cow::Owned(T::default()),
            },
            Repr::Func(f) => Cow::Owned(f(index)),
        }
    }

    /// Writes the values at the indices in `mask` to `dst`.
    pub fn materialize(&self, mask: &IndexMask, dst: &mut MutableSpan<'_, T>) {
        match &self.repr {
            Repr::Single(value) => dst.fill(mask, value),
            Repr::Span { data, offset } => {
                mask.foreach_index(|index| {
                    dst[index] = stored(data, *offset, index).cloned().unwrap_or_default()
                })
            }
            Repr::Func(f) => mask.foreach_index(|index| dst[index] = f(index)),
        }
    }

    /// All values. Indices that the array does not store are default values.
    pub fn to_vec(&self) -> Vec<T> {
        match &self.repr {
            Repr::Single(value) => vec![value.clone(); self.len],
            Repr::Span { data, offset: 0 } => data.to_vec(),
            Repr::Span { data, offset } => {
                let mut values = vec![T::default(); *offset];
                values.extend_from_slice(data);
                values
            }
            Repr::Func(f) => (0..self.len).map(|index| f(index)).collect(),
        }
    }
}

/// The stored value at `index` of a buffer that starts at `offset`.
fn stored<T>(data: &[T], offset: usize, index: usize) -> Option<&T> {
    index.checked_sub(offset).and_then(|index| data.get(index))
}

impl<T: FieldValue> From<Vec<T>> for VArray<T> {
    fn from(data: Vec<T>) -> Self {
        Self::from_vec(data)
    }
}

impl<T: FieldValue> Debug for VArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Single(value) => write!(f, "VArray::Single({value:?}; {})", self.len),
            Repr::Span { data, offset } => f
                .debug_struct("VArray::Span")
                .field("offset", offset)
                .field("data", data)
                .finish(),
            Repr::Func(_) => write!(f, "VArray::Func(len: {})", self.len),
        }
    }
}

trait DynVArray: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn value_type(&self) -> &'static dyn ValueType;
    fn len(&self) -> usize;
    fn is_single(&self) -> bool;
    fn get(&self, index: usize) -> GValue;
    fn get_internal_single(&self) -> Option<GValue>;
    fn materialize_to(&self, mask: &IndexMask, dst: &mut GMutableSpan<'_>);
    fn fmt_debug(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl<T: FieldValue> DynVArray for VArray<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn value_type(&self) -> &'static dyn ValueType {
        T::value_type()
    }

    fn len(&self) -> usize {
        self.len
    }

    fn is_single(&self) -> bool {
        VArray::is_single(self)
    }

    fn get(&self, index: usize) -> GValue {
        GValue::new(VArray::get(self, index))
    }

    fn get_internal_single(&self) -> Option<GValue> {
        VArray::get_internal_single(self).cloned().map(GValue::new)
    }

    fn materialize_to(&self, mask: &IndexMask, dst: &mut GMutableSpan<'_>) {
        self.materialize(mask, &mut dst.typed_mut::<T>());
    }

    fn fmt_debug(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

/// Type-erased [`VArray`].
#[derive(Clone)]
pub struct GVArray(Arc<dyn DynVArray>);

impl GVArray {
    /// `len` copies of `value`.
    pub fn for_single(value: &GValue, len: usize) -> Self {
        value.to_single_varray(len)
    }

    /// `len` copies of the default value of `ty`.
    pub fn for_single_default(ty: &dyn ValueType, len: usize) -> Self {
        ty.default_value().to_single_varray(len)
    }

    pub fn for_empty(ty: &dyn ValueType) -> Self {
        GBuffer::new(ty, 0, 0).into_varray()
    }

    pub fn value_type(&self) -> &'static dyn ValueType {
        self.0.value_type()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.len() == 0
    }

    pub fn is_single(&self) -> bool {
        self.0.is_single()
    }

    pub fn get(&self, index: usize) -> GValue {
        self.0.get(index)
    }

    pub fn get_internal_single(&self) -> Option<GValue> {
        self.0.get_internal_single()
    }

    pub fn try_typed<T: FieldValue>(&self) -> Option<VArray<T>> {
        self.0.as_any().downcast_ref::<VArray<T>>().cloned()
    }

    /// The typed array, panicking if `T` is not the element type.
    pub fn typed<T: FieldValue>(&self) -> VArray<T> {
        self.try_typed().unwrap_or_else(|| {
            panic!(
                "array of type {} accessed as {}",
                self.value_type().name(),
                T::value_type().name()
            )
        })
    }

    /// Writes the values at the indices in `mask` to `dst`.
    pub fn materialize_to(&self, mask: &IndexMask, dst: &mut GMutableSpan<'_>) {
        self.0.materialize_to(mask, dst)
    }

    /// Whether both handles share the same array.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: FieldValue> From<VArray<T>> for GVArray {
    fn from(varray: VArray<T>) -> Self {
        Self(Arc::new(varray))
    }
}

impl Debug for GVArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt_debug(f)
    }
}
