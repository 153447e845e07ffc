use super::{FieldValue, GVArray, ValueType};
use crate::index_mask::IndexMask;
use std::{
    any::{type_name, TypeId},
    fmt::{self, Debug},
    marker::PhantomData,
    ops::{Index, IndexMut, Range},
    ptr::NonNull,
    slice,
};

/// Mutable view of consecutive values, addressed by absolute element index.
///
/// A span covering the indices `offset..offset + len` is indexed with those
/// indices, so a chunk of a larger output can be handed to a multi-function
/// without rewriting the indices of its mask.
pub struct MutableSpan<'a, T> {
    data: &'a mut [T],
    offset: usize,
}

impl<'a, T> MutableSpan<'a, T> {
    pub fn new(data: &'a mut [T]) -> Self {
        Self::with_offset(data, 0)
    }

    pub fn with_offset(data: &'a mut [T], offset: usize) -> Self {
        Self { data, offset }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The absolute indices covered by the span.
    pub fn index_range(&self) -> Range<usize> {
        self.offset..self.offset + self.data.len()
    }

    pub fn as_slice(&self) -> &[T] {
        &*self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut *self.data
    }

    pub fn into_slice(self) -> &'a mut [T] {
        self.data
    }

    pub fn reborrow(&mut self) -> MutableSpan<'_, T> {
        MutableSpan {
            data: &mut *self.data,
            offset: self.offset,
        }
    }

    /// Splits the span before the absolute index `index`.
    pub fn split_at(self, index: usize) -> (Self, Self) {
        let (left, right) = self.data.split_at_mut(index - self.offset);
        (
            Self::with_offset(left, self.offset),
            Self::with_offset(right, index),
        )
    }
}

impl<T: Clone> MutableSpan<'_, T> {
    /// Writes `value` to every index of `mask`.
    pub fn fill(&mut self, mask: &IndexMask, value: &T) {
        mask.foreach_index(|index| self[index] = value.clone());
    }
}

impl<T> Index<usize> for MutableSpan<'_, T> {
    type Output = T;

    #[inline]
    fn index(&self, index: usize) -> &T {
        &self.data[index - self.offset]
    }
}

impl<T> IndexMut<usize> for MutableSpan<'_, T> {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.data[index - self.offset]
    }
}

impl<T: Debug> Debug for MutableSpan<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableSpan")
            .field("offset", &self.offset)
            .field("data", &&*self.data)
            .finish()
    }
}

/// Type-erased [`MutableSpan`].
pub struct GMutableSpan<'a> {
    ty: &'static dyn ValueType,
    data: NonNull<u8>,
    offset: usize,
    len: usize,
    _marker: PhantomData<&'a mut [u8]>,
}

// SAFETY: a `GMutableSpan` is only ever created from a `&mut [T]` where
// `T: FieldValue`, which is `Send + Sync`.
unsafe impl Send for GMutableSpan<'_> {}
unsafe impl Sync for GMutableSpan<'_> {}

impl<'a> GMutableSpan<'a> {
    pub fn new<T: FieldValue>(data: &'a mut [T]) -> Self {
        Self::with_offset(data, 0)
    }

    pub fn with_offset<T: FieldValue>(data: &'a mut [T], offset: usize) -> Self {
        Self {
            ty: T::value_type(),
            len: data.len(),
            data: NonNull::from(data).cast(),
            offset,
            _marker: PhantomData,
        }
    }

    pub fn value_type(&self) -> &'static dyn ValueType {
        self.ty
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn index_range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }

    fn check_type<T: FieldValue>(&self) {
        assert!(
            self.ty.value_type_id() == TypeId::of::<T>(),
            "span of type {} accessed as {}",
            self.ty.name(),
            type_name::<T>()
        );
    }

    /// Converts into a typed span, panicking if `T` is not the element type.
    pub fn typed<T: FieldValue>(self) -> MutableSpan<'a, T> {
        self.check_type::<T>();
        // SAFETY: the type was checked above and `data` was created from a
        // `&'a mut [T]` with `len` elements that this span borrows exclusively.
        let data = unsafe { slice::from_raw_parts_mut(self.data.cast::<T>().as_ptr(), self.len) };
        MutableSpan::with_offset(data, self.offset)
    }

    pub fn typed_mut<T: FieldValue>(&mut self) -> MutableSpan<'_, T> {
        self.reborrow().typed()
    }

    /// The elements of the span, starting at [`offset`](Self::offset).
    pub fn as_slice<T: FieldValue>(&self) -> &[T] {
        self.check_type::<T>();
        // SAFETY: see `typed`; the shared borrow of `self` prevents writes.
        unsafe { slice::from_raw_parts(self.data.cast::<T>().as_ptr(), self.len) }
    }

    pub fn reborrow(&mut self) -> GMutableSpan<'_> {
        GMutableSpan {
            ty: self.ty,
            data: self.data,
            offset: self.offset,
            len: self.len,
            _marker: PhantomData,
        }
    }

    /// Splits the span before the absolute index `index`.
    pub fn split_at(self, index: usize) -> (Self, Self) {
        assert!(
            self.offset <= index && index <= self.offset + self.len,
            "split index {index} outside of span {:?}",
            self.index_range()
        );
        let mid = index - self.offset;
        // SAFETY: `mid <= len`, so the pointer stays inside (or one past the
        // end of) the borrowed allocation.
        let right =
            unsafe { NonNull::new_unchecked(self.data.as_ptr().add(mid * self.ty.size_of())) };
        (
            Self {
                ty: self.ty,
                data: self.data,
                offset: self.offset,
                len: mid,
                _marker: PhantomData,
            },
            Self {
                ty: self.ty,
                data: right,
                offset: index,
                len: self.len - mid,
                _marker: PhantomData,
            },
        )
    }

    /// Copies the current contents into a new virtual array.
    pub fn to_varray(&self) -> GVArray {
        self.ty.copy_span(self)
    }
}

impl<'a, T: FieldValue> From<MutableSpan<'a, T>> for GMutableSpan<'a> {
    fn from(span: MutableSpan<'a, T>) -> Self {
        let offset = span.offset;
        Self::with_offset(span.data, offset)
    }
}

impl Debug for GMutableSpan<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GMutableSpan")
            .field("type", &self.ty)
            .field("indices", &self.index_range())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::GMutableSpan;
    use crate::index_mask::IndexMask;

    #[test]
    fn split_spans_keep_absolute_indices() {
        let mut data = vec![0i32; 10];
        let span = GMutableSpan::new(data.as_mut_slice());
        let (left, right) = span.split_at(4);
        assert_eq!(left.index_range(), 0..4);
        assert_eq!(right.index_range(), 4..10);

        let mut right = right.typed::<i32>();
        right[7] = 70;
        right.fill(&IndexMask::from_indices(vec![4, 9]), &1);
        let mut left = left.typed::<i32>();
        left[0] = -1;

        assert_eq!(data, vec![-1, 0, 0, 0, 1, 0, 0, 70, 0, 1]);
    }

    #[test]
    #[should_panic(expected = "accessed as")]
    fn typed_access_checks_the_type() {
        let mut data = vec![0u8; 2];
        GMutableSpan::new(data.as_mut_slice()).typed::<i8>();
    }

    #[test]
    fn copy_to_varray() {
        let mut data = vec![1.0f32, 2.0, 3.0];
        let span = GMutableSpan::with_offset(data.as_mut_slice(), 5);
        let varray = span.to_varray().typed::<f32>();
        assert_eq!(varray.len(), 8);
        assert_eq!(varray.get(6), 2.0);
    }
}
