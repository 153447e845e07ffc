use super::{FieldValue, ValueType};
use crate::index_mask::IndexMask;
use std::{
    any::Any,
    fmt::{self, Debug},
    ops::Index,
    sync::Arc,
};

/// One growable vector per index.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VectorArray<T> {
    vectors: Vec<Vec<T>>,
}

impl<T: FieldValue> VectorArray<T> {
    pub fn new(len: usize) -> Self {
        Self {
            vectors: vec![Vec::new(); len],
        }
    }

    pub fn from_vecs(vectors: Vec<Vec<T>>) -> Self {
        Self { vectors }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn get(&self, index: usize) -> &[T] {
        &self.vectors[index]
    }

    pub fn append(&mut self, index: usize, value: T) {
        self.vectors[index].push(value);
    }

    pub fn extend<I>(&mut self, index: usize, values: I)
    where
        I: IntoIterator<Item = T>,
    {
        self.vectors[index].extend(values);
    }

    pub fn clear(&mut self, index: usize) {
        self.vectors[index].clear();
    }

    pub fn into_vecs(self) -> Vec<Vec<T>> {
        self.vectors
    }
}

impl<T> Index<usize> for VectorArray<T> {
    type Output = [T];

    fn index(&self, index: usize) -> &[T] {
        &self.vectors[index]
    }
}

/// Read-only virtual array of vectors.
#[derive(Clone, Debug)]
pub struct VVectorArray<T> {
    len: usize,
    repr: VRepr<T>,
}

#[derive(Clone, Debug)]
enum VRepr<T> {
    Single(Arc<Vec<T>>),
    PerElement(Arc<VectorArray<T>>),
}

impl<T: FieldValue> VVectorArray<T> {
    /// `len` copies of `vector`.
    pub fn for_single(vector: Vec<T>, len: usize) -> Self {
        Self {
            len,
            repr: VRepr::Single(Arc::new(vector)),
        }
    }

    pub fn is_single(&self) -> bool {
        matches!(self.repr, VRepr::Single(_))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> &[T] {
        match &self.repr {
            VRepr::Single(vector) => vector,
            VRepr::PerElement(vectors) => vectors.get(index),
        }
    }
}

impl<T: FieldValue> From<VectorArray<T>> for VVectorArray<T> {
    fn from(vectors: VectorArray<T>) -> Self {
        Self {
            len: vectors.len(),
            repr: VRepr::PerElement(Arc::new(vectors)),
        }
    }
}

trait DynVVectorArray: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn value_type(&self) -> &'static dyn ValueType;
    fn len(&self) -> usize;
    fn fmt_debug(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl<T: FieldValue> DynVVectorArray for VVectorArray<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn value_type(&self) -> &'static dyn ValueType {
        T::value_type()
    }

    fn len(&self) -> usize {
        self.len
    }

    fn fmt_debug(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

/// Type-erased [`VVectorArray`]. The value type is the element type.
#[derive(Clone)]
pub struct GVVectorArray(Arc<dyn DynVVectorArray>);

impl GVVectorArray {
    pub fn value_type(&self) -> &'static dyn ValueType {
        self.0.value_type()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.len() == 0
    }

    pub fn typed<T: FieldValue>(&self) -> VVectorArray<T> {
        match self.0.as_any().downcast_ref::<VVectorArray<T>>() {
            Some(vectors) => vectors.clone(),
            None => panic!(
                "vector array of type {} accessed as {}",
                self.value_type().name(),
                T::value_type().name()
            ),
        }
    }
}

impl<T: FieldValue> From<VVectorArray<T>> for GVVectorArray {
    fn from(vectors: VVectorArray<T>) -> Self {
        Self(Arc::new(vectors))
    }
}

impl Debug for GVVectorArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt_debug(f)
    }
}

trait DynVectorArray: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn value_type(&self) -> &'static dyn ValueType;
    fn len(&self) -> usize;
    fn extend_from(&mut self, src: &GVVectorArray, mask: &IndexMask);
    fn to_vvector_array(&self) -> GVVectorArray;
    fn into_vvector_array(self: Box<Self>) -> GVVectorArray;
    fn fmt_debug(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl<T: FieldValue> DynVectorArray for VectorArray<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn value_type(&self) -> &'static dyn ValueType {
        T::value_type()
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn extend_from(&mut self, src: &GVVectorArray, mask: &IndexMask) {
        let src = src.typed::<T>();
        mask.foreach_index(|index| self.vectors[index].extend_from_slice(src.get(index)));
    }

    fn to_vvector_array(&self) -> GVVectorArray {
        VVectorArray::from(self.clone()).into()
    }

    fn into_vvector_array(self: Box<Self>) -> GVVectorArray {
        VVectorArray::from(*self).into()
    }

    fn fmt_debug(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

/// Type-erased [`VectorArray`]. The value type is the element type.
pub struct GVectorArray(Box<dyn DynVectorArray>);

impl GVectorArray {
    /// `len` empty vectors with elements of type `ty`.
    pub fn new(ty: &dyn ValueType, len: usize) -> Self {
        ty.new_vector_array(len)
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

    fn type_mismatch<T: FieldValue>(&self) -> ! {
        panic!(
            "vector array of type {} accessed as {}",
            self.value_type().name(),
            T::value_type().name()
        )
    }

    pub fn typed<T: FieldValue>(&self) -> &VectorArray<T> {
        match self.0.as_any().downcast_ref::<VectorArray<T>>() {
            Some(vectors) => vectors,
            None => self.type_mismatch::<T>(),
        }
    }

    pub fn typed_mut<T: FieldValue>(&mut self) -> &mut VectorArray<T> {
        if !self.0.as_any().is::<VectorArray<T>>() {
            self.type_mismatch::<T>()
        }
        match self.0.as_any_mut().downcast_mut::<VectorArray<T>>() {
            Some(vectors) => vectors,
            None => unreachable!(),
        }
    }

    /// Appends the vectors of `src` at the indices in `mask`.
    pub fn extend_from(&mut self, src: &GVVectorArray, mask: &IndexMask) {
        debug_assert_eq!(src.value_type(), self.value_type());
        self.0.extend_from(src, mask)
    }

    /// Copies the contents into a read-only array.
    pub fn to_vvector_array(&self) -> GVVectorArray {
        self.0.to_vvector_array()
    }

    pub fn into_vvector_array(self) -> GVVectorArray {
        self.0.into_vvector_array()
    }
}

impl<T: FieldValue> From<VectorArray<T>> for GVectorArray {
    fn from(vectors: VectorArray<T>) -> Self {
        Self(Box::new(vectors))
    }
}

impl Debug for GVectorArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt_debug(f)
    }
}

#[cfg(test)]
mod test {
    use super::{GVVectorArray, GVectorArray, VVectorArray, VectorArray};
    use crate::{dynamic::FieldValue, index_mask::IndexMask};

    #[test]
    fn extend_generic_vectors() {
        let mut vectors = GVectorArray::new(i32::value_type(), 3);
        vectors.typed_mut::<i32>().append(1, 10);

        let src = GVVectorArray::from(VVectorArray::for_single(vec![1, 2], 3));
        vectors.extend_from(&src, &IndexMask::from_indices(vec![1, 2]));

        let frozen = vectors.into_vvector_array().typed::<i32>();
        assert!(frozen.get(0).is_empty());
        assert_eq!(frozen.get(1), &[10, 1, 2]);
        assert_eq!(frozen.get(2), &[1, 2]);
    }

    #[test]
    #[should_panic(expected = "accessed as")]
    fn typed_access_checks_the_type() {
        let vectors = GVectorArray::from(VectorArray::<u8>::new(1));
        vectors.typed::<u16>();
    }
}
