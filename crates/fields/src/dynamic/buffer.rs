use super::{FieldValue, GMutableSpan, GVArray, GValue, VArray, ValueType};
use std::{
    any::Any,
    fmt::{self, Debug},
};

trait DynBuffer: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn value_type(&self) -> &'static dyn ValueType;
    fn offset(&self) -> usize;
    fn len(&self) -> usize;
    fn get(&self, index: usize) -> GValue;
    fn as_mutable_span(&mut self) -> GMutableSpan<'_>;
    fn into_varray(self: Box<Self>) -> GVArray;
}

struct TypedBuffer<T> {
    data: Vec<T>,
    offset: usize,
}

impl<T: FieldValue> DynBuffer for TypedBuffer<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn value_type(&self) -> &'static dyn ValueType {
        T::value_type()
    }

    fn offset(&self) -> usize {
        self.offset
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn get(&self, index: usize) -> GValue {
        GValue::new(self.data[index - self.offset].clone())
    }

    fn as_mutable_span(&mut self) -> GMutableSpan<'_> {
        GMutableSpan::with_offset(self.data.as_mut_slice(), self.offset)
    }

    fn into_varray(self: Box<Self>) -> GVArray {
        VArray::from_vec_at(self.data, self.offset).into()
    }
}

/// Owned storage for the values at the indices `offset..offset + len`.
pub struct GBuffer(Box<dyn DynBuffer>);

impl GBuffer {
    /// Default-initialized buffer.
    pub fn new(ty: &dyn ValueType, offset: usize, len: usize) -> Self {
        ty.new_buffer(offset, len)
    }

    pub fn from_vec<T: FieldValue>(data: Vec<T>) -> Self {
        Self::from_vec_at(data, 0)
    }

    pub fn from_vec_at<T: FieldValue>(data: Vec<T>, offset: usize) -> Self {
        Self(Box::new(TypedBuffer { data, offset }))
    }

    pub fn value_type(&self) -> &'static dyn ValueType {
        self.0.value_type()
    }

    pub fn offset(&self) -> usize {
        self.0.offset()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.len() == 0
    }

    pub fn get(&self, index: usize) -> GValue {
        self.0.get(index)
    }

    /// The buffer contents, starting at [`offset`](Self::offset).
    pub fn typed<T: FieldValue>(&self) -> Option<&[T]> {
        self.0
            .as_any()
            .downcast_ref::<TypedBuffer<T>>()
            .map(|buffer| buffer.data.as_slice())
    }

    pub fn as_mutable_span(&mut self) -> GMutableSpan<'_> {
        self.0.as_mutable_span()
    }

    /// Turns the buffer into a read-only array without copying.
    pub fn into_varray(self) -> GVArray {
        self.0.into_varray()
    }
}

impl Debug for GBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GBuffer")
            .field("type", &self.value_type())
            .field("offset", &self.offset())
            .field("len", &self.len())
            .finish()
    }
}
