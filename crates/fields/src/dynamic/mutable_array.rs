use super::{FieldValue, GMutableSpan, GVArray, VArray, ValueType};
use crate::index_mask::IndexMask;
use std::fmt::{self, Debug};

/// Writable storage that is not a contiguous slice, e.g. an attribute stored
/// in a different layout. Used as an evaluation destination.
pub trait VMutableArray<T>: Send + Sync {
    fn len(&self) -> usize;

    fn get(&self, index: usize) -> T;

    fn set(&mut self, index: usize, value: T);
}

trait DynVMutableArray: Send + Sync {
    fn value_type(&self) -> &'static dyn ValueType;
    fn len(&self) -> usize;
    fn set_from(&mut self, src: &GVArray, mask: &IndexMask);
    fn read(&self) -> GVArray;
}

struct VirtualArray<'a, T>(&'a mut dyn VMutableArray<T>);

impl<T: FieldValue> DynVMutableArray for VirtualArray<'_, T> {
    fn value_type(&self) -> &'static dyn ValueType {
        T::value_type()
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn set_from(&mut self, src: &GVArray, mask: &IndexMask) {
        let src = src.typed::<T>();
        mask.foreach_index(|index| self.0.set(index, src.get(index)));
    }

    fn read(&self) -> GVArray {
        let values: Vec<T> = (0..self.0.len()).map(|index| self.0.get(index)).collect();
        VArray::from_vec(values).into()
    }
}

enum Repr<'a> {
    Span(GMutableSpan<'a>),
    Virtual(Box<dyn DynVMutableArray + 'a>),
}

/// Type-erased writable array: either a span or a [`VMutableArray`].
pub struct GVMutableArray<'a> {
    repr: Repr<'a>,
}

impl<'a> GVMutableArray<'a> {
    pub fn from_span(span: GMutableSpan<'a>) -> Self {
        Self {
            repr: Repr::Span(span),
        }
    }

    pub fn from_slice<T: FieldValue>(data: &'a mut [T]) -> Self {
        Self::from_span(GMutableSpan::new(data))
    }

    pub fn from_virtual<T: FieldValue>(array: &'a mut dyn VMutableArray<T>) -> Self {
        Self {
            repr: Repr::Virtual(Box::new(VirtualArray(array))),
        }
    }

    pub fn value_type(&self) -> &'static dyn ValueType {
        match &self.repr {
            Repr::Span(span) => span.value_type(),
            Repr::Virtual(array) => array.value_type(),
        }
    }

    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Span(span) => span.len(),
            Repr::Virtual(array) => array.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_span(&self) -> bool {
        matches!(self.repr, Repr::Span(_))
    }

    /// The underlying span, if values can be written in place.
    pub fn span_mut(&mut self) -> Option<GMutableSpan<'_>> {
        match &mut self.repr {
            Repr::Span(span) => Some(span.reborrow()),
            Repr::Virtual(_) => None,
        }
    }

    /// Copies the values at the indices in `mask` from `src`.
    pub fn set_from(&mut self, src: &GVArray, mask: &IndexMask) {
        debug_assert_eq!(src.value_type(), self.value_type());
        match &mut self.repr {
            Repr::Span(span) => src.materialize_to(mask, span),
            Repr::Virtual(array) => array.set_from(src, mask),
        }
    }

    /// Copies the current contents into a read-only array.
    pub fn read(&self) -> GVArray {
        match &self.repr {
            Repr::Span(span) => span.to_varray(),
            Repr::Virtual(array) => array.read(),
        }
    }
}

impl<'a> From<GMutableSpan<'a>> for GVMutableArray<'a> {
    fn from(span: GMutableSpan<'a>) -> Self {
        Self::from_span(span)
    }
}

impl Debug for GVMutableArray<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Span(span) => span.fmt(f),
            Repr::Virtual(array) => f
                .debug_struct("GVMutableArray::Virtual")
                .field("type", &array.value_type())
                .field("len", &array.len())
                .finish(),
        }
    }
}
