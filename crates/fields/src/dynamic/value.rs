use super::{FieldValue, GMutableSpan, GVArray, VArray, ValueType};
use crate::index_mask::IndexMask;
use dyn_clone::DynClone;
use std::{
    any::Any,
    fmt::{self, Debug},
    hash::{Hash, Hasher},
};

trait DynValue: DynClone + Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn value_type(&self) -> &'static dyn ValueType;
    fn dyn_eq(&self, other: &dyn DynValue) -> bool;
    fn dyn_hash(&self) -> u64;
    fn single_varray(&self, len: usize) -> GVArray;
    fn fill(&self, mask: &IndexMask, dst: &mut GMutableSpan<'_>);
}

dyn_clone::clone_trait_object!(DynValue);

impl<T: FieldValue> DynValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn value_type(&self) -> &'static dyn ValueType {
        <T as FieldValue>::value_type()
    }

    fn dyn_eq(&self, other: &dyn DynValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| other == self)
    }

    fn dyn_hash(&self) -> u64 {
        self.hash_value()
    }

    fn single_varray(&self, len: usize) -> GVArray {
        VArray::for_single(self.clone(), len).into()
    }

    fn fill(&self, mask: &IndexMask, dst: &mut GMutableSpan<'_>) {
        dst.typed_mut::<T>().fill(mask, self);
    }
}

/// A single value of a type only known at runtime.
#[derive(Clone)]
pub struct GValue(Box<dyn DynValue>);

impl GValue {
    pub fn new<T: FieldValue>(value: T) -> Self {
        Self(Box::new(value))
    }

    pub fn value_type(&self) -> &'static dyn ValueType {
        self.0.value_type()
    }

    /// Returns the value if it has type `T`.
    pub fn get<T: FieldValue>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref()
    }

    /// Returns the value as `T`, panicking if it has a different type.
    pub fn typed<T: FieldValue>(&self) -> &T {
        self.get().unwrap_or_else(|| {
            panic!(
                "value of type {} accessed as {}",
                self.value_type().name(),
                <T as FieldValue>::value_type().name()
            )
        })
    }

    pub fn hash_value(&self) -> u64 {
        self.0.dyn_hash()
    }

    /// A virtual array of length `len` in which every element is this value.
    pub fn to_single_varray(&self, len: usize) -> GVArray {
        self.0.single_varray(len)
    }

    /// Writes the value to every index of `mask` in `dst`.
    pub fn fill(&self, mask: &IndexMask, dst: &mut GMutableSpan<'_>) {
        debug_assert_eq!(self.value_type(), dst.value_type());
        self.0.fill(mask, dst)
    }
}

impl PartialEq for GValue {
    fn eq(&self, other: &Self) -> bool {
        self.0.dyn_eq(&*other.0)
    }
}

impl Hash for GValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash_value());
    }
}

impl Debug for GValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod test {
    use super::GValue;

    #[test]
    fn equality_needs_matching_types() {
        assert_eq!(GValue::new(3i32), GValue::new(3i32));
        assert_ne!(GValue::new(3i32), GValue::new(3i64));
        assert_ne!(GValue::new(3i32), GValue::new(4i32));
        assert_eq!(GValue::new(2.5f32).hash_value(), GValue::new(2.5f32).hash_value());
        assert_eq!(GValue::new(String::from("a")).get::<String>().unwrap(), "a");
        assert!(GValue::new(1u8).get::<i8>().is_none());
    }
}
