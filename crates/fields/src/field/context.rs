use super::FieldInput;
use crate::{dynamic::GVArray, index_mask::IndexMask, resource_scope::ResourceScope};

/// Upcast to `&dyn FieldContext`, implemented for every sized context.
pub trait AsFieldContext {
    fn as_field_context(&self) -> &dyn FieldContext;
}

impl<T: FieldContext> AsFieldContext for T {
    fn as_field_context(&self) -> &dyn FieldContext {
        self
    }
}

/// Provides the values of [`FieldInput`]s during an evaluation.
///
/// Contexts usually recognize the inputs they provide by downcasting them
/// and forward everything else to the input itself, which is what the
/// default implementation does.
pub trait FieldContext: AsFieldContext {
    /// Values of `input` for the indices in `mask`. The array must cover
    /// `mask.min_array_size()` indices. `scope` outlives the evaluation and
    /// can own data the array borrows from.
    fn get_varray_for_input(
        &self,
        input: &dyn FieldInput,
        mask: &IndexMask,
        scope: &ResourceScope,
    ) -> Option<GVArray> {
        input.get_varray_for_context(self.as_field_context(), mask, scope)
    }
}

/// A context that provides no data of its own: every input computes its
/// values itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultFieldContext;

impl FieldContext for DefaultFieldContext {}
