use super::evaluate_fields;
use crate::{
    config::EvaluationConfig,
    dynamic::{FieldValue, GMutableSpan, GVArray, GVMutableArray, VArray},
    field::{Field, FieldContext, GField},
    index_mask::IndexMask,
    resource_scope::ResourceScope,
};
use std::{borrow::Cow, slice};

/// Evaluates a set of fields in one pass.
///
/// Fields are added first, then [`evaluate`](Self::evaluate) is called
/// exactly once, after which the results can be read by the index returned
/// when the field was added. An optional selection restricts the
/// evaluation to the indices of the mask where the selection is true.
///
/// ```
/// use fields::{
///     build, DefaultFieldContext, ExecPreset, Field, FieldEvaluator, FieldOperation,
///     IndexFieldInput,
/// };
/// use std::sync::Arc;
///
/// let even = Arc::new(build::si1_so("even", |i: &i32| i % 2 == 0, ExecPreset::Simple));
/// let selection = Field::new(FieldOperation::create(even, vec![IndexFieldInput::field().into()]));
///
/// let context = DefaultFieldContext;
/// let mut indices = vec![0; 6];
/// let mut evaluator = FieldEvaluator::for_size(&context, 6);
/// evaluator.set_selection(selection);
/// evaluator.add_with_destination_slice(IndexFieldInput::field(), &mut indices);
/// evaluator.evaluate();
/// assert_eq!(evaluator.get_evaluated_selection_as_mask().to_vec(), vec![0, 2, 4]);
/// drop(evaluator);
/// assert_eq!(indices, vec![0, 0, 2, 0, 4, 0]);
/// ```
pub struct FieldEvaluator<'a> {
    scope: ResourceScope,
    context: &'a dyn FieldContext,
    mask: Cow<'a, IndexMask>,
    config: EvaluationConfig,
    fields_to_evaluate: Vec<GField>,
    dst_varrays: Vec<Option<GVMutableArray<'a>>>,
    evaluated_varrays: Vec<GVArray>,
    selection_field: Option<Field<bool>>,
    selection_mask: IndexMask,
    is_evaluated: bool,
}

impl<'a> FieldEvaluator<'a> {
    pub fn new(context: &'a dyn FieldContext, mask: &'a IndexMask) -> Self {
        Self::with_mask(context, Cow::Borrowed(mask))
    }

    /// Evaluates the indices `0..size`.
    pub fn for_size(context: &'a dyn FieldContext, size: usize) -> Self {
        Self::with_mask(context, Cow::Owned(IndexMask::from_size(size)))
    }

    fn with_mask(context: &'a dyn FieldContext, mask: Cow<'a, IndexMask>) -> Self {
        Self {
            scope: ResourceScope::new(),
            context,
            mask,
            config: EvaluationConfig::default(),
            fields_to_evaluate: Vec::new(),
            dst_varrays: Vec::new(),
            evaluated_varrays: Vec::new(),
            selection_field: None,
            selection_mask: IndexMask::empty(),
            is_evaluated: false,
        }
    }

    pub fn with_config(mut self, config: EvaluationConfig) -> Self {
        self.config = config;
        self
    }

    /// Only evaluates the fields where `selection` is true. The selection is
    /// evaluated before every other field.
    pub fn set_selection(&mut self, selection: Field<bool>) {
        self.selection_field = Some(selection);
    }

    /// Adds a field whose result is stored in a new array.
    pub fn add(&mut self, field: impl Into<GField>) -> usize {
        self.push(field.into(), None)
    }

    /// Adds a field whose result is also written to `dst` at the evaluated
    /// indices.
    pub fn add_with_destination(
        &mut self,
        field: impl Into<GField>,
        dst: GVMutableArray<'a>,
    ) -> usize {
        let field = field.into();
        debug_assert!(field.value_type() == dst.value_type());
        debug_assert!(dst.len() >= self.mask.min_array_size());
        self.push(field, Some(dst))
    }

    pub fn add_with_destination_span(
        &mut self,
        field: impl Into<GField>,
        dst: GMutableSpan<'a>,
    ) -> usize {
        self.add_with_destination(field, GVMutableArray::from_span(dst))
    }

    pub fn add_with_destination_slice<T: FieldValue>(
        &mut self,
        field: Field<T>,
        dst: &'a mut [T],
    ) -> usize {
        self.add_with_destination(field, GVMutableArray::from_slice(dst))
    }

    fn push(&mut self, field: GField, dst: Option<GVMutableArray<'a>>) -> usize {
        assert!(!self.is_evaluated, "fields added after the evaluation");
        self.fields_to_evaluate.push(field);
        self.dst_varrays.push(dst);
        self.fields_to_evaluate.len() - 1
    }

    /// Evaluates all added fields. Must be called exactly once.
    #[tracing::instrument(skip_all, fields(fields = self.fields_to_evaluate.len()))]
    pub fn evaluate(&mut self) {
        assert!(!self.is_evaluated, "fields can only be evaluated once");
        self.selection_mask = self.evaluate_selection();
        self.evaluated_varrays = evaluate_fields(
            &self.scope,
            &self.fields_to_evaluate,
            &self.selection_mask,
            self.context,
            &mut self.dst_varrays,
            &self.config,
        );
        self.is_evaluated = true;
    }

    fn evaluate_selection(&self) -> IndexMask {
        let Some(selection) = &self.selection_field else {
            return self.mask.clone().into_owned();
        };

        let varrays = evaluate_fields(
            &self.scope,
            slice::from_ref(&**selection),
            &self.mask,
            self.context,
            &mut [],
            &self.config,
        );
        let mask = IndexMask::from_bools(&self.mask, &varrays[0].typed::<bool>());
        tracing::debug!(
            indices = self.mask.len(),
            selected = mask.len(),
            "evaluated selection"
        );
        mask
    }

    fn check_evaluated(&self) {
        assert!(self.is_evaluated, "fields were not evaluated yet");
    }

    pub fn get_evaluated(&self, index: usize) -> &GVArray {
        self.check_evaluated();
        &self.evaluated_varrays[index]
    }

    pub fn get_evaluated_typed<T: FieldValue>(&self, index: usize) -> VArray<T> {
        self.get_evaluated(index).typed()
    }

    /// Interprets a boolean result as a mask of the indices where it is
    /// true.
    pub fn get_evaluated_as_mask(&self, index: usize) -> IndexMask {
        let varray = self.get_evaluated_typed::<bool>(index);
        match varray.get_internal_single() {
            Some(true) => IndexMask::from_size(varray.len()),
            Some(false) => IndexMask::empty(),
            None => IndexMask::from_bools(&self.selection_mask, &varray),
        }
    }

    /// The indices that were evaluated: the mask restricted to the
    /// selection.
    pub fn get_evaluated_selection_as_mask(&self) -> &IndexMask {
        self.check_evaluated();
        &self.selection_mask
    }

    pub fn len(&self) -> usize {
        self.fields_to_evaluate.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields_to_evaluate.is_empty()
    }
}
