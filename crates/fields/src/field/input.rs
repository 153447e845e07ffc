use super::{Field, FieldContext, GField};
use crate::{
    dynamic::{AsAny, FieldValue, GVArray, VArray, ValueType},
    hash::{address_hash, default_hash, OrderedSet},
    index_mask::IndexMask,
    resource_scope::ResourceScope,
    utils::same_object,
};
use std::{
    any::TypeId,
    fmt::{self, Debug},
    hash::{Hash, Hasher},
    sync::Arc,
};

/// Where the values of an input come from. Only used to group inputs in
/// user interfaces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FieldInputCategory {
    NamedAttribute,
    Generated,
    AnonymousAttribute,
    #[default]
    Unknown,
}

/// A leaf of a field graph whose values are provided by the
/// [`FieldContext`] at evaluation time.
///
/// Inputs are compared structurally when field graphs are deduplicated, so
/// implementations that can be constructed more than once for the same
/// logical input should override [`input_hash`](Self::input_hash) and
/// [`is_equal_to`](Self::is_equal_to).
pub trait FieldInput: AsAny + Send + Sync {
    fn value_type(&self) -> &'static dyn ValueType;

    fn debug_name(&self) -> String;

    fn category(&self) -> FieldInputCategory {
        FieldInputCategory::Unknown
    }

    /// Name shown when inspecting the values of a socket that carries this
    /// input.
    fn socket_inspection_name(&self) -> String {
        self.debug_name()
    }

    /// Values of the input at the indices in `mask`, used when the context
    /// doesn't provide the input itself. `None` makes the evaluation use
    /// the default value of the type.
    fn get_varray_for_context(
        &self,
        _context: &dyn FieldContext,
        _mask: &IndexMask,
        _scope: &ResourceScope,
    ) -> Option<GVArray> {
        None
    }

    /// Hash consistent with [`is_equal_to`](Self::is_equal_to). Identity by
    /// default.
    fn input_hash(&self) -> u64 {
        address_hash(self)
    }

    fn is_equal_to(&self, other: &dyn FieldInput) -> bool {
        same_object(self, other)
    }
}

impl Debug for dyn FieldInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Input({}: {})", self.debug_name(), self.value_type().name())
    }
}

#[derive(Clone)]
struct ByAddress(Arc<dyn FieldInput>);

impl PartialEq for ByAddress {
    fn eq(&self, other: &Self) -> bool {
        same_object(&*self.0, &*other.0)
    }
}

impl Eq for ByAddress {}

impl Hash for ByAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(address_hash(&*self.0));
    }
}

#[derive(Clone)]
struct ByValue(Arc<dyn FieldInput>);

impl PartialEq for ByValue {
    fn eq(&self, other: &Self) -> bool {
        self.0.is_equal_to(&*other.0)
    }
}

impl Eq for ByValue {}

impl Hash for ByValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.input_hash());
    }
}

/// The inputs a field node depends on, directly or through other nodes.
///
/// `nodes` contains every distinct input object, `deduplicated_nodes` only
/// one of every group of structurally equal inputs. Both keep insertion
/// order. Sets are shared between nodes and only copied when a node
/// depends on inputs that none of its operands' sets covers.
#[derive(Clone, Default)]
pub struct FieldInputs {
    nodes: OrderedSet<ByAddress>,
    deduplicated_nodes: OrderedSet<ByValue>,
}

impl FieldInputs {
    pub(crate) fn for_input(input: Arc<dyn FieldInput>) -> Self {
        let mut inputs = Self::default();
        inputs.insert(input);
        inputs
    }

    fn insert(&mut self, input: Arc<dyn FieldInput>) {
        self.nodes.insert(ByAddress(input.clone()));
        self.deduplicated_nodes.insert(ByValue(input));
    }

    /// Number of structurally distinct inputs.
    pub fn len(&self) -> usize {
        self.deduplicated_nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deduplicated_nodes.is_empty()
    }

    /// Number of distinct input objects, including structural duplicates.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether this exact input object is part of the set.
    pub fn contains_node(&self, input: &Arc<dyn FieldInput>) -> bool {
        self.nodes.contains(&ByAddress(input.clone()))
    }

    /// Whether an input structurally equal to `input` is part of the set.
    pub fn contains(&self, input: &Arc<dyn FieldInput>) -> bool {
        self.deduplicated_nodes.contains(&ByValue(input.clone()))
    }

    /// The deduplicated inputs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn FieldInput>> + '_ {
        self.deduplicated_nodes.iter().map(|input| &input.0)
    }

    /// Every input object in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Arc<dyn FieldInput>> + '_ {
        self.nodes.iter().map(|input| &input.0)
    }
}

impl Debug for FieldInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// The union of the inputs of `fields`.
///
/// Reuses the largest existing set when it already contains every input,
/// so building a long chain of operations doesn't copy the input set at
/// every step. Of equally large sets the first one is extended, which keeps
/// the inputs in operand order.
pub(crate) fn combine_field_inputs(fields: &[GField]) -> Option<Arc<FieldInputs>> {
    let candidate = fields
        .iter()
        .filter_map(|field| field.node().field_inputs())
        .filter(|inputs| !inputs.nodes.is_empty())
        .reduce(|best, inputs| {
            if inputs.nodes.len() > best.nodes.len() {
                inputs
            } else {
                best
            }
        })?;

    let missing: Vec<Arc<dyn FieldInput>> = fields
        .iter()
        .filter_map(|field| field.node().field_inputs())
        .filter(|inputs| !Arc::ptr_eq(inputs, candidate))
        .flat_map(|inputs| inputs.nodes.iter())
        .filter(|input| !candidate.nodes.contains(*input))
        .map(|input| input.0.clone())
        .collect();

    if missing.is_empty() {
        return Some(candidate.clone());
    }

    let mut combined = FieldInputs::clone(candidate);
    for input in missing {
        combined.insert(input);
    }
    Some(Arc::new(combined))
}

/// The index of every element, as `i32`.
///
/// All index inputs are equal to each other.
#[derive(Clone, Copy, Debug, Default)]
pub struct IndexFieldInput;

impl IndexFieldInput {
    pub fn field() -> Field<i32> {
        Field::new(GField::from_input(Arc::new(Self)))
    }

    pub fn index_varray(mask: &IndexMask) -> GVArray {
        VArray::from_func(mask.min_array_size(), |index| index as i32).into()
    }
}

impl FieldInput for IndexFieldInput {
    fn value_type(&self) -> &'static dyn ValueType {
        i32::value_type()
    }

    fn debug_name(&self) -> String {
        "Index".to_owned()
    }

    fn category(&self) -> FieldInputCategory {
        FieldInputCategory::Generated
    }

    fn get_varray_for_context(
        &self,
        _context: &dyn FieldContext,
        mask: &IndexMask,
        _scope: &ResourceScope,
    ) -> Option<GVArray> {
        Some(Self::index_varray(mask))
    }

    fn input_hash(&self) -> u64 {
        default_hash(&TypeId::of::<Self>())
    }

    fn is_equal_to(&self, other: &dyn FieldInput) -> bool {
        other.as_any().is::<Self>()
    }
}

/// An input identified by name, e.g. an attribute of a geometry. Inputs
/// with the same name and type are equal. Contexts recognize it by
/// downcasting.
#[derive(Clone, Debug)]
pub struct NamedFieldInput {
    name: String,
    value_type: &'static dyn ValueType,
    category: FieldInputCategory,
}

impl NamedFieldInput {
    pub fn new<T: FieldValue>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value_type: T::value_type(),
            category: FieldInputCategory::NamedAttribute,
        }
    }

    pub fn with_category(mut self, category: FieldInputCategory) -> Self {
        self.category = category;
        self
    }

    pub fn field<T: FieldValue>(name: impl Into<String>) -> Field<T> {
        Field::new(GField::from_input(Arc::new(Self::new::<T>(name))))
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FieldInput for NamedFieldInput {
    fn value_type(&self) -> &'static dyn ValueType {
        self.value_type
    }

    fn debug_name(&self) -> String {
        self.name.clone()
    }

    fn category(&self) -> FieldInputCategory {
        self.category
    }

    fn socket_inspection_name(&self) -> String {
        format!("\"{}\" attribute", self.name)
    }

    fn input_hash(&self) -> u64 {
        default_hash(&(&self.name, self.value_type.value_type_id()))
    }

    fn is_equal_to(&self, other: &dyn FieldInput) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|other| other.name == self.name && other.value_type == self.value_type)
    }
}
