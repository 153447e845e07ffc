//! The field graph.
//!
//! A field is an output of a [`FieldNode`]. Nodes are immutable and shared
//! through `Arc`, so a graph is a DAG in which the same node can feed many
//! operations. Every node caches a structural hash and the set of inputs it
//! depends on when it is created, which makes deduplication during
//! evaluation cheap.

mod context;
mod input;


pub use context::{AsFieldContext, DefaultFieldContext, FieldContext};
pub(crate) use input::combine_field_inputs;
pub use input::{FieldInput, FieldInputCategory, FieldInputs, IndexFieldInput, NamedFieldInput};

use crate::{
    dynamic::{FieldValue, GValue, ValueType},
    evaluate::{evaluate_constant_field_typed, make_constant_field},
    hash::default_hash,
    multi_function::{DataType, InterfaceType, MultiFunction},
};
use std::{
    fmt::{self, Debug},
    hash::{Hash, Hasher},
    marker::PhantomData,
    ops::Deref,
    ptr,
    sync::Arc,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldNodeType {
    Input,
    Operation,
    Constant,
}

pub enum FieldNodeKind {
    Input(Arc<dyn FieldInput>),
    Operation(FieldOperation),
    Constant(FieldConstant),
}

/// A node of the field graph with one or more outputs.
pub struct FieldNode {
    kind: FieldNodeKind,
    field_inputs: Option<Arc<FieldInputs>>,
    hash: u64,
}

impl FieldNode {
    pub fn new_input(input: Arc<dyn FieldInput>) -> Arc<Self> {
        Arc::new(Self {
            hash: default_hash(&(FieldNodeType::Input, input.input_hash())),
            field_inputs: Some(Arc::new(FieldInputs::for_input(input.clone()))),
            kind: FieldNodeKind::Input(input),
        })
    }

    pub fn new_operation(operation: FieldOperation) -> Arc<Self> {
        let inputs: Vec<(u64, usize)> = operation
            .inputs
            .iter()
            .map(|input| (input.node.hash, input.output_index))
            .collect();
        Arc::new(Self {
            hash: default_hash(&(
                FieldNodeType::Operation,
                operation.function.function_hash(),
                inputs,
            )),
            field_inputs: combine_field_inputs(&operation.inputs),
            kind: FieldNodeKind::Operation(operation),
        })
    }

    pub fn new_constant(constant: FieldConstant) -> Arc<Self> {
        Arc::new(Self {
            hash: default_hash(&(FieldNodeType::Constant, constant.value.hash_value())),
            field_inputs: None,
            kind: FieldNodeKind::Constant(constant),
        })
    }

    pub fn node_type(&self) -> FieldNodeType {
        match self.kind {
            FieldNodeKind::Input(_) => FieldNodeType::Input,
            FieldNodeKind::Operation(_) => FieldNodeType::Operation,
            FieldNodeKind::Constant(_) => FieldNodeType::Constant,
        }
    }

    pub fn kind(&self) -> &FieldNodeKind {
        &self.kind
    }

    pub fn as_input(&self) -> Option<&Arc<dyn FieldInput>> {
        match &self.kind {
            FieldNodeKind::Input(input) => Some(input),
            _ => None,
        }
    }

    pub fn as_operation(&self) -> Option<&FieldOperation> {
        match &self.kind {
            FieldNodeKind::Operation(operation) => Some(operation),
            _ => None,
        }
    }

    pub fn as_constant(&self) -> Option<&FieldConstant> {
        match &self.kind {
            FieldNodeKind::Constant(constant) => Some(constant),
            _ => None,
        }
    }

    /// Every input this node depends on, `None` if there are none.
    pub fn field_inputs(&self) -> Option<&Arc<FieldInputs>> {
        self.field_inputs.as_ref()
    }

    pub fn depends_on_input(&self) -> bool {
        self.field_inputs
            .as_ref()
            .is_some_and(|inputs| !inputs.is_empty())
    }

    pub fn output_count(&self) -> usize {
        match &self.kind {
            FieldNodeKind::Operation(operation) => operation.function.output_count(),
            FieldNodeKind::Input(_) | FieldNodeKind::Constant(_) => 1,
        }
    }

    pub fn output_type(&self, output_index: usize) -> &'static dyn ValueType {
        match &self.kind {
            FieldNodeKind::Input(input) => input.value_type(),
            FieldNodeKind::Operation(operation) => {
                operation.function.output_type(output_index).value_type()
            }
            FieldNodeKind::Constant(constant) => constant.value.value_type(),
        }
    }

    /// Structural hash: equal nodes have equal hashes.
    pub fn structural_hash(&self) -> u64 {
        self.hash
    }

    /// Structural equality. Inputs compare with [`FieldInput::is_equal_to`],
    /// operations by function and by their input fields, constants by value.
    pub fn is_equal_to(&self, other: &FieldNode) -> bool {
        let mut pending = vec![(self, other)];
        while let Some((a, b)) = pending.pop() {
            if ptr::eq(a, b) {
                continue;
            }
            if a.hash != b.hash {
                return false;
            }
            match (&a.kind, &b.kind) {
                (FieldNodeKind::Input(a), FieldNodeKind::Input(b)) => {
                    if !a.is_equal_to(&**b) {
                        return false;
                    }
                }
                (FieldNodeKind::Constant(a), FieldNodeKind::Constant(b)) => {
                    if a.value != b.value {
                        return false;
                    }
                }
                (FieldNodeKind::Operation(a), FieldNodeKind::Operation(b)) => {
                    if !a.function.equals(&*b.function) || a.inputs.len() != b.inputs.len() {
                        return false;
                    }
                    for (a, b) in a.inputs.iter().zip(&b.inputs) {
                        if a.output_index != b.output_index {
                            return false;
                        }
                        pending.push((&*a.node, &*b.node));
                    }
                }
                _ => return false,
            }
        }
        true
    }

    /// Calls `f` once for every structurally distinct input this node
    /// depends on, directly or through other nodes.
    pub fn for_each_field_input_recursive<F>(&self, mut f: F)
    where
        F: FnMut(&Arc<dyn FieldInput>),
    {
        if let Some(inputs) = &self.field_inputs {
            inputs.iter().for_each(|input| f(input));
        }
    }
}

impl Debug for FieldNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FieldNodeKind::Input(input) => input.fmt(f),
            FieldNodeKind::Operation(operation) => operation.fmt(f),
            FieldNodeKind::Constant(constant) => constant.fmt(f),
        }
    }
}

/// A field backed by a multi-function whose inputs are other fields.
#[derive(Clone)]
pub struct FieldOperation {
    function: Arc<dyn MultiFunction>,
    inputs: Vec<GField>,
}

impl FieldOperation {
    /// Panics unless `inputs` matches the input parameters of `function` and
    /// the function only has single input and output parameters.
    pub fn new(function: Arc<dyn MultiFunction>, inputs: Vec<GField>) -> Self {
        let name = function.debug_name();
        for param in function.signature().params() {
            assert!(
                param.interface_type() != InterfaceType::Mutable,
                "{name} has mutable parameters and can't be used in a field"
            );
            assert!(
                matches!(param.data_type(), DataType::Single(_)),
                "{name} has vector parameters and can't be used in a field"
            );
        }
        assert_eq!(
            inputs.len(),
            function.input_count(),
            "wrong number of inputs for {name}"
        );
        for (index, input) in inputs.iter().enumerate() {
            let expected = function.input_type(index).value_type();
            assert!(
                input.value_type() == expected,
                "input {index} of {name} has type {} instead of {}",
                input.value_type().name(),
                expected.name()
            );
        }

        Self { function, inputs }
    }

    /// The first output of a new operation node.
    pub fn create(function: Arc<dyn MultiFunction>, inputs: Vec<GField>) -> GField {
        GField::new(FieldNode::new_operation(Self::new(function, inputs)), 0)
    }

    /// A new operation node, for functions with several outputs.
    pub fn create_node(function: Arc<dyn MultiFunction>, inputs: Vec<GField>) -> Arc<FieldNode> {
        FieldNode::new_operation(Self::new(function, inputs))
    }

    pub fn function(&self) -> &Arc<dyn MultiFunction> {
        &self.function
    }

    pub fn inputs(&self) -> &[GField] {
        &self.inputs
    }
}

impl Debug for FieldOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.function.debug_name())?;
        for (index, input) in self.inputs.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            input.fmt(f)?;
        }
        f.write_str(")")
    }
}

/// A field with the same value at every index.
#[derive(Clone)]
pub struct FieldConstant {
    value: GValue,
}

impl FieldConstant {
    pub fn new(value: GValue) -> Self {
        Self { value }
    }

    pub fn create(value: GValue) -> GField {
        GField::new(FieldNode::new_constant(Self::new(value)), 0)
    }

    pub fn value(&self) -> &GValue {
        &self.value
    }

    pub fn value_type(&self) -> &'static dyn ValueType {
        self.value.value_type()
    }
}

impl Debug for FieldConstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

/// One output of a field node, with the type only known at runtime.
///
/// Equality and hashing are structural: two fields built separately from
/// equal inputs, functions and constants are equal.
#[derive(Clone)]
pub struct GField {
    node: Arc<FieldNode>,
    output_index: usize,
}

impl GField {
    pub fn new(node: Arc<FieldNode>, output_index: usize) -> Self {
        assert!(
            output_index < node.output_count(),
            "{node:?} has no output {output_index}"
        );
        Self { node, output_index }
    }

    pub fn from_input(input: Arc<dyn FieldInput>) -> Self {
        Self::new(FieldNode::new_input(input), 0)
    }

    pub fn from_constant(value: GValue) -> Self {
        FieldConstant::create(value)
    }

    pub fn node(&self) -> &Arc<FieldNode> {
        &self.node
    }

    pub fn node_type(&self) -> FieldNodeType {
        self.node.node_type()
    }

    pub fn output_index(&self) -> usize {
        self.output_index
    }

    pub fn value_type(&self) -> &'static dyn ValueType {
        self.node.output_type(self.output_index)
    }

    pub fn depends_on_input(&self) -> bool {
        self.node.depends_on_input()
    }

    pub fn field_ref(&self) -> GFieldRef<'_> {
        GFieldRef {
            node: &self.node,
            output_index: self.output_index,
        }
    }
}

impl PartialEq for GField {
    fn eq(&self, other: &Self) -> bool {
        self.field_ref() == other.field_ref()
    }
}

impl Eq for GField {}

impl Hash for GField {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.field_ref().hash(state)
    }
}

impl Debug for GField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.field_ref().fmt(f)
    }
}

/// Borrowed [`GField`], used as a key while analyzing a field graph.
#[derive(Clone, Copy)]
pub struct GFieldRef<'a> {
    node: &'a FieldNode,
    output_index: usize,
}

impl<'a> GFieldRef<'a> {
    pub fn new(node: &'a FieldNode, output_index: usize) -> Self {
        Self { node, output_index }
    }

    pub fn node(&self) -> &'a FieldNode {
        self.node
    }

    pub fn output_index(&self) -> usize {
        self.output_index
    }

    pub fn value_type(&self) -> &'static dyn ValueType {
        self.node.output_type(self.output_index)
    }
}

impl<'a> From<&'a GField> for GFieldRef<'a> {
    fn from(field: &'a GField) -> Self {
        field.field_ref()
    }
}

impl PartialEq for GFieldRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.output_index == other.output_index && self.node.is_equal_to(other.node)
    }
}

impl Eq for GFieldRef<'_> {}

impl Hash for GFieldRef<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.node.hash);
        state.write_usize(self.output_index);
    }
}

impl Debug for GFieldRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.node.output_count() > 1 {
            write!(f, "{:?}.{}", self.node, self.output_index)
        } else {
            self.node.fmt(f)
        }
    }
}

/// A [`GField`] whose values have type `T`.
pub struct Field<T> {
    field: GField,
    _type: PhantomData<fn() -> T>,
}

impl<T: FieldValue> Field<T> {
    /// Panics if `field` doesn't produce values of type `T`.
    pub fn new(field: GField) -> Self {
        assert!(
            field.value_type() == T::value_type(),
            "field of type {} used as {}",
            field.value_type().name(),
            T::value_type().name()
        );
        Self {
            field,
            _type: PhantomData,
        }
    }

    pub fn into_inner(self) -> GField {
        self.field
    }
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        Self {
            field: self.field.clone(),
            _type: PhantomData,
        }
    }
}

impl<T> Deref for Field<T> {
    type Target = GField;

    fn deref(&self) -> &GField {
        &self.field
    }
}

impl<T> From<Field<T>> for GField {
    fn from(field: Field<T>) -> Self {
        field.field
    }
}

impl<T> PartialEq for Field<T> {
    fn eq(&self, other: &Self) -> bool {
        self.field == other.field
    }
}

impl<T> Eq for Field<T> {}

impl<T> Hash for Field<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.field.hash(state)
    }
}

impl<T> Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.field.fmt(f)
    }
}

/// A plain value or a field, for parameters that usually get a single value
/// but can vary per element.
#[derive(Clone, Debug)]
pub enum ValueOrField<T: FieldValue> {
    Value(T),
    Field(Field<T>),
}

impl<T: FieldValue> ValueOrField<T> {
    pub fn is_field(&self) -> bool {
        matches!(self, Self::Field(_))
    }

    /// The field, wrapping a plain value in a constant field.
    pub fn as_field(&self) -> Field<T> {
        match self {
            Self::Value(value) => make_constant_field(value.clone()),
            Self::Field(field) => field.clone(),
        }
    }

    /// The value, evaluating a field that doesn't depend on inputs. Fields
    /// that do depend on inputs give the default value.
    pub fn as_value(&self) -> T {
        match self {
            Self::Value(value) => value.clone(),
            Self::Field(field) => evaluate_constant_field_typed(field),
        }
    }
}

impl<T: FieldValue> Default for ValueOrField<T> {
    fn default() -> Self {
        Self::Value(T::default())
    }
}

impl<T: FieldValue> From<T> for ValueOrField<T> {
    fn from(value: T) -> Self {
        Self::Value(value)
    }
}

impl<T: FieldValue> From<Field<T>> for ValueOrField<T> {
    fn from(field: Field<T>) -> Self {
        Self::Field(field)
    }
}
