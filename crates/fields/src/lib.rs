//! Lazily evaluated per-element expressions ("fields").
//!
//! A [`Field`] describes how to compute one value for every element of some
//! domain, e.g. "the position of each point" or "the index of each element
//! plus five". Fields are built by composing [`FieldInput`] leaves, whose
//! values come from a [`FieldContext`] at evaluation time, with
//! [`FieldOperation`]s that wrap a batched [`MultiFunction`].
//!
//! Nothing is computed while fields are built. When a set of fields is handed
//! to a [`FieldEvaluator`], the field graph is analyzed, split into the parts
//! that vary per element and the parts that are uniform for the concrete
//! inputs, lowered into [`Procedure`]s and executed over an [`IndexMask`].
//!
//! ```
//! use fields::{
//!     build, make_constant_field, DefaultFieldContext, ExecPreset, Field, FieldEvaluator,
//!     FieldOperation, IndexFieldInput, IndexMask,
//! };
//! use std::sync::Arc;
//!
//! let add = Arc::new(build::si2_so("add", |a: &i32, b: &i32| a + b, ExecPreset::AllSpanOrSingle));
//! let sum: Field<i32> = Field::new(FieldOperation::create(
//!     add,
//!     vec![make_constant_field(5).into(), IndexFieldInput::field().into()],
//! ));
//!
//! let context = DefaultFieldContext;
//! let mask = IndexMask::from_range(0..4);
//! let mut evaluator = FieldEvaluator::new(&context, &mask);
//! let index = evaluator.add(sum);
//! evaluator.evaluate();
//! assert_eq!(evaluator.get_evaluated_typed::<i32>(index).to_vec(), vec![5, 6, 7, 8]);
//! ```

pub mod config;
pub mod dynamic;
pub mod evaluate;
pub mod field;
pub mod hash;
pub mod index_mask;
pub mod multi_function;
pub mod procedure;
pub mod resource_scope;

mod utils;

pub use config::EvaluationConfig;
pub use dynamic::{
    FieldValue, GBuffer, GMutableSpan, GVArray, GVMutableArray, GVVectorArray, GValue,
    GVectorArray, MutableSpan, VArray, VMutableArray, VVectorArray, ValueType, VectorArray,
};
pub use evaluate::{
    evaluate_constant_field, evaluate_constant_field_typed, evaluate_fields, invert_bool_field,
    make_constant_field, make_constant_field_generic, make_field_constant_if_possible,
    FieldEvaluator,
};
pub use field::{
    DefaultFieldContext, Field, FieldConstant, FieldContext, FieldInput, FieldInputCategory,
    FieldInputs, FieldNode, FieldNodeKind, FieldNodeType, FieldOperation, GField, GFieldRef,
    IndexFieldInput, NamedFieldInput, ValueOrField,
};
pub use index_mask::IndexMask;
pub use multi_function::{
    build, call_auto, Context, DataType, ExecPreset, ExecutionHints, InterfaceType,
    MultiFunction, ParamCategory, ParamType, Params, ParamsBuilder, Signature, SignatureBuilder,
};
pub use procedure::{Procedure, ProcedureBuilder, ProcedureExecutor, ValidationError, VarId};
pub use resource_scope::ResourceScope;
