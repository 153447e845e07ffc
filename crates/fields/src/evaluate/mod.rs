//! Evaluation of fields.
//!
//! [`evaluate_fields`] analyzes the graph behind the requested fields,
//! splits it into the fields that vary between indices and the fields that
//! don't for the inputs the context provides, and lowers both parts into a
//! procedure. The varying procedure runs over the whole mask, the constant
//! one over a single index, with the result repeated for every index.

mod analysis;
mod evaluator;
mod lowering;

#[cfg(test)]
mod tests;

pub use evaluator::FieldEvaluator;

use self::{
    analysis::{find_varying_fields, get_field_context_inputs, preprocess_field_tree},
    lowering::build_procedure_for_fields,
};
use crate::{
    config::EvaluationConfig,
    dynamic::{FieldValue, GBuffer, GMutableSpan, GVArray, GVMutableArray, GValue},
    field::{
        DefaultFieldContext, Field, FieldConstant, FieldContext, FieldNodeKind, FieldOperation,
        GField, GFieldRef,
    },
    hash::HashMap,
    index_mask::IndexMask,
    multi_function::{build, Context, ExecPreset, MultiFunction, ParamsBuilder},
    procedure::ProcedureExecutor,
    resource_scope::ResourceScope,
};
use itertools::Itertools;
use once_cell::sync::Lazy;
use std::{slice, sync::Arc};

/// Evaluates `fields_to_evaluate` at the indices in `mask`.
///
/// `dst_varrays` is either empty or has one entry per field. Fields with a
/// destination are written into it at the indices in `mask`; destinations
/// backed by a span are written by the procedure directly. The returned
/// arrays have at least `mask.min_array_size()` elements and are only
/// valid at the indices in `mask`.
#[tracing::instrument(skip_all, fields(fields = fields_to_evaluate.len(), indices = mask.len()))]
pub fn evaluate_fields(
    scope: &ResourceScope,
    fields_to_evaluate: &[GField],
    mask: &IndexMask,
    context: &dyn FieldContext,
    dst_varrays: &mut [Option<GVMutableArray<'_>>],
    config: &EvaluationConfig,
) -> Vec<GVArray> {
    debug_assert!(dst_varrays.is_empty() || dst_varrays.len() == fields_to_evaluate.len());

    if mask.is_empty() {
        return fields_to_evaluate
            .iter()
            .map(|field| GVArray::for_empty(field.value_type()))
            .collect();
    }

    let array_size = mask.min_array_size();
    let info = preprocess_field_tree(fields_to_evaluate.iter().map(GField::field_ref));
    let context_inputs = get_field_context_inputs(scope, mask, context, &info);
    let varying = find_varying_fields(&info, &context_inputs);

    let mut results: Vec<Option<GVArray>> = vec![None; fields_to_evaluate.len()];
    let mut written = vec![false; fields_to_evaluate.len()];

    let mut varying_fields: Vec<GFieldRef<'_>> = Vec::new();
    let mut varying_indices = Vec::new();
    let mut constant_fields: Vec<GFieldRef<'_>> = Vec::new();
    let mut constant_indices = Vec::new();

    for (out, field) in fields_to_evaluate.iter().enumerate() {
        let field = field.field_ref();
        match field.node().kind() {
            FieldNodeKind::Input(_) => {
                results[out] = info
                    .deduplicated_field_inputs
                    .get_index_of(&field)
                    .map(|index| context_inputs[index].clone());
            }
            FieldNodeKind::Constant(constant) => {
                results[out] = Some(GVArray::for_single(constant.value(), array_size));
            }
            FieldNodeKind::Operation(_) if varying.contains(&field) => {
                varying_fields.push(field);
                varying_indices.push(out);
            }
            FieldNodeKind::Operation(_) => {
                constant_fields.push(field);
                constant_indices.push(out);
            }
        }
    }

    tracing::debug!(
        inputs = context_inputs.len(),
        varying = varying_fields.len(),
        constant = constant_fields.len(),
        "partitioned fields"
    );

    if !varying_fields.is_empty() {
        let procedure = build_procedure_for_fields(&info, &varying_fields);
        let executor = ProcedureExecutor::new(procedure).with_config(config.clone());

        // Outputs with a span destination are written in place
        let mut dst_spans: HashMap<usize, GMutableSpan<'_>> = dst_varrays
            .iter_mut()
            .enumerate()
            .filter(|(out, _)| varying_indices.contains(out))
            .filter_map(|(out, dst)| Some((out, dst.as_mut()?.span_mut()?)))
            .collect();
        let mut buffers: Vec<Option<GBuffer>> = varying_fields
            .iter()
            .zip_eq(&varying_indices)
            .map(|(field, out)| {
                (!dst_spans.contains_key(out)).then(|| {
                    let offset = mask.first().unwrap_or(0);
                    GBuffer::new(field.value_type(), offset, array_size - offset)
                })
            })
            .collect();

        {
            let mut builder = ParamsBuilder::new(&executor, mask);
            for varray in &context_inputs {
                builder.add_readonly_single_input(varray.clone());
            }
            for (out, buffer) in varying_indices.iter().zip_eq(&mut buffers) {
                match (dst_spans.remove(out), buffer) {
                    (Some(span), _) => builder.add_single_output(span),
                    (None, Some(buffer)) => builder.add_single_output(buffer.as_mutable_span()),
                    (None, None) => unreachable!("output {out} has no storage"),
                }
            }
            executor.call_auto(mask, builder.params(), &Context::new());
        }
        drop(dst_spans);

        for (&out, buffer) in varying_indices.iter().zip_eq(buffers) {
            results[out] = match buffer {
                Some(buffer) => Some(buffer.into_varray()),
                None => {
                    written[out] = true;
                    dst_varrays[out].as_ref().map(GVMutableArray::read)
                }
            };
        }
    }

    if !constant_fields.is_empty() {
        let procedure = build_procedure_for_fields(&info, &constant_fields);
        let executor = ProcedureExecutor::new(procedure).with_config(config.clone());
        let single_mask = IndexMask::from_size(1);

        let mut buffers: Vec<GBuffer> = constant_fields
            .iter()
            .map(|field| GBuffer::new(field.value_type(), 0, 1))
            .collect();
        {
            let mut builder = ParamsBuilder::new(&executor, &single_mask);
            for varray in &context_inputs {
                builder.add_readonly_single_input(varray.clone());
            }
            for buffer in &mut buffers {
                builder.add_single_output(buffer.as_mutable_span());
            }
            executor.call(&single_mask, &mut builder.params(), &Context::new());
        }

        for (&out, buffer) in constant_indices.iter().zip_eq(&buffers) {
            results[out] = Some(GVArray::for_single(&buffer.get(0), array_size));
        }
    }

    let results: Vec<GVArray> = results
        .into_iter()
        .zip_eq(fields_to_evaluate)
        .map(|(varray, field)| {
            varray.unwrap_or_else(|| GVArray::for_single_default(field.value_type(), array_size))
        })
        .collect();

    for (out, dst) in dst_varrays.iter_mut().enumerate() {
        if let Some(dst) = dst {
            if !written[out] {
                dst.set_from(&results[out], mask);
            }
        }
    }

    results
}

/// The value of a field that doesn't depend on any input. Fields that do
/// depend on inputs give the default value of their type.
pub fn evaluate_constant_field(field: &GField) -> GValue {
    if field.depends_on_input() {
        return field.value_type().default_value();
    }
    if let Some(constant) = field.node().as_constant() {
        return constant.value().clone();
    }

    let scope = ResourceScope::new();
    let varrays = evaluate_fields(
        &scope,
        slice::from_ref(field),
        &IndexMask::from_size(1),
        &DefaultFieldContext,
        &mut [],
        &EvaluationConfig::single_threaded(),
    );
    varrays[0].get(0)
}

pub fn evaluate_constant_field_typed<T: FieldValue>(field: &Field<T>) -> T {
    evaluate_constant_field(field).typed::<T>().clone()
}

/// Replaces a field that doesn't depend on any input by a constant.
pub fn make_field_constant_if_possible(field: GField) -> GField {
    if field.depends_on_input() || field.node().as_constant().is_some() {
        return field;
    }
    FieldConstant::create(evaluate_constant_field(&field))
}

pub fn make_constant_field<T: FieldValue>(value: T) -> Field<T> {
    Field::new(FieldConstant::create(GValue::new(value)))
}

pub fn make_constant_field_generic(value: GValue) -> GField {
    FieldConstant::create(value)
}

static NOT: Lazy<Arc<dyn MultiFunction>> = Lazy::new(|| {
    let not = build::si1_so("Not", |value: &bool| !value, ExecPreset::AllSpanOrSingle);
    Arc::new(not)
});

/// The logical negation of `field`. All negations share one function, so
/// negating equal fields gives equal fields.
pub fn invert_bool_field(field: &Field<bool>) -> Field<bool> {
    Field::new(FieldOperation::create(NOT.clone(), vec![GField::clone(field)]))
}
