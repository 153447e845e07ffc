use super::{
    move_destructs_up, Instruction, Procedure, ProcedureBuilder, ProcedureExecutor,
    ValidationError, VarId,
};
use crate::{
    config::EvaluationConfig,
    dynamic::{FieldValue, GVectorArray},
    index_mask::IndexMask,
    multi_function::{
        build::{self, ConstantArray, GenericCopy},
        Context, DataType, ExecPreset, InterfaceType, MultiFunction, Params, ParamsBuilder,
        Signature, SignatureBuilder,
    },
    utils::test_logger,
};
use pretty_assertions::assert_eq;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

fn add() -> Arc<dyn MultiFunction> {
    Arc::new(build::si2_so(
        "add",
        |a: &i32, b: &i32| a + b,
        ExecPreset::AllSpanOrSingle,
    ))
}

fn mul() -> Arc<dyn MultiFunction> {
    Arc::new(build::si2_so(
        "mul",
        |a: &i32, b: &i32| a * b,
        ExecPreset::AllSpanOrSingle,
    ))
}

/// Computes quotient and remainder, counting how often the remainder was
/// actually requested.
struct DivRem {
    signature: Signature,
    remainders: AtomicUsize,
}

impl DivRem {
    fn new() -> Self {
        Self {
            signature: SignatureBuilder::new("divrem")
                .single_input::<i32>("a")
                .single_input::<i32>("b")
                .single_output::<i32>("quotient")
                .single_output::<i32>("remainder")
                .build(),
            remainders: AtomicUsize::new(0),
        }
    }
}

impl MultiFunction for DivRem {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, mask: &IndexMask, params: &mut Params<'_>, _context: &Context<'_>) {
        let a = params.readonly_single_input::<i32>(0);
        let b = params.readonly_single_input::<i32>(1);
        let mut quotient = params.single_output::<i32>(2);
        let remainder = params.single_output_if_required::<i32>(3);
        mask.foreach_index(|index| quotient[index] = a.get(index) / b.get(index));
        if let Some(mut remainder) = remainder {
            self.remainders.fetch_add(1, Ordering::Relaxed);
            mask.foreach_index(|index| remainder[index] = a.get(index) % b.get(index));
        }
    }
}

/// `(a + b) * a`
fn add_then_mul() -> Procedure {
    let mut builder = ProcedureBuilder::new();
    let a = builder.add_input_parameter(DataType::single::<i32>(), "a");
    let b = builder.add_input_parameter(DataType::single::<i32>(), "b");
    let sum = builder.add_call(add(), &[a, b])[0];
    let product = builder.add_call(mul(), &[sum, a])[0];
    builder.add_destructs(&[a, b, sum]);
    builder.add_output_parameter(product);
    builder.add_return();
    builder.finish()
}

fn run_add_then_mul(executor: &ProcedureExecutor, mask: &IndexMask, auto: bool) -> Vec<i32> {
    let len = mask.min_array_size();
    let mut result = vec![-1; len];
    let mut builder = ParamsBuilder::new(executor, mask);
    builder.add_readonly_single_input(
        crate::dynamic::VArray::from_func(len, |index| index as i32).into(),
    );
    builder.add_readonly_single_input_value(2);
    builder.add_single_output_slice(&mut result);
    if auto {
        executor.call_auto(mask, builder.params(), &Context::new());
    } else {
        executor.call(mask, &mut builder.params(), &Context::new());
    }
    drop(builder);
    result
}

#[test]
fn executes_over_masks() {
    test_logger();

    let executor = ProcedureExecutor::new(add_then_mul());
    assert_eq!(executor.param_count(), 3);
    assert_eq!(executor.signature().param_name(0), "a");

    let mask = IndexMask::from_indices(vec![1, 4, 5]);
    assert_eq!(
        run_add_then_mul(&executor, &mask, false),
        vec![-1, 3, -1, -1, 24, 35]
    );
    assert!(run_add_then_mul(&executor, &IndexMask::empty(), false).is_empty());
}

#[test]
fn auto_execution_splits_the_procedure() {
    let config = EvaluationConfig {
        min_parallel_size: 0,
        default_grain_size: 64,
        max_chunks: 5,
        ..EvaluationConfig::default()
    };
    let executor = ProcedureExecutor::new(add_then_mul()).with_config(config);
    assert!(executor.execution_hints().allocates_array);
    assert_eq!(executor.execution_hints().min_grain_size, 64);

    let mask = IndexMask::from_predicate(&IndexMask::from_size(1000), |index| index % 7 != 3);
    let result = run_add_then_mul(&executor, &mask, true);
    for (index, value) in result.into_iter().enumerate() {
        let expected = if mask.contains(index) {
            (index as i32 + 2) * index as i32
        } else {
            -1
        };
        assert_eq!(value, expected, "index {index}");
    }
}

#[test]
fn unused_outputs_are_skipped() {
    let divrem = Arc::new(DivRem::new());
    let mut builder = ProcedureBuilder::new();
    let a = builder.add_input_parameter(DataType::single::<i32>(), "a");
    let b = builder.add_input_parameter(DataType::single::<i32>(), "b");
    let quotient = builder.new_variable(DataType::single::<i32>(), "quotient");
    builder.add_call_with_all_variables(
        divrem.clone(),
        vec![Some(a), Some(b), Some(quotient), None],
    );
    builder.add_destructs(&[a, b]);
    builder.add_output_parameter(quotient);
    builder.add_return();
    let executor = ProcedureExecutor::new(builder.finish());

    let mask = IndexMask::from_size(3);
    let mut result = vec![0; 3];
    let mut params = ParamsBuilder::new(&executor, &mask);
    params.add_readonly_single_input(crate::dynamic::VArray::from_vec(vec![7, 8, 9]).into());
    params.add_readonly_single_input_value(2);
    params.add_single_output_slice(&mut result);
    executor.call(&mask, &mut params.params(), &Context::new());
    drop(params);

    assert_eq!(result, vec![3, 4, 4]);
    assert_eq!(divrem.remainders.load(Ordering::Relaxed), 0);
}

#[test]
fn copied_and_mutable_outputs() {
    let double: Arc<dyn MultiFunction> =
        Arc::new(build::sm("double", |value: &mut i32| *value *= 2));
    let mut builder = ProcedureBuilder::new();
    let value = builder.new_variable(DataType::single::<i32>(), "value");
    builder.add_parameter(InterfaceType::Mutable, value);
    let a = builder.add_input_parameter(DataType::single::<i32>(), "a");
    builder.add_call(double, &[value]);
    let sum = builder.add_call(add(), &[value, a])[0];
    let copy = builder.add_call(Arc::new(GenericCopy::new(DataType::single::<i32>())), &[sum])[0];
    builder.add_destruct(a);
    builder.add_output_parameter(sum);
    builder.add_output_parameter(copy);
    builder.add_return();
    let executor = ProcedureExecutor::new(builder.finish());

    let mask = IndexMask::from_range(1..3);
    let mut values = vec![1, 2, 3];
    let mut sums = vec![0; 3];
    let mut copies = vec![0; 3];
    let mut params = ParamsBuilder::new(&executor, &mask);
    params.add_single_mutable(crate::dynamic::GMutableSpan::new(values.as_mut_slice()));
    params.add_readonly_single_input_value(10);
    params.add_single_output_slice(&mut sums);
    params.add_single_output_slice(&mut copies);
    executor.call(&mask, &mut params.params(), &Context::new());
    drop(params);

    assert_eq!(values, vec![1, 4, 6]);
    assert_eq!(sums, vec![0, 14, 16]);
    assert_eq!(copies, sums);
}

#[test]
fn vector_variables() {
    let mut builder = ProcedureBuilder::new();
    let array = builder.add_call(Arc::new(ConstantArray::new(vec![1u8, 2, 3])), &[])[0];
    let copy = builder.add_call(Arc::new(GenericCopy::new(DataType::vector::<u8>())), &[array])[0];
    builder.add_destruct(array);
    builder.add_output_parameter(copy);
    builder.add_return();
    let executor = ProcedureExecutor::new(builder.finish());
    assert_eq!(executor.output_type(0), DataType::vector::<u8>());

    let mask = IndexMask::from_indices(vec![0, 2]);
    let mut vectors = GVectorArray::new(u8::value_type(), 3);
    let mut params = ParamsBuilder::new(&executor, &mask);
    params.add_vector_output(&mut vectors);
    executor.call_auto(&mask, params.params(), &Context::new());
    drop(params);

    let vectors = vectors.typed::<u8>();
    assert_eq!(vectors.get(0), &[1, 2, 3]);
    assert!(vectors.get(1).is_empty());
    assert_eq!(vectors.get(2), &[1, 2, 3]);
}

#[test]
fn destructs_move_behind_last_use() {
    let mut procedure = add_then_mul();
    move_destructs_up(&mut procedure);
    assert_eq!(procedure.validate(), Ok(()));

    let [a, b, sum, product] = [0, 1, 2, 3].map(VarId::new);
    let order: Vec<String> = procedure
        .instructions()
        .iter()
        .map(|instruction| match instruction {
            Instruction::Call(call) => call.function().debug_name(),
            Instruction::Destruct(var) => format!("destruct {var}"),
            Instruction::Return => "return".to_owned(),
        })
        .collect();
    assert_eq!(
        order,
        vec![
            "add".to_owned(),
            format!("destruct {b}"),
            "mul".to_owned(),
            format!("destruct {a}"),
            format!("destruct {sum}"),
            "return".to_owned(),
        ]
    );
    assert!(!procedure.instructions()[5].uses(product));
}

#[test]
fn unused_inputs_are_destructed_first() {
    let mut builder = ProcedureBuilder::new();
    let unused = builder.add_input_parameter(DataType::single::<f32>(), "unused");
    let value = builder.add_call(Arc::new(build::Constant::new(1.5f32)), &[])[0];
    builder.add_destruct(unused);
    builder.add_output_parameter(value);
    builder.add_return();
    let mut procedure = builder.finish();
    move_destructs_up(&mut procedure);

    assert!(matches!(procedure.instructions()[0], Instruction::Destruct(var) if var == unused));
    assert_eq!(procedure.validate(), Ok(()));
}

#[test]
fn long_chains_with_trailing_destructs() {
    test_logger();

    const LENGTH: usize = 20_001;
    let negate: Arc<dyn MultiFunction> =
        Arc::new(build::si1_so("negate", |a: &i32| -a, ExecPreset::Simple));

    let mut builder = ProcedureBuilder::new();
    let mut var = builder.add_input_parameter(DataType::single::<i32>(), "x");
    let mut intermediate = Vec::with_capacity(LENGTH);
    for _ in 0..LENGTH {
        intermediate.push(var);
        var = builder.add_call(negate.clone(), &[var])[0];
    }
    builder.add_destructs(&intermediate);
    builder.add_output_parameter(var);
    builder.add_return();
    let mut procedure = builder.finish();
    move_destructs_up(&mut procedure);
    assert_eq!(procedure.validate(), Ok(()));

    // Every variable is destructed right behind the call that reads it
    let instructions = procedure.instructions();
    assert!(matches!(instructions[0], Instruction::Call(_)));
    assert!(matches!(instructions[1], Instruction::Destruct(first) if first == intermediate[0]));
    assert!(matches!(
        instructions[2 * LENGTH - 1],
        Instruction::Destruct(last) if last == intermediate[LENGTH - 1]
    ));

    let executor = ProcedureExecutor::new(procedure);
    let mask = IndexMask::from_indices(vec![0, 2, 3, 6]);
    let mut result = vec![0; 7];
    let mut params = ParamsBuilder::new(&executor, &mask);
    params.add_readonly_single_input(
        crate::dynamic::VArray::from_func(7, |index| index as i32 + 1).into(),
    );
    params.add_single_output_slice(&mut result);
    executor.call(&mask, &mut params.params(), &Context::new());
    drop(params);
    assert_eq!(result, vec![-1, 0, -3, -4, 0, 0, -7]);
}

#[test]
fn validation_errors() {
    let int = DataType::single::<i32>();

    let mut builder = ProcedureBuilder::new();
    let a = builder.add_input_parameter(int, "a");
    builder.add_destruct(a);
    assert_eq!(
        builder.procedure().validate(),
        Err(ValidationError::MissingReturn)
    );
    builder.add_return();
    builder.add_destruct(a);
    assert_eq!(
        builder.procedure().validate(),
        Err(ValidationError::InstructionAfterReturn { instruction: 2 })
    );

    // Inputs that are never destructed leak
    let mut builder = ProcedureBuilder::new();
    let a = builder.add_input_parameter(int, "a");
    builder.add_return();
    assert_eq!(
        builder.finish().validate(),
        Err(ValidationError::LeakedOnReturn { var: a })
    );

    let mut builder = ProcedureBuilder::new();
    let a = builder.add_input_parameter(int, "a");
    let uninitialized = builder.new_variable(int, "b");
    let sum = builder.add_call(add(), &[a, uninitialized])[0];
    builder.add_destructs(&[a, sum]);
    builder.add_return();
    assert_eq!(
        builder.finish().validate(),
        Err(ValidationError::UninitializedRead {
            instruction: 0,
            var: uninitialized
        })
    );

    let mut builder = ProcedureBuilder::new();
    let output = builder.new_variable(int, "output");
    builder.add_output_parameter(output);
    builder.add_return();
    assert_eq!(
        builder.finish().validate(),
        Err(ValidationError::UninitializedOnReturn { var: output })
    );

    let mut builder = ProcedureBuilder::new();
    let a = builder.add_input_parameter(int, "a");
    builder.add_destruct(a);
    builder.add_destruct(a);
    builder.add_return();
    assert_eq!(
        builder.finish().validate(),
        Err(ValidationError::UninitializedDestruct {
            instruction: 1,
            var: a
        })
    );

    let mut builder = ProcedureBuilder::new();
    let a = builder.add_input_parameter(int, "a");
    builder.add_output_parameter(a);
    builder.add_return();
    assert_eq!(
        builder.finish().validate(),
        Err(ValidationError::DuplicateParameter { var: a })
    );
}

#[test]
fn call_binding_errors() {
    let int = DataType::single::<i32>();
    let divrem: Arc<dyn MultiFunction> = Arc::new(DivRem::new());

    let mut builder = ProcedureBuilder::new();
    let a = builder.add_input_parameter(int, "a");
    builder.add_call_with_all_variables(divrem.clone(), vec![Some(a), Some(a), Some(a), None]);
    builder.add_return();
    assert_eq!(
        builder.finish().validate(),
        Err(ValidationError::AliasedOutput {
            instruction: 0,
            var: a
        })
    );

    let mut builder = ProcedureBuilder::new();
    let a = builder.add_input_parameter(int, "a");
    let quotient = builder.new_variable(int, "q");
    builder.add_call_with_all_variables(divrem.clone(), vec![Some(a), None, Some(quotient), None]);
    builder.add_return();
    assert_eq!(
        builder.finish().validate(),
        Err(ValidationError::MissingParameter {
            instruction: 0,
            function: "divrem".to_owned(),
            param: 1
        })
    );

    let mut builder = ProcedureBuilder::new();
    let a = builder.add_input_parameter(int, "a");
    let float = builder.add_input_parameter(DataType::single::<f32>(), "f");
    let quotient = builder.new_variable(int, "q");
    builder.add_call_with_all_variables(divrem, vec![Some(a), Some(float), Some(quotient), None]);
    builder.add_return();
    let error = builder.finish().validate().unwrap_err();
    assert!(matches!(error, ValidationError::TypeMismatch { param: 1, .. }));
    assert_eq!(
        error.to_string(),
        format!("variable {float} has type f32 but parameter 1 of call 0 expects i32")
    );
}

#[test]
fn listings() {
    let procedure = add_then_mul();
    let listing = procedure.to_string();
    assert!(listing.starts_with("procedure(in v0 \"a\": i32, in v1 \"b\": i32, out v3 \"result\": i32)"));
    assert!(listing.contains("call add(in v0, in v1, out v2)"));
    assert!(listing.contains("destruct v2"));

    let dot = procedure.to_dot();
    assert!(dot.starts_with("digraph procedure {"));
    assert!(dot.contains("i0 -> i1;"));
    assert!(dot.contains("label=\"call mul(in v2, in v0, out v3)\""));
}
