use super::{
    analysis::{find_varying_fields, get_field_context_inputs, preprocess_field_tree},
    evaluate_constant_field, evaluate_constant_field_typed, evaluate_fields, invert_bool_field,
    lowering::build_procedure_for_fields,
    make_constant_field, make_field_constant_if_possible, FieldEvaluator,
};
use crate::{
    config::EvaluationConfig,
    dynamic::{AsAny, FieldValue, GVArray, GVMutableArray, GValue, VArray, VMutableArray},
    field::{
        DefaultFieldContext, Field, FieldContext, FieldInput, FieldNodeType, FieldOperation,
        GField, IndexFieldInput, NamedFieldInput,
    },
    hash::{default_hash, HashMap},
    index_mask::IndexMask,
    multi_function::{
        build::{self, GenericCopy},
        Context, ExecPreset, ExecutionHints, InterfaceType, MultiFunction, Params, Signature,
        SignatureBuilder,
    },
    procedure::Instruction,
    resource_scope::ResourceScope,
    utils::test_logger,
};
use pretty_assertions::assert_eq;
use proptest::{collection::btree_set, prelude::*};
use std::sync::{
    atomic::{AtomicIsize, AtomicUsize, Ordering},
    Arc,
};

/// Wraps a function and records how often and over how many indices it
/// was called.
struct Counted {
    inner: Box<dyn MultiFunction>,
    calls: AtomicUsize,
    indices: AtomicUsize,
}

impl Counted {
    fn new(inner: impl MultiFunction) -> Arc<Self> {
        Arc::new(Self {
            inner: Box::new(inner),
            calls: AtomicUsize::new(0),
            indices: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn indices(&self) -> usize {
        self.indices.load(Ordering::Relaxed)
    }
}

impl MultiFunction for Counted {
    fn signature(&self) -> &Signature {
        self.inner.signature()
    }

    fn call(&self, mask: &IndexMask, params: &mut Params<'_>, context: &Context<'_>) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.indices.fetch_add(mask.len(), Ordering::Relaxed);
        self.inner.call(mask, params, context);
    }

    fn execution_hints(&self) -> ExecutionHints {
        self.inner.execution_hints()
    }
}

fn add() -> Arc<dyn MultiFunction> {
    Arc::new(build::si2_so(
        "add",
        |a: &i32, b: &i32| a + b,
        ExecPreset::AllSpanOrSingle,
    ))
}

fn mul() -> Arc<dyn MultiFunction> {
    Arc::new(build::si2_so("mul", |a: &i32, b: &i32| a * b, ExecPreset::Simple))
}

fn op(function: &Arc<dyn MultiFunction>, inputs: Vec<GField>) -> Field<i32> {
    Field::new(FieldOperation::create(function.clone(), inputs))
}

fn index() -> GField {
    IndexFieldInput::field().into()
}

fn constant(value: i32) -> GField {
    make_constant_field(value).into()
}

/// Provides named attributes and registers a destruct call for every
/// attribute it hands out.
#[derive(Default)]
struct AttributeContext {
    attributes: HashMap<String, GVArray>,
    lookups: AtomicUsize,
    released: Arc<AtomicUsize>,
}

impl AttributeContext {
    fn with(mut self, name: &str, varray: impl Into<GVArray>) -> Self {
        self.attributes.insert(name.to_owned(), varray.into());
        self
    }
}

impl FieldContext for AttributeContext {
    fn get_varray_for_input(
        &self,
        input: &dyn FieldInput,
        mask: &IndexMask,
        scope: &ResourceScope,
    ) -> Option<GVArray> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let Some(named) = input.as_any().downcast_ref::<NamedFieldInput>() else {
            return input.get_varray_for_context(self, mask, scope);
        };
        let varray = self.attributes.get(named.name())?.clone();
        let released = self.released.clone();
        scope.add_destruct_call(move || {
            released.fetch_add(1, Ordering::Relaxed);
        });
        Some(varray)
    }
}

fn evaluate_one<T: FieldValue>(
    field: &Field<T>,
    context: &dyn FieldContext,
    mask: &IndexMask,
) -> VArray<T> {
    let mut evaluator = FieldEvaluator::new(context, mask);
    let index = evaluator.add(field.clone());
    evaluator.evaluate();
    evaluator.get_evaluated_typed(index)
}

#[test]
fn adds_a_constant_to_the_index() {
    test_logger();

    let add = add();
    let build = || op(&add, vec![constant(5), index()]);
    let first = build();
    let second = build();

    let mask = IndexMask::from_range(0..4);
    let context = DefaultFieldContext;
    assert_eq!(evaluate_one(&first, &context, &mask).to_vec(), vec![5, 6, 7, 8]);
    assert_eq!(evaluate_one(&second, &context, &mask).to_vec(), vec![5, 6, 7, 8]);
    assert_eq!(first, second);
}

#[test]
fn constant_operations_run_once() {
    test_logger();

    let multiply = Counted::new(build::si2_so(
        "multiply",
        |a: &i32, b: &i32| a * b,
        ExecPreset::Simple,
    ));
    let function: Arc<dyn MultiFunction> = multiply.clone();
    let product = op(&function, vec![constant(2), constant(3)]);

    let scope = ResourceScope::new();
    let mask = IndexMask::from_size(1000);
    let info = preprocess_field_tree([product.field_ref()]);
    let inputs = get_field_context_inputs(&scope, &mask, &DefaultFieldContext, &info);
    assert!(find_varying_fields(&info, &inputs).is_empty());

    let result = evaluate_one(&product, &DefaultFieldContext, &mask);
    assert_eq!(multiply.calls(), 1);
    assert_eq!(multiply.indices(), 1);
    assert_eq!(result.len(), 1000);
    assert_eq!(result.get_internal_single(), Some(&6));
}

#[test]
fn equal_inputs_are_requested_once() {
    test_logger();

    let add = add();
    let double = op(&add, vec![index(), index()]);
    let context = AttributeContext::default();
    let mask = IndexMask::from_range(0..5);

    assert_eq!(
        evaluate_one(&double, &context, &mask).to_vec(),
        vec![0, 2, 4, 6, 8]
    );
    assert_eq!(context.lookups.load(Ordering::Relaxed), 1);
}

#[test]
fn uniform_inputs_keep_fields_constant() {
    test_logger();

    let scale = Counted::new(build::si2_so(
        "scale",
        |a: &i32, b: &i32| a * b,
        ExecPreset::Simple,
    ));
    let function: Arc<dyn MultiFunction> = scale.clone();
    let radius = NamedFieldInput::field::<i32>("radius");
    let scaled = op(&function, vec![radius.into(), constant(2)]);
    let mask = IndexMask::from_size(100);

    let uniform = AttributeContext::default().with("radius", VArray::for_single(4, 100));
    let result = evaluate_one(&scaled, &uniform, &mask);
    assert_eq!(result.get_internal_single(), Some(&8));
    assert_eq!(scale.indices(), 1);

    let varying =
        AttributeContext::default().with("radius", VArray::from_func(100, |index| index as i32));
    let result = evaluate_one(&scaled, &varying, &mask);
    assert!(!result.is_single());
    assert_eq!(result.get(42), 84);
    assert_eq!(scale.indices(), 101);
}

#[test]
fn missing_inputs_use_default_values() {
    let add = add();
    let field = op(
        &add,
        vec![NamedFieldInput::field::<i32>("missing").into(), constant(1)],
    );
    let result = evaluate_one(&field, &DefaultFieldContext, &IndexMask::from_size(10));
    assert_eq!(result.get_internal_single(), Some(&1));
}

#[test]
fn empty_masks_give_empty_arrays() {
    let scope = ResourceScope::new();
    let fields = [
        GField::from(op(&add(), vec![index(), constant(1)])),
        GField::from(make_constant_field(1.5f32)),
    ];
    let results = evaluate_fields(
        &scope,
        &fields,
        &IndexMask::empty(),
        &DefaultFieldContext,
        &mut [],
        &EvaluationConfig::default(),
    );
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(GVArray::is_empty));
    assert!(results[1].value_type() == f32::value_type());
}

#[test]
fn inputs_and_constants_are_returned_directly() {
    let scope = ResourceScope::new();
    let fields = [index(), constant(7)];
    let results = evaluate_fields(
        &scope,
        &fields,
        &IndexMask::from_indices(vec![2, 5]),
        &DefaultFieldContext,
        &mut [],
        &EvaluationConfig::default(),
    );
    assert_eq!(results[0].len(), 6);
    assert_eq!(*results[0].get(5).typed::<i32>(), 5);
    assert_eq!(results[1].get_internal_single(), Some(GValue::new(7)));
    assert_eq!(results[1].len(), 6);
}

#[test]
fn destinations_receive_the_results() {
    test_logger();

    struct Recorder(Vec<(usize, i32)>);

    impl VMutableArray<i32> for Recorder {
        fn len(&self) -> usize {
            8
        }

        fn get(&self, index: usize) -> i32 {
            self.0
                .iter()
                .rev()
                .find(|(i, _)| *i == index)
                .map_or(0, |(_, value)| *value)
        }

        fn set(&mut self, index: usize, value: i32) {
            self.0.push((index, value));
        }
    }

    let add = add();
    let mul = mul();
    let varying = op(&add, vec![index(), constant(10)]);
    let constant_sum = op(&mul, vec![constant(3), constant(4)]);
    let mask = IndexMask::from_indices(vec![1, 3, 4, 7]);
    let context = DefaultFieldContext;

    let mut span_dst = vec![-1; 8];
    let mut constant_dst = vec![-1; 8];
    let mut input_dst = vec![-1; 8];
    let mut recorder = Recorder(Vec::new());

    let mut evaluator = FieldEvaluator::new(&context, &mask);
    let plain = evaluator.add(varying.clone());
    let in_span = evaluator.add_with_destination_slice(varying.clone(), &mut span_dst);
    let in_virtual = evaluator.add_with_destination(
        varying.clone(),
        GVMutableArray::from_virtual::<i32>(&mut recorder),
    );
    let in_constant = evaluator.add_with_destination_slice(constant_sum, &mut constant_dst);
    let in_input = evaluator.add_with_destination_slice(IndexFieldInput::field(), &mut input_dst);
    evaluator.evaluate();

    let expected = evaluator.get_evaluated_typed::<i32>(plain);
    let result = |index| evaluator.get_evaluated_typed::<i32>(index);
    for index in &mask {
        assert_eq!(result(in_span).get(index), expected.get(index));
        assert_eq!(result(in_virtual).get(index), expected.get(index));
        assert_eq!(result(in_constant).get(index), 12);
        assert_eq!(result(in_input).get(index), index as i32);
    }
    drop(evaluator);

    assert_eq!(span_dst, vec![-1, 11, -1, 13, 14, -1, -1, 17]);
    assert_eq!(constant_dst, vec![-1, 12, -1, 12, 12, -1, -1, 12]);
    assert_eq!(input_dst, vec![-1, 1, -1, 3, 4, -1, -1, 7]);
    assert_eq!(recorder.0, vec![(1, 11), (3, 13), (4, 14), (7, 17)]);
}

#[test]
fn selection_restricts_the_evaluation() {
    test_logger();

    let is_multiple = build::si1_so("multiple of 3", |i: &i32| i % 3 == 0, ExecPreset::Simple);
    let selection = Field::new(FieldOperation::create(Arc::new(is_multiple), vec![index()]));
    let double = Counted::new(build::si1_so("double", |i: &i32| i * 2, ExecPreset::Simple));
    let function: Arc<dyn MultiFunction> = double.clone();
    let doubled = op(&function, vec![index()]);

    let context = DefaultFieldContext;
    let mask = IndexMask::from_range(5..30);
    let mut evaluator = FieldEvaluator::new(&context, &mask);
    evaluator.set_selection(selection);
    let result = evaluator.add(doubled);
    evaluator.evaluate();

    let selected = evaluator.get_evaluated_selection_as_mask();
    assert_eq!(selected.to_vec(), vec![6, 9, 12, 15, 18, 21, 24, 27]);
    assert_eq!(double.indices(), selected.len());
    let result = evaluator.get_evaluated_typed::<i32>(result);
    assert!(selected.iter().all(|index| result.get(index) == 2 * index as i32));
}

#[test]
fn boolean_results_as_masks() {
    let is_even = Arc::new(build::si1_so("even", |i: &i32| i % 2 == 0, ExecPreset::Simple));
    let even: Field<bool> = Field::new(FieldOperation::create(is_even, vec![index()]));
    let context = DefaultFieldContext;
    let mask = IndexMask::from_indices(vec![1, 2, 3, 4, 8]);

    let mut evaluator = FieldEvaluator::new(&context, &mask);
    let varying = evaluator.add(even.clone());
    let odd = evaluator.add(invert_bool_field(&even));
    let always = evaluator.add(make_constant_field(true));
    let never = evaluator.add(make_constant_field(false));
    evaluator.evaluate();

    assert_eq!(evaluator.get_evaluated_as_mask(varying).to_vec(), vec![2, 4, 8]);
    assert_eq!(evaluator.get_evaluated_as_mask(odd).to_vec(), vec![1, 3]);
    assert_eq!(evaluator.get_evaluated_as_mask(always), IndexMask::from_size(9));
    assert!(evaluator.get_evaluated_as_mask(never).is_empty());
}

#[test]
fn negations_are_shared() {
    let flag = NamedFieldInput::field::<bool>("flag");
    assert_eq!(invert_bool_field(&flag), invert_bool_field(&flag));
    assert!(evaluate_constant_field_typed(&invert_bool_field(
        &make_constant_field(false)
    )));
}

#[test]
fn constant_fields_are_folded() {
    let add = add();
    let sum = op(&add, vec![constant(2), constant(40)]);
    let folded = make_field_constant_if_possible(sum.into_inner());
    assert_eq!(folded.node_type(), FieldNodeType::Constant);
    assert_eq!(*folded.node().as_constant().unwrap().value(), GValue::new(42));

    let varying = GField::from(op(&add, vec![index(), constant(1)]));
    let kept = make_field_constant_if_possible(varying.clone());
    assert!(Arc::ptr_eq(kept.node(), varying.node()));
    assert_eq!(*evaluate_constant_field(&varying).typed::<i32>(), 0);
}

#[test]
#[should_panic(expected = "fields can only be evaluated once")]
fn evaluating_twice_panics() {
    let context = DefaultFieldContext;
    let mut evaluator = FieldEvaluator::for_size(&context, 4);
    evaluator.add(IndexFieldInput::field());
    evaluator.evaluate();
    evaluator.evaluate();
}

/// Two outputs, the second of which is rarely needed.
struct DivRem {
    signature: Signature,
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
            mask.foreach_index(|index| remainder[index] = a.get(index) % b.get(index));
        }
    }
}

#[test]
fn lowering() {
    test_logger();

    let add = add();
    let divrem = FieldOperation::create_node(Arc::new(DivRem::new()), vec![index(), constant(3)]);
    let quotient = GField::new(divrem.clone(), 0);
    let sum = GField::from(op(&add, vec![quotient.clone(), index()]));
    // Requested twice, and a separately built copy of the same field
    let same_sum = GField::from(op(&add, vec![quotient, index()]));
    let outputs = [sum.clone(), sum, same_sum];

    let info = preprocess_field_tree(outputs.iter().map(GField::field_ref));
    assert_eq!(info.deduplicated_field_inputs.len(), 1);
    let output_refs: Vec<_> = outputs.iter().map(GField::field_ref).collect();
    let procedure = build_procedure_for_fields(&info, &output_refs);

    let interfaces: Vec<InterfaceType> = procedure
        .params()
        .iter()
        .map(|param| param.interface)
        .collect();
    assert_eq!(
        interfaces,
        vec![
            InterfaceType::Input,
            InterfaceType::Output,
            InterfaceType::Output,
            InterfaceType::Output
        ]
    );
    let names: Vec<String> = procedure.calls().map(|call| call.function().debug_name()).collect();
    assert_eq!(names, vec!["3", "divrem", "add", "Copy", "Copy"]);

    // The remainder is never used
    let divrem_call = procedure.calls().nth(1).unwrap();
    assert_eq!(divrem_call.params()[3], None);

    let copies = procedure
        .calls()
        .filter(|call| (**call.function()).as_any().is::<GenericCopy>())
        .count();
    assert_eq!(copies, 2);
    assert!(matches!(procedure.instructions().last(), Some(Instruction::Return)));
    procedure.validate().unwrap();

    let scope = ResourceScope::new();
    let results = evaluate_fields(
        &scope,
        &outputs,
        &IndexMask::from_size(7),
        &DefaultFieldContext,
        &mut [],
        &EvaluationConfig::default(),
    );
    let expected = vec![0, 1, 2, 4, 5, 6, 8];
    for result in results {
        assert_eq!(result.typed::<i32>().to_vec(), expected);
    }
}

static LIVE: AtomicIsize = AtomicIsize::new(0);

/// Counts living instances.
#[derive(Debug, PartialEq)]
struct Tracked(i64);

impl Tracked {
    fn new(value: i64) -> Self {
        LIVE.fetch_add(1, Ordering::SeqCst);
        Self(value)
    }
}

impl Default for Tracked {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Clone for Tracked {
    fn clone(&self) -> Self {
        Self::new(self.0)
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        LIVE.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FieldValue for Tracked {
    fn hash_value(&self) -> u64 {
        default_hash(&self.0)
    }
}

#[test]
fn every_value_is_dropped_once() {
    test_logger();

    {
        let make = build::si1_so("make", |i: &i32| Tracked::new(*i as i64), ExecPreset::Simple);
        let grow = build::si2_so(
            "grow",
            |a: &Tracked, b: &Tracked| Tracked::new(a.0 + b.0),
            ExecPreset::AllSpanOrSingle,
        );
        let make: Arc<dyn MultiFunction> = Arc::new(make);
        let grow: Arc<dyn MultiFunction> = Arc::new(grow);

        let seven: GField = make_constant_field(Tracked::new(7)).into();
        let tracked_index = FieldOperation::create(make, vec![index()]);
        let varying: Field<Tracked> =
            Field::new(FieldOperation::create(grow.clone(), vec![tracked_index, seven.clone()]));
        let uniform: Field<Tracked> =
            Field::new(FieldOperation::create(grow, vec![seven.clone(), seven]));

        let context = DefaultFieldContext;
        let mask = IndexMask::from_predicate(&IndexMask::from_size(100), |index| index % 7 != 3);
        let mut dst: Vec<Tracked> = (0..100).map(|_| Tracked::default()).collect();

        let mut evaluator = FieldEvaluator::new(&context, &mask);
        let first = evaluator.add(varying.clone());
        let second = evaluator.add(uniform.clone());
        evaluator.add_with_destination_slice(uniform, &mut dst);
        evaluator.add(varying);
        evaluator.evaluate();

        assert_eq!(evaluator.get_evaluated_typed::<Tracked>(first).get(11).0, 18);
        assert_eq!(evaluator.get_evaluated_typed::<Tracked>(second).get(11).0, 14);
        drop(evaluator);
        assert_eq!(dst[11].0, 14);
        assert_eq!(dst[3].0, 0);
    }

    assert_eq!(LIVE.load(Ordering::SeqCst), 0);
}

#[test]
fn context_resources_are_released_with_the_evaluator() {
    let context = AttributeContext::default().with("weight", VArray::from_vec(vec![1, 2, 3]));
    let add = add();
    let field = op(&add, vec![NamedFieldInput::field::<i32>("weight").into(), index()]);
    let mask = IndexMask::from_size(3);

    let mut evaluator = FieldEvaluator::new(&context, &mask);
    let result = evaluator.add(field);
    evaluator.evaluate();
    assert_eq!(evaluator.get_evaluated_typed::<i32>(result).to_vec(), vec![1, 3, 5]);
    assert_eq!(context.released.load(Ordering::Relaxed), 0);
    drop(evaluator);
    assert_eq!(context.released.load(Ordering::Relaxed), 1);
}

fn weighted_index(add: &Arc<dyn MultiFunction>, mul: &Arc<dyn MultiFunction>) -> Field<i32> {
    let square = op(mul, vec![index(), index()]);
    let weight = NamedFieldInput::field::<i32>("weight");
    let scaled = op(mul, vec![weight.into(), constant(3)]);
    op(add, vec![square.into(), scaled.into()])
}

proptest! {
    #[test]
    fn partition_depends_on_uniformity_only(a in any::<i16>(), b in any::<i16>()) {
        let add = add();
        let mul = mul();
        let field = weighted_index(&add, &mul);
        let mask = IndexMask::from_size(16);
        let scope = ResourceScope::new();

        let varying_for = |weight: i16| {
            let context = AttributeContext::default()
                .with("weight", VArray::for_single(i32::from(weight), 16));
            let info = preprocess_field_tree([field.field_ref()]);
            let inputs = get_field_context_inputs(&scope, &mask, &context, &info);
            let mut varying: Vec<u64> = find_varying_fields(&info, &inputs)
                .iter()
                .map(|field| default_hash(field))
                .collect();
            varying.sort_unstable();
            varying
        };
        prop_assert_eq!(varying_for(a), varying_for(b));
    }

    #[test]
    fn evaluation_is_index_local(
        weights in proptest::collection::vec(-100i32..100, 64),
        large in btree_set(0usize..64, 1..40),
        keep in proptest::collection::vec(any::<bool>(), 40),
    ) {
        let add = add();
        let mul = mul();
        let field = weighted_index(&add, &mul);
        let context = AttributeContext::default().with("weight", VArray::from_vec(weights.clone()));

        let large: Vec<usize> = large.into_iter().collect();
        let small: Vec<usize> = large
            .iter()
            .zip(&keep)
            .filter(|(_, keep)| **keep)
            .map(|(index, _)| *index)
            .collect();

        let large_mask = IndexMask::from_indices(large.clone());
        let small_mask = IndexMask::from_indices(small.clone());
        let on_large = evaluate_one(&field, &context, &large_mask);
        let on_small = evaluate_one(&field, &context, &small_mask);

        for index in small {
            prop_assert_eq!(on_small.get(index), on_large.get(index));
            let i = index as i32;
            prop_assert_eq!(on_small.get(index), i * i + weights[index] * 3);
        }
    }
}
