use super::analysis::FieldTreeInfo;
use crate::{
    field::{FieldNodeKind, GFieldRef},
    hash::{HashSet, OrderedMap},
    multi_function::{
        build::{GenericConstant, GenericCopy},
        DataType, InterfaceType, MultiFunction,
    },
    procedure::{move_destructs_up, Procedure, ProcedureBuilder, VarId},
};
use std::sync::Arc;

/// An operation whose inputs are lowered one at a time.
struct FieldWithIndex<'a> {
    field: GFieldRef<'a>,
    current_input_index: usize,
}

impl<'a> FieldWithIndex<'a> {
    fn new(field: GFieldRef<'a>) -> Self {
        Self {
            field,
            current_input_index: 0,
        }
    }
}

/// Lowers `output_fields` into a procedure.
///
/// The procedure has one input parameter for every input in
/// `info.deduplicated_field_inputs`, in order, followed by one output
/// parameter for every output field. Outputs of operations that are
/// neither used nor requested are not computed.
#[tracing::instrument(skip_all, fields(outputs = output_fields.len()))]
pub(crate) fn build_procedure_for_fields(
    info: &FieldTreeInfo<'_>,
    output_fields: &[GFieldRef<'_>],
) -> Procedure {
    let mut builder = ProcedureBuilder::new();
    let mut var_by_field: OrderedMap<GFieldRef<'_>, VarId> = OrderedMap::default();

    let mut input_vars: HashSet<VarId> = HashSet::default();
    for (field, input) in &info.deduplicated_field_inputs {
        let var =
            builder.add_input_parameter(DataType::Single(input.value_type()), input.debug_name());
        var_by_field.insert(*field, var);
        input_vars.insert(var);
    }

    let requested: HashSet<GFieldRef<'_>> = output_fields.iter().copied().collect();

    for output in output_fields {
        let mut stack = vec![FieldWithIndex::new(*output)];
        while let Some(top) = stack.last_mut() {
            let field = top.field;
            if var_by_field.contains_key(&field) {
                stack.pop();
                continue;
            }

            match field.node().kind() {
                FieldNodeKind::Input(_) => {
                    unreachable!("input {field:?} is missing from the tree analysis")
                }

                FieldNodeKind::Operation(operation) => {
                    let inputs = operation.inputs();
                    if let Some(input) = inputs.get(top.current_input_index) {
                        top.current_input_index += 1;
                        stack.push(FieldWithIndex::new(input.field_ref()));
                        continue;
                    }

                    let function = operation.function();
                    let signature = function.signature();
                    let mut vars = Vec::with_capacity(signature.param_count());
                    let mut inputs = inputs.iter();
                    let mut output_index = 0;
                    for (index, param) in signature.params().enumerate() {
                        match param.interface_type() {
                            InterfaceType::Input => {
                                let input = inputs.next().map(|input| input.field_ref());
                                vars.push(input.map(|input| var_by_field[&input]));
                            }
                            InterfaceType::Output => {
                                let output_field = GFieldRef::new(field.node(), output_index);
                                output_index += 1;
                                if info.users(&output_field).is_empty()
                                    && !requested.contains(&output_field)
                                {
                                    vars.push(None);
                                } else {
                                    let var = builder.new_variable(
                                        param.data_type(),
                                        signature.param_name(index),
                                    );
                                    var_by_field.insert(output_field, var);
                                    vars.push(Some(var));
                                }
                            }
                            InterfaceType::Mutable => {
                                unreachable!("field operations have no mutable parameters")
                            }
                        }
                    }
                    builder.add_call_with_all_variables(function.clone(), vars);
                }

                FieldNodeKind::Constant(constant) => {
                    let function: Arc<dyn MultiFunction> =
                        Arc::new(GenericConstant::new(constant.value().clone()));
                    let var = builder.add_call(function, &[])[0];
                    var_by_field.insert(field, var);
                }
            }
        }
    }

    // Every output parameter needs its own variable
    let mut output_vars: HashSet<VarId> = HashSet::default();
    for field in output_fields {
        let mut var = var_by_field[field];
        if input_vars.contains(&var) || output_vars.contains(&var) {
            let copy: Arc<dyn MultiFunction> =
                Arc::new(GenericCopy::new(DataType::Single(field.value_type())));
            var = builder.add_call(copy, &[var])[0];
        }
        output_vars.insert(var);
        builder.add_output_parameter(var);
    }

    for var in var_by_field.values() {
        if !output_vars.contains(var) {
            builder.add_destruct(*var);
        }
    }
    builder.add_return();

    let mut procedure = builder.finish();
    move_destructs_up(&mut procedure);

    if cfg!(debug_assertions) {
        if let Err(error) = procedure.validate() {
            panic!("lowered fields into an invalid procedure: {error}\n{procedure}");
        }
    }

    tracing::debug!(
        variables = procedure.variables().len(),
        calls = procedure.call_count(),
        instructions = procedure.instructions().len(),
        "lowered fields"
    );
    procedure
}
