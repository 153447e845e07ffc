use super::{CallInstruction, Instruction, Procedure, VarId};
use crate::multi_function::{DataType, InterfaceType, MultiFunction};
use std::sync::Arc;

/// Appends instructions to a [`Procedure`].
///
/// ```
/// use fields::{build, DataType, ExecPreset, ProcedureBuilder};
/// use std::sync::Arc;
///
/// let add = Arc::new(build::si2_so("add", |a: &i32, b: &i32| a + b, ExecPreset::Simple));
/// let mut builder = ProcedureBuilder::new();
/// let a = builder.add_input_parameter(DataType::single::<i32>(), "a");
/// let b = builder.add_input_parameter(DataType::single::<i32>(), "b");
/// let sum = builder.add_call(add, &[a, b])[0];
/// builder.add_destructs(&[a, b]);
/// builder.add_output_parameter(sum);
/// builder.add_return();
///
/// let procedure = builder.finish();
/// assert_eq!(procedure.validate(), Ok(()));
/// ```
#[derive(Debug, Default)]
pub struct ProcedureBuilder {
    procedure: Procedure,
}

impl ProcedureBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn procedure(&self) -> &Procedure {
        &self.procedure
    }

    pub fn finish(self) -> Procedure {
        self.procedure
    }

    pub fn new_variable(&mut self, data_type: DataType, name: impl Into<String>) -> VarId {
        self.procedure.new_variable(data_type, name)
    }

    pub fn add_parameter(&mut self, interface: InterfaceType, var: VarId) {
        self.procedure.add_param(interface, var);
    }

    /// Creates a variable that is initialized by the caller.
    pub fn add_input_parameter(&mut self, data_type: DataType, name: impl Into<String>) -> VarId {
        let var = self.new_variable(data_type, name);
        self.add_parameter(InterfaceType::Input, var);
        var
    }

    pub fn add_output_parameter(&mut self, var: VarId) {
        self.add_parameter(InterfaceType::Output, var);
    }

    /// Calls `function` with one variable per parameter.
    pub fn add_call_with_all_variables(
        &mut self,
        function: Arc<dyn MultiFunction>,
        params: Vec<Option<VarId>>,
    ) {
        debug_assert_eq!(
            params.len(),
            function.param_count(),
            "wrong number of variables for {}",
            function.debug_name()
        );
        self.procedure
            .push_instruction(Instruction::Call(CallInstruction { function, params }));
    }

    /// Calls `function` with `inputs` bound to its input and mutable
    /// parameters in order. Every output gets a new variable; the output
    /// variables are returned in order.
    pub fn add_call(&mut self, function: Arc<dyn MultiFunction>, inputs: &[VarId]) -> Vec<VarId> {
        let mut inputs = inputs.iter().copied();
        let mut outputs = Vec::new();
        let mut params = Vec::with_capacity(function.param_count());

        for index in 0..function.param_count() {
            let param_type = function.param_type(index);
            let var = match param_type.interface_type() {
                InterfaceType::Input | InterfaceType::Mutable => inputs.next(),
                InterfaceType::Output => {
                    let name = function.signature().param_name(index).to_owned();
                    let var = self.new_variable(param_type.data_type(), name);
                    outputs.push(var);
                    Some(var)
                }
            };
            debug_assert!(
                var.is_some(),
                "missing input {index} for {}",
                function.debug_name()
            );
            params.push(var);
        }
        debug_assert!(
            inputs.next().is_none(),
            "too many inputs for {}",
            function.debug_name()
        );

        self.add_call_with_all_variables(function, params);
        outputs
    }

    pub fn add_destruct(&mut self, var: VarId) {
        self.procedure.push_instruction(Instruction::Destruct(var));
    }

    pub fn add_destructs(&mut self, vars: &[VarId]) {
        for &var in vars {
            self.add_destruct(var);
        }
    }

    pub fn add_return(&mut self) {
        self.procedure.push_instruction(Instruction::Return);
    }
}
