use super::{Instruction, Procedure, VarId};
use crate::{
    hash::HashSet,
    multi_function::{InterfaceType, ParamCategory},
};
use thiserror::Error;

type ValidationResult<T = ()> = Result<T, ValidationError>;

/// A structural problem found by [`Procedure::validate`].
///
/// `instruction` fields are positions in [`Procedure::instructions`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("the procedure does not end with a return instruction")]
    MissingReturn,

    #[error("instruction {instruction} follows the return instruction")]
    InstructionAfterReturn { instruction: usize },

    #[error("variable {var} does not exist")]
    UnknownVariable { var: VarId },

    #[error("call {instruction} to {function} has {actual} variables for {expected} parameters")]
    ParameterCountMismatch {
        instruction: usize,
        function: String,
        expected: usize,
        actual: usize,
    },

    #[error("parameter {param} of call {instruction} to {function} is not bound to a variable")]
    MissingParameter {
        instruction: usize,
        function: String,
        param: usize,
    },

    #[error(
        "variable {var} has type {actual} but parameter {param} of call {instruction} expects {expected}"
    )]
    TypeMismatch {
        instruction: usize,
        param: usize,
        var: VarId,
        expected: String,
        actual: String,
    },

    #[error("variable {var} is written by call {instruction} and also bound to another parameter")]
    AliasedOutput { instruction: usize, var: VarId },

    #[error("variable {var} is bound to more than one procedure parameter")]
    DuplicateParameter { var: VarId },

    #[error("call {instruction} reads variable {var} before it is initialized")]
    UninitializedRead { instruction: usize, var: VarId },

    #[error("call {instruction} writes variable {var}, which is already initialized")]
    InitializedOutput { instruction: usize, var: VarId },

    #[error("instruction {instruction} destructs variable {var}, which is not initialized")]
    UninitializedDestruct { instruction: usize, var: VarId },

    #[error("output variable {var} is not initialized on return")]
    UninitializedOnReturn { var: VarId },

    #[error("variable {var} is still initialized on return")]
    LeakedOnReturn { var: VarId },
}

impl Procedure {
    /// Checks that the procedure is well formed and that every variable is
    /// initialized before it is read and destructed before the return,
    /// unless the caller receives it.
    #[tracing::instrument(skip_all)]
    pub fn validate(&self) -> ValidationResult {
        self.validate_structure()?;
        self.validate_params()?;
        self.validate_calls()?;
        self.validate_init()?;

        tracing::trace!(
            variables = self.variables().len(),
            instructions = self.instructions().len(),
            "validated procedure"
        );
        Ok(())
    }

    fn check_var(&self, var: VarId) -> ValidationResult {
        if var.index() < self.variables().len() {
            Ok(())
        } else {
            Err(ValidationError::UnknownVariable { var })
        }
    }

    fn validate_structure(&self) -> ValidationResult {
        let instructions = self.instructions();
        let Some(position) = instructions
            .iter()
            .position(|instruction| matches!(instruction, Instruction::Return))
        else {
            return Err(ValidationError::MissingReturn);
        };

        if position + 1 < instructions.len() {
            return Err(ValidationError::InstructionAfterReturn {
                instruction: position + 1,
            });
        }
        Ok(())
    }

    fn validate_params(&self) -> ValidationResult {
        let mut vars: HashSet<VarId> = HashSet::default();
        for param in self.params() {
            self.check_var(param.var)?;
            // One variable cannot be passed through two parameters
            if !vars.insert(param.var) {
                return Err(ValidationError::DuplicateParameter { var: param.var });
            }
        }
        Ok(())
    }

    fn validate_calls(&self) -> ValidationResult {
        for (position, instruction) in self.instructions().iter().enumerate() {
            let call = match instruction {
                Instruction::Call(call) => call,
                Instruction::Destruct(var) => {
                    self.check_var(*var)?;
                    continue;
                }
                Instruction::Return => continue,
            };

            let function = &call.function;
            if call.params.len() != function.param_count() {
                return Err(ValidationError::ParameterCountMismatch {
                    instruction: position,
                    function: function.debug_name(),
                    expected: function.param_count(),
                    actual: call.params.len(),
                });
            }

            for (index, var) in call.params.iter().enumerate() {
                let param_type = function.param_type(index);
                let Some(var) = *var else {
                    // Single outputs are optional
                    if param_type.category() == ParamCategory::SingleOutput {
                        continue;
                    }
                    return Err(ValidationError::MissingParameter {
                        instruction: position,
                        function: function.debug_name(),
                        param: index,
                    });
                };

                self.check_var(var)?;
                let data_type = self.variable(var).data_type;
                if data_type != param_type.data_type() {
                    return Err(ValidationError::TypeMismatch {
                        instruction: position,
                        param: index,
                        var,
                        expected: param_type.data_type().to_string(),
                        actual: data_type.to_string(),
                    });
                }

                // A variable that is written can't be bound to any other
                // parameter, inputs may share a variable
                let aliased = call
                    .params
                    .iter()
                    .enumerate()
                    .any(|(other, other_var)| {
                        other != index
                            && *other_var == Some(var)
                            && (param_type.is_output_or_mutable()
                                || function.param_type(other).is_output_or_mutable())
                    });
                if aliased {
                    return Err(ValidationError::AliasedOutput {
                        instruction: position,
                        var,
                    });
                }
            }
        }
        Ok(())
    }

    /// Simulates the initialization state of every variable through the
    /// instruction sequence.
    fn validate_init(&self) -> ValidationResult {
        let mut initialized = vec![false; self.variables().len()];
        for param in self.params() {
            if matches!(param.interface, InterfaceType::Input | InterfaceType::Mutable) {
                initialized[param.var.index()] = true;
            }
        }

        for (position, instruction) in self.instructions().iter().enumerate() {
            match instruction {
                Instruction::Call(call) => {
                    for (index, var) in call.params.iter().enumerate() {
                        let Some(var) = *var else { continue };
                        let is_initialized = initialized[var.index()];
                        match call.function.param_type(index).interface_type() {
                            InterfaceType::Input | InterfaceType::Mutable if !is_initialized => {
                                return Err(ValidationError::UninitializedRead {
                                    instruction: position,
                                    var,
                                });
                            }
                            InterfaceType::Output if is_initialized => {
                                return Err(ValidationError::InitializedOutput {
                                    instruction: position,
                                    var,
                                });
                            }
                            _ => {}
                        }
                    }

                    for (index, var) in call.params.iter().enumerate() {
                        if let Some(var) = var {
                            if call.function.param_type(index).interface_type()
                                == InterfaceType::Output
                            {
                                initialized[var.index()] = true;
                            }
                        }
                    }
                }

                Instruction::Destruct(var) => {
                    if !initialized[var.index()] {
                        return Err(ValidationError::UninitializedDestruct {
                            instruction: position,
                            var: *var,
                        });
                    }
                    initialized[var.index()] = false;
                }

                Instruction::Return => {
                    let returned: HashSet<VarId> = self
                        .params()
                        .iter()
                        .filter(|param| {
                            matches!(param.interface, InterfaceType::Output | InterfaceType::Mutable)
                        })
                        .map(|param| param.var)
                        .collect();

                    for var in self.variable_ids() {
                        match (returned.contains(&var), initialized[var.index()]) {
                            (true, false) => {
                                return Err(ValidationError::UninitializedOnReturn { var })
                            }
                            (false, true) => return Err(ValidationError::LeakedOnReturn { var }),
                            _ => {}
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
