//! Linear programs of multi-function calls.
//!
//! Field graphs are lowered into a [`Procedure`]: a list of variables, a
//! sequence of call and destruct instructions ending in a return, and the
//! parameters through which the caller passes inputs and receives outputs.
//! A [`ProcedureExecutor`] runs a procedure as a [`MultiFunction`] of its own.
//!
//! [`MultiFunction`]: crate::multi_function::MultiFunction

mod builder;
mod executor;
mod optimization;
mod validate;

pub use builder::ProcedureBuilder;
pub use executor::ProcedureExecutor;
pub use optimization::move_destructs_up;
pub use validate::ValidationError;

use crate::multi_function::{DataType, InterfaceType, MultiFunction};
use std::{
    fmt::{self, Debug, Display, Write},
    sync::Arc,
};

/// Identifies a variable of one [`Procedure`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(u32);

impl VarId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl Debug for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Variable {
    pub data_type: DataType,
    /// Only used for debug output, may be empty.
    pub name: String,
}

/// Calls a function with one variable per signature parameter.
///
/// A `None` binding is only allowed for single outputs the procedure
/// doesn't need.
#[derive(Clone)]
pub struct CallInstruction {
    pub(crate) function: Arc<dyn MultiFunction>,
    pub(crate) params: Vec<Option<VarId>>,
}

impl CallInstruction {
    pub fn function(&self) -> &Arc<dyn MultiFunction> {
        &self.function
    }

    pub fn params(&self) -> &[Option<VarId>] {
        &self.params
    }

    /// Whether `var` is bound to any parameter of the call.
    pub fn uses(&self, var: VarId) -> bool {
        self.params.contains(&Some(var))
    }
}

impl Debug for CallInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallInstruction")
            .field("function", &self.function.debug_name())
            .field("params", &self.params)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub enum Instruction {
    Call(CallInstruction),
    /// Drops the value of an initialized variable.
    Destruct(VarId),
    /// Ends the procedure. Must be the last instruction.
    Return,
}

impl Instruction {
    pub fn is_destruct(&self) -> bool {
        matches!(self, Self::Destruct(_))
    }

    /// Whether the instruction reads, writes or destructs `var`.
    pub fn uses(&self, var: VarId) -> bool {
        match self {
            Self::Call(call) => call.uses(var),
            Self::Destruct(destructed) => *destructed == var,
            Self::Return => false,
        }
    }
}

/// A variable the caller provides or receives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcedureParam {
    pub interface: InterfaceType,
    pub var: VarId,
}

#[derive(Clone, Debug, Default)]
pub struct Procedure {
    variables: Vec<Variable>,
    instructions: Vec<Instruction>,
    params: Vec<ProcedureParam>,
}

impl Procedure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, var: VarId) -> &Variable {
        &self.variables[var.index()]
    }

    pub fn variable_ids(&self) -> impl Iterator<Item = VarId> + '_ {
        (0..self.variables.len()).map(VarId::new)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn params(&self) -> &[ProcedureParam] {
        &self.params
    }

    pub fn call_count(&self) -> usize {
        self.instructions
            .iter()
            .filter(|instruction| matches!(instruction, Instruction::Call(_)))
            .count()
    }

    pub fn calls(&self) -> impl Iterator<Item = &CallInstruction> + '_ {
        self.instructions
            .iter()
            .filter_map(|instruction| match instruction {
                Instruction::Call(call) => Some(call),
                _ => None,
            })
    }

    pub fn new_variable(&mut self, data_type: DataType, name: impl Into<String>) -> VarId {
        let id = VarId::new(self.variables.len());
        self.variables.push(Variable {
            data_type,
            name: name.into(),
        });
        id
    }

    pub fn push_instruction(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    pub fn add_param(&mut self, interface: InterfaceType, var: VarId) {
        self.params.push(ProcedureParam { interface, var });
    }

    pub(crate) fn instructions_mut(&mut self) -> &mut Vec<Instruction> {
        &mut self.instructions
    }

    fn var_label(&self, var: VarId) -> String {
        match self.variables.get(var.index()) {
            Some(variable) if !variable.name.is_empty() => format!("{var} \"{}\"", variable.name),
            _ => var.to_string(),
        }
    }

    fn instruction_label(&self, instruction: &Instruction) -> String {
        match instruction {
            Instruction::Call(call) => {
                let mut label = format!("call {}(", call.function.debug_name());
                for (index, var) in call.params.iter().enumerate() {
                    if index > 0 {
                        label.push_str(", ");
                    }
                    let interface = match call.function.param_type(index).interface_type() {
                        InterfaceType::Input => "in",
                        InterfaceType::Output => "out",
                        InterfaceType::Mutable => "mut",
                    };
                    match var {
                        Some(var) => {
                            let _ = write!(label, "{interface} {var}");
                        }
                        None => {
                            let _ = write!(label, "{interface} _");
                        }
                    }
                }
                label.push(')');
                label
            }
            Instruction::Destruct(var) => format!("destruct {var}"),
            Instruction::Return => "return".to_owned(),
        }
    }

    /// Renders the procedure as a graphviz digraph with one node per
    /// instruction.
    pub fn to_dot(&self) -> String {
        let mut dot =
            String::from("digraph procedure {\n  node [shape=box, fontname=monospace];\n");
        let params = self
            .params
            .iter()
            .map(|param| format!("{:?} {}", param.interface, self.var_label(param.var)))
            .collect::<Vec<_>>()
            .join("\\n");
        let _ = writeln!(dot, "  entry [label=\"{}\", shape=ellipse];", escape_dot(&params));

        let mut previous = String::from("entry");
        for (index, instruction) in self.instructions.iter().enumerate() {
            let node = format!("i{index}");
            let _ = writeln!(
                dot,
                "  {node} [label=\"{}\"];",
                escape_dot(&self.instruction_label(instruction))
            );
            let _ = writeln!(dot, "  {previous} -> {node};");
            previous = node;
        }
        dot.push_str("}\n");
        dot
    }
}

fn escape_dot(label: &str) -> String {
    label.replace('"', "\\\"")
}

impl Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("procedure(")?;
        for (index, param) in self.params.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            let interface = match param.interface {
                InterfaceType::Input => "in",
                InterfaceType::Output => "out",
                InterfaceType::Mutable => "mut",
            };
            write!(
                f,
                "{interface} {}: {}",
                self.var_label(param.var),
                self.variable(param.var).data_type
            )?;
        }
        f.write_str(") {\n")?;
        for instruction in &self.instructions {
            writeln!(f, "    {}", self.instruction_label(instruction))?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests;
