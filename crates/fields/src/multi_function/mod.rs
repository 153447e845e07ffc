//! Batched functions with typed signatures.
//!
//! A [`MultiFunction`] processes many elements in one call: it receives an
//! [`IndexMask`] and one argument per signature parameter, reads its inputs
//! at the masked indices and writes its outputs at exactly those indices.
//! Field operations wrap multi-functions, and procedures are sequences of
//! multi-function calls.

pub mod build;
mod call;
mod params;
mod signature;

pub use build::ExecPreset;
pub use call::call_auto;
pub use params::{Params, ParamsBuilder};
pub use signature::{DataType, InterfaceType, ParamCategory, ParamType, Signature, SignatureBuilder};

use crate::{
    dynamic::AsAny,
    hash::address_hash,
    index_mask::IndexMask,
    utils::same_object,
};
use std::{
    any::Any,
    fmt::{self, Debug},
};

/// Scheduling information a function provides about itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExecutionHints {
    /// Calls on fewer indices are not worth splitting between threads.
    pub min_grain_size: usize,
    /// The function allocates memory proportional to the index range of the
    /// mask, so calling it on smaller chunks reduces peak memory.
    pub allocates_array: bool,
    /// All indices cost about the same to process.
    pub uniform_execution_time: bool,
}

impl Default for ExecutionHints {
    fn default() -> Self {
        Self {
            min_grain_size: 10_000,
            allocates_array: false,
            uniform_execution_time: true,
        }
    }
}

/// Data passed through to every function of one evaluation.
#[derive(Clone, Copy, Default)]
pub struct Context<'a> {
    user_data: Option<&'a (dyn Any + Send + Sync)>,
}

impl<'a> Context<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_data(user_data: &'a (dyn Any + Send + Sync)) -> Self {
        Self {
            user_data: Some(user_data),
        }
    }

    pub fn user_data<T: Any>(&self) -> Option<&'a T> {
        self.user_data.and_then(|data| data.downcast_ref())
    }
}

impl Debug for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("user_data", &self.user_data.is_some())
            .finish()
    }
}

/// A named function that processes a batch of elements at once.
///
/// Implementations must write every output at every index in the mask and
/// must not read or write any other index. Output storage is not cleared
/// before the call.
pub trait MultiFunction: AsAny + Send + Sync {
    fn signature(&self) -> &Signature;

    fn call(&self, mask: &IndexMask, params: &mut Params<'_>, context: &Context<'_>);

    fn execution_hints(&self) -> ExecutionHints {
        ExecutionHints::default()
    }

    /// Hash consistent with [`equals`](Self::equals). Identity by default.
    fn function_hash(&self) -> u64 {
        address_hash(self)
    }

    /// Whether `other` computes the same function. Identity by default.
    fn equals(&self, other: &dyn MultiFunction) -> bool {
        same_object(self, other)
    }

    fn debug_name(&self) -> String {
        self.signature().name.clone()
    }

    fn param_count(&self) -> usize {
        self.signature().param_count()
    }

    fn param_type(&self, index: usize) -> ParamType {
        self.signature().param_type(index)
    }

    fn input_count(&self) -> usize {
        self.signature().input_count()
    }

    fn output_count(&self) -> usize {
        self.signature().output_count()
    }

    /// The data type of the `index`th output parameter.
    fn output_type(&self, index: usize) -> DataType {
        self.signature()
            .params()
            .filter(|param| param.interface_type() == InterfaceType::Output)
            .nth(index)
            .map(|param| param.data_type())
            .unwrap_or_else(|| panic!("{} has no output {index}", self.debug_name()))
    }

    /// The data type of the `index`th input parameter.
    fn input_type(&self, index: usize) -> DataType {
        self.signature()
            .params()
            .filter(|param| param.interface_type() == InterfaceType::Input)
            .nth(index)
            .map(|param| param.data_type())
            .unwrap_or_else(|| panic!("{} has no input {index}", self.debug_name()))
    }
}

impl Debug for dyn MultiFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signature())
    }
}
