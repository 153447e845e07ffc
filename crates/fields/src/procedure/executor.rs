use super::{CallInstruction, Instruction, Procedure, VarId};
use crate::{
    config::EvaluationConfig,
    dynamic::{GBuffer, GMutableSpan, GVArray, GVVectorArray, GVectorArray},
    index_mask::IndexMask,
    multi_function::{
        self, Context, DataType, ExecutionHints, InterfaceType, MultiFunction, ParamCategory,
        ParamType, Params, ParamsBuilder, Signature,
    },
};
use std::{fmt, mem, sync::Arc};

/// Runs a [`Procedure`] as a multi-function whose parameters are the
/// procedure's parameters.
///
/// Intermediate variables live in buffers covering the index range of the
/// mask the executor is called with. A buffer is released at the destruct
/// instruction of its variable.
pub struct ProcedureExecutor {
    procedure: Arc<Procedure>,
    signature: Signature,
    config: EvaluationConfig,
}

impl ProcedureExecutor {
    pub fn new(procedure: impl Into<Arc<Procedure>>) -> Self {
        let procedure = procedure.into();
        if cfg!(debug_assertions) {
            if let Err(error) = procedure.validate() {
                panic!("invalid procedure: {error}\n{procedure}");
            }
        }

        let mut signature = Signature::new("Procedure");
        for param in procedure.params() {
            let variable = procedure.variable(param.var);
            let name = if variable.name.is_empty() {
                param.var.to_string()
            } else {
                variable.name.clone()
            };
            signature.add(name, ParamType::new(param.interface, variable.data_type));
        }

        Self {
            procedure,
            signature,
            config: EvaluationConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EvaluationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn procedure(&self) -> &Arc<Procedure> {
        &self.procedure
    }

    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Runs the procedure, splitting large masks into chunks according to
    /// the executor's configuration.
    pub fn call_auto(&self, mask: &IndexMask, params: Params<'_>, context: &Context<'_>) {
        multi_function::call_auto(self, mask, params, context, &self.config);
    }

    fn execute<'a>(&self, mask: &IndexMask, params: &mut Params<'a>, context: &Context<'_>) {
        let procedure = &*self.procedure;
        let mut states: Vec<VarState<'a>> = procedure
            .variables()
            .iter()
            .map(|_| VarState::Uninitialized)
            .collect();

        for (index, param) in procedure.params().iter().enumerate() {
            let data_type = procedure.variable(param.var).data_type;
            states[param.var.index()] = match (param.interface, data_type) {
                (InterfaceType::Input, DataType::Single(_)) => {
                    VarState::Single(params.readonly_single_input_generic(index).clone())
                }
                (InterfaceType::Input, DataType::Vector(_)) => {
                    VarState::Vector(params.readonly_vector_input_generic(index).clone())
                }
                (InterfaceType::Output, DataType::Single(_)) => VarState::External {
                    span: params.single_output_generic(index),
                    initialized: false,
                },
                (InterfaceType::Mutable, DataType::Single(_)) => VarState::External {
                    span: params.single_mutable_generic(index),
                    initialized: true,
                },
                (InterfaceType::Output, DataType::Vector(_)) => VarState::ExternalVector {
                    vectors: params.vector_output_generic(index),
                    initialized: false,
                },
                (InterfaceType::Mutable, DataType::Vector(_)) => VarState::ExternalVector {
                    vectors: params.vector_mutable_generic(index),
                    initialized: true,
                },
            };
        }

        for instruction in procedure.instructions() {
            match instruction {
                Instruction::Call(call) => execute_call(call, mask, &mut states, context),
                Instruction::Destruct(var) => states[var.index()].destruct(),
                Instruction::Return => break,
            }
        }
    }
}

/// Where the value of a variable currently lives.
enum VarState<'a> {
    Uninitialized,
    Single(GVArray),
    Vector(GVVectorArray),
    /// Storage provided by the caller through an output or mutable parameter.
    External {
        span: GMutableSpan<'a>,
        initialized: bool,
    },
    ExternalVector {
        vectors: &'a mut GVectorArray,
        initialized: bool,
    },
}

impl VarState<'_> {
    fn destruct(&mut self) {
        match self {
            Self::External { initialized, .. } | Self::ExternalVector { initialized, .. } => {
                *initialized = false
            }
            _ => *self = Self::Uninitialized,
        }
    }

    fn is_external(&self) -> bool {
        matches!(self, Self::External { .. } | Self::ExternalVector { .. })
    }
}

/// How one parameter of a call is passed.
enum CallArg {
    Input(GVArray),
    VectorInput(GVVectorArray),
    /// Fresh storage for an output or a copy of a mutable value.
    Buffer(GBuffer),
    Vectors(GVectorArray),
    /// The caller's storage in the variable's state.
    External,
    Ignored,
}

fn uninitialized(var: VarId, call: &CallInstruction) -> ! {
    panic!(
        "variable {var} used by {} is not initialized",
        call.function.debug_name()
    )
}

fn prepare_arg(
    call: &CallInstruction,
    param_type: ParamType,
    var: Option<VarId>,
    mask: &IndexMask,
    states: &[VarState<'_>],
) -> CallArg {
    let Some(var) = var else {
        return CallArg::Ignored;
    };
    let state = &states[var.index()];
    let ty = param_type.data_type().value_type();
    let offset = mask.first().unwrap_or(0);
    let len = mask.min_array_size() - offset;

    match (param_type.category(), state) {
        (_, state) if state.is_external() && param_type.is_output_or_mutable() => CallArg::External,

        (ParamCategory::SingleInput, VarState::Single(varray)) => CallArg::Input(varray.clone()),
        (
            ParamCategory::SingleInput,
            VarState::External {
                span,
                initialized: true,
            },
        ) => CallArg::Input(span.to_varray()),

        (ParamCategory::VectorInput, VarState::Vector(vectors)) => {
            CallArg::VectorInput(vectors.clone())
        }
        (
            ParamCategory::VectorInput,
            VarState::ExternalVector {
                vectors,
                initialized: true,
            },
        ) => CallArg::VectorInput(vectors.to_vvector_array()),

        (ParamCategory::SingleOutput, VarState::Uninitialized) => {
            CallArg::Buffer(GBuffer::new(ty, offset, len))
        }
        (ParamCategory::SingleMutable, VarState::Single(varray)) => {
            let mut buffer = GBuffer::new(ty, offset, len);
            varray.materialize_to(mask, &mut buffer.as_mutable_span());
            CallArg::Buffer(buffer)
        }

        (ParamCategory::VectorOutput, VarState::Uninitialized) => {
            CallArg::Vectors(GVectorArray::new(ty, mask.min_array_size()))
        }
        (ParamCategory::VectorMutable, VarState::Vector(source)) => {
            let mut vectors = GVectorArray::new(ty, mask.min_array_size());
            vectors.extend_from(source, mask);
            CallArg::Vectors(vectors)
        }

        _ => uninitialized(var, call),
    }
}

fn execute_call<'a>(
    call: &CallInstruction,
    mask: &IndexMask,
    states: &mut [VarState<'a>],
    context: &Context<'_>,
) {
    let function = &*call.function;
    let mut args: Vec<CallArg> = call
        .params
        .iter()
        .enumerate()
        .map(|(index, &var)| prepare_arg(call, function.param_type(index), var, mask, states))
        .collect();

    // Caller storage is moved out of `states` for the duration of the call
    let mut external: Vec<VarState<'a>> = call
        .params
        .iter()
        .zip(&args)
        .map(|(var, arg)| match (var, arg) {
            (Some(var), CallArg::External) => {
                mem::replace(&mut states[var.index()], VarState::Uninitialized)
            }
            _ => VarState::Uninitialized,
        })
        .collect();

    {
        let mut builder = ParamsBuilder::new(function, mask);
        for (index, (arg, state)) in args.iter_mut().zip(external.iter_mut()).enumerate() {
            let category = function.param_type(index).category();
            match arg {
                CallArg::Input(varray) => builder.add_readonly_single_input(varray.clone()),
                CallArg::VectorInput(vectors) => builder.add_readonly_vector_input(vectors.clone()),
                CallArg::Ignored => builder.add_ignored_single_output(),
                CallArg::Buffer(buffer) => {
                    let span = buffer.as_mutable_span();
                    if category == ParamCategory::SingleMutable {
                        builder.add_single_mutable(span);
                    } else {
                        builder.add_single_output(span);
                    }
                }
                CallArg::Vectors(vectors) => {
                    if category == ParamCategory::VectorMutable {
                        builder.add_vector_mutable(vectors);
                    } else {
                        builder.add_vector_output(vectors);
                    }
                }
                CallArg::External => match (state, category) {
                    (VarState::External { span, .. }, ParamCategory::SingleMutable) => {
                        builder.add_single_mutable(span.reborrow())
                    }
                    (VarState::External { span, .. }, _) => {
                        builder.add_single_output(span.reborrow())
                    }
                    (VarState::ExternalVector { vectors, .. }, ParamCategory::VectorMutable) => {
                        builder.add_vector_mutable(vectors)
                    }
                    (VarState::ExternalVector { vectors, .. }, _) => {
                        builder.add_vector_output(vectors)
                    }
                    _ => unreachable!("external argument without caller storage"),
                },
            }
        }

        tracing::trace!(
            function = %function.debug_name(),
            indices = mask.len(),
            "executing call"
        );
        function.call(mask, &mut builder.params(), context);
    }

    for ((var, arg), mut moved) in call.params.iter().zip(args).zip(external) {
        let Some(var) = *var else { continue };
        let state = &mut states[var.index()];
        match arg {
            CallArg::Buffer(buffer) => *state = VarState::Single(buffer.into_varray()),
            CallArg::Vectors(vectors) => *state = VarState::Vector(vectors.into_vvector_array()),
            CallArg::External => {
                if let VarState::External { initialized, .. }
                | VarState::ExternalVector { initialized, .. } = &mut moved
                {
                    *initialized = true;
                }
                *state = moved;
            }
            CallArg::Input(_) | CallArg::VectorInput(_) | CallArg::Ignored => {}
        }
    }
}

impl MultiFunction for ProcedureExecutor {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, mask: &IndexMask, params: &mut Params<'_>, context: &Context<'_>) {
        if mask.is_empty() {
            return;
        }
        self.execute(mask, params, context);
    }

    /// Intermediate buffers are as large as the index range of the mask, so
    /// large masks are split even without parallelism. The grain size is the
    /// smallest grain size of the called functions, capped by the
    /// configuration.
    fn execution_hints(&self) -> ExecutionHints {
        self.procedure.calls().fold(
            ExecutionHints {
                min_grain_size: self.config.default_grain_size,
                allocates_array: true,
                uniform_execution_time: true,
            },
            |hints, call| {
                let call_hints = call.function.execution_hints();
                ExecutionHints {
                    min_grain_size: hints.min_grain_size.min(call_hints.min_grain_size),
                    allocates_array: true,
                    uniform_execution_time: hints.uniform_execution_time
                        && call_hints.uniform_execution_time,
                }
            },
        )
    }
}

impl fmt::Debug for ProcedureExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcedureExecutor")
            .field("signature", &self.signature)
            .field("instructions", &self.procedure.instructions().len())
            .field("config", &self.config)
            .finish()
    }
}
