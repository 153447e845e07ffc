use super::{MultiFunction, ParamCategory, ParamType, Signature};
use crate::{
    dynamic::{
        FieldValue, GBuffer, GMutableSpan, GVArray, GVVectorArray, GVectorArray, MutableSpan,
        VArray, VVectorArray, VectorArray,
    },
    index_mask::IndexMask,
};
use std::fmt::{self, Debug};

enum ParamArg<'a> {
    SingleInput(GVArray),
    SingleOutput {
        span: Option<GMutableSpan<'a>>,
        ignored: bool,
    },
    SingleMutable(Option<GMutableSpan<'a>>),
    VectorInput(GVVectorArray),
    VectorOutput(Option<&'a mut GVectorArray>),
    VectorMutable(Option<&'a mut GVectorArray>),
}

impl ParamArg<'_> {
    fn category(&self) -> ParamCategory {
        match self {
            Self::SingleInput(_) => ParamCategory::SingleInput,
            Self::SingleOutput { .. } => ParamCategory::SingleOutput,
            Self::SingleMutable(_) => ParamCategory::SingleMutable,
            Self::VectorInput(_) => ParamCategory::VectorInput,
            Self::VectorOutput(_) => ParamCategory::VectorOutput,
            Self::VectorMutable(_) => ParamCategory::VectorMutable,
        }
    }
}

/// The arguments of one multi-function call.
///
/// Inputs can be read any number of times. Outputs and mutables are handed
/// out once: the accessor moves the span out of `Params`, so a function can
/// hold all of its outputs at the same time.
pub struct Params<'a> {
    args: Vec<ParamArg<'a>>,
}

impl<'a> Params<'a> {
    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    fn missing(&self, index: usize, expected: ParamCategory) -> ! {
        match self.args.get(index) {
            Some(arg) if arg.category() == expected => {
                panic!("parameter {index} ({expected:?}) was already taken")
            }
            Some(arg) => panic!(
                "parameter {index} is a {:?}, not a {expected:?}",
                arg.category()
            ),
            None => panic!("parameter {index} does not exist"),
        }
    }

    pub fn readonly_single_input_generic(&self, index: usize) -> &GVArray {
        match self.args.get(index) {
            Some(ParamArg::SingleInput(varray)) => varray,
            _ => self.missing(index, ParamCategory::SingleInput),
        }
    }

    pub fn readonly_single_input<T: FieldValue>(&self, index: usize) -> VArray<T> {
        self.readonly_single_input_generic(index).typed()
    }

    pub fn single_output_generic(&mut self, index: usize) -> GMutableSpan<'a> {
        match self.args.get_mut(index) {
            Some(ParamArg::SingleOutput { span, .. }) => span
                .take()
                .unwrap_or_else(|| self.missing(index, ParamCategory::SingleOutput)),
            _ => self.missing(index, ParamCategory::SingleOutput),
        }
    }

    /// Storage for an output. Outputs the caller doesn't need are backed by
    /// scratch storage, so the function can write unconditionally.
    pub fn single_output<T: FieldValue>(&mut self, index: usize) -> MutableSpan<'a, T> {
        self.single_output_generic(index).typed()
    }

    /// Like [`single_output`](Self::single_output), but returns `None` when
    /// the caller ignores the output, so computing it can be skipped.
    pub fn single_output_if_required<T: FieldValue>(
        &mut self,
        index: usize,
    ) -> Option<MutableSpan<'a, T>> {
        if self.output_is_ignored(index) {
            return None;
        }
        Some(self.single_output(index))
    }

    pub fn output_is_ignored(&self, index: usize) -> bool {
        matches!(
            self.args.get(index),
            Some(ParamArg::SingleOutput { ignored: true, .. })
        )
    }

    pub fn single_mutable_generic(&mut self, index: usize) -> GMutableSpan<'a> {
        match self.args.get_mut(index) {
            Some(ParamArg::SingleMutable(span)) => span
                .take()
                .unwrap_or_else(|| self.missing(index, ParamCategory::SingleMutable)),
            _ => self.missing(index, ParamCategory::SingleMutable),
        }
    }

    pub fn single_mutable<T: FieldValue>(&mut self, index: usize) -> MutableSpan<'a, T> {
        self.single_mutable_generic(index).typed()
    }

    pub fn readonly_vector_input_generic(&self, index: usize) -> &GVVectorArray {
        match self.args.get(index) {
            Some(ParamArg::VectorInput(vectors)) => vectors,
            _ => self.missing(index, ParamCategory::VectorInput),
        }
    }

    pub fn readonly_vector_input<T: FieldValue>(&self, index: usize) -> VVectorArray<T> {
        self.readonly_vector_input_generic(index).typed()
    }

    pub fn vector_output_generic(&mut self, index: usize) -> &'a mut GVectorArray {
        match self.args.get_mut(index) {
            Some(ParamArg::VectorOutput(vectors)) => vectors
                .take()
                .unwrap_or_else(|| self.missing(index, ParamCategory::VectorOutput)),
            _ => self.missing(index, ParamCategory::VectorOutput),
        }
    }

    pub fn vector_output<T: FieldValue>(&mut self, index: usize) -> &'a mut VectorArray<T> {
        self.vector_output_generic(index).typed_mut()
    }

    pub fn vector_mutable_generic(&mut self, index: usize) -> &'a mut GVectorArray {
        match self.args.get_mut(index) {
            Some(ParamArg::VectorMutable(vectors)) => vectors
                .take()
                .unwrap_or_else(|| self.missing(index, ParamCategory::VectorMutable)),
            _ => self.missing(index, ParamCategory::VectorMutable),
        }
    }

    pub fn vector_mutable<T: FieldValue>(&mut self, index: usize) -> &'a mut VectorArray<T> {
        self.vector_mutable_generic(index).typed_mut()
    }

    /// Whether the parameters contain vector outputs or mutables, which can't
    /// be split between chunks.
    pub(crate) fn has_vector_outputs(&self) -> bool {
        self.args.iter().any(|arg| {
            matches!(
                arg,
                ParamArg::VectorOutput(_) | ParamArg::VectorMutable(_)
            )
        })
    }

    /// Splits the parameters for calls on consecutive chunks of a mask.
    ///
    /// `boundaries` are the first indices of every chunk except the first,
    /// in ascending order. Inputs are shared; output and mutable spans are
    /// split so that every chunk gets exclusive access to its index range.
    pub(crate) fn split_at_indices(self, boundaries: &[usize]) -> Vec<Params<'a>> {
        let mut chunks: Vec<Params<'a>> = (0..=boundaries.len())
            .map(|_| Params {
                args: Vec::with_capacity(self.args.len()),
            })
            .collect();

        for arg in self.args {
            match arg {
                ParamArg::SingleInput(varray) => chunks
                    .iter_mut()
                    .for_each(|chunk| chunk.args.push(ParamArg::SingleInput(varray.clone()))),
                ParamArg::VectorInput(vectors) => chunks
                    .iter_mut()
                    .for_each(|chunk| chunk.args.push(ParamArg::VectorInput(vectors.clone()))),
                ParamArg::SingleOutput { span, ignored } => {
                    for (chunk, span) in chunks.iter_mut().zip(split_span(span, boundaries)) {
                        chunk.args.push(ParamArg::SingleOutput { span, ignored });
                    }
                }
                ParamArg::SingleMutable(span) => {
                    for (chunk, span) in chunks.iter_mut().zip(split_span(span, boundaries)) {
                        chunk.args.push(ParamArg::SingleMutable(span));
                    }
                }
                ParamArg::VectorOutput(_) | ParamArg::VectorMutable(_) => {
                    panic!("vector outputs cannot be split between chunks")
                }
            }
        }
        chunks
    }
}

fn split_span<'a>(
    span: Option<GMutableSpan<'a>>,
    boundaries: &[usize],
) -> Vec<Option<GMutableSpan<'a>>> {
    let mut spans = Vec::with_capacity(boundaries.len() + 1);
    let mut rest = span;
    for &boundary in boundaries {
        match rest.take() {
            Some(span) => {
                let (left, right) = span.split_at(boundary);
                spans.push(Some(left));
                rest = Some(right);
            }
            None => spans.push(None),
        }
    }
    spans.push(rest);
    spans
}

impl Debug for Params<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.args.iter().map(ParamArg::category))
            .finish()
    }
}

enum BuilderArg<'a> {
    Param(ParamArg<'a>),
    IgnoredSingleOutput(GBuffer),
}

/// Collects the arguments of a call in signature order.
///
/// Arguments are checked against the signature with debug assertions.
pub struct ParamsBuilder<'a> {
    signature: &'a Signature,
    mask: IndexMask,
    args: Vec<BuilderArg<'a>>,
}

impl<'a> ParamsBuilder<'a> {
    pub fn new(function: &'a dyn MultiFunction, mask: &IndexMask) -> Self {
        Self::from_signature(function.signature(), mask)
    }

    pub fn from_signature(signature: &'a Signature, mask: &IndexMask) -> Self {
        Self {
            signature,
            mask: mask.clone(),
            args: Vec::with_capacity(signature.param_count()),
        }
    }

    fn next_param_type(&self, category: ParamCategory) -> Option<ParamType> {
        let index = self.args.len();
        debug_assert!(
            index < self.signature.param_count(),
            "too many parameters for {}",
            self.signature.name
        );
        let param_type = (index < self.signature.param_count())
            .then(|| self.signature.param_type(index));
        debug_assert_eq!(
            param_type.map(|param_type| param_type.category()),
            Some(category),
            "parameter {index} of {}",
            self.signature.name
        );
        param_type
    }

    fn check_span(&self, category: ParamCategory, span: &GMutableSpan<'_>) {
        if let Some(param_type) = self.next_param_type(category) {
            debug_assert_eq!(param_type.data_type().value_type(), span.value_type());
        }
        debug_assert!(
            self.mask.is_empty()
                || (span.offset() <= self.mask.get(0)
                    && span.index_range().end >= self.mask.min_array_size()),
            "span {:?} does not cover {:?}",
            span.index_range(),
            self.mask
        );
    }

    pub fn add_readonly_single_input(&mut self, varray: GVArray) {
        if let Some(param_type) = self.next_param_type(ParamCategory::SingleInput) {
            debug_assert_eq!(param_type.data_type().value_type(), varray.value_type());
        }
        debug_assert!(varray.len() >= self.mask.min_array_size());
        self.args
            .push(BuilderArg::Param(ParamArg::SingleInput(varray)));
    }

    /// Passes `value` for every index.
    pub fn add_readonly_single_input_value<T: FieldValue>(&mut self, value: T) {
        let len = self.mask.min_array_size();
        self.add_readonly_single_input(VArray::for_single(value, len).into());
    }

    pub fn add_single_output(&mut self, span: GMutableSpan<'a>) {
        self.check_span(ParamCategory::SingleOutput, &span);
        self.args.push(BuilderArg::Param(ParamArg::SingleOutput {
            span: Some(span),
            ignored: false,
        }));
    }

    pub fn add_single_output_slice<T: FieldValue>(&mut self, data: &'a mut [T]) {
        self.add_single_output(GMutableSpan::new(data));
    }

    /// Marks an output as not needed by the caller.
    pub fn add_ignored_single_output(&mut self) {
        let Some(param_type) = self.next_param_type(ParamCategory::SingleOutput) else {
            return;
        };
        let offset = self.mask.first().unwrap_or(0);
        let len = self.mask.min_array_size() - offset;
        let scratch = GBuffer::new(param_type.data_type().value_type(), offset, len);
        self.args.push(BuilderArg::IgnoredSingleOutput(scratch));
    }

    pub fn add_single_mutable(&mut self, span: GMutableSpan<'a>) {
        self.check_span(ParamCategory::SingleMutable, &span);
        self.args
            .push(BuilderArg::Param(ParamArg::SingleMutable(Some(span))));
    }

    pub fn add_readonly_vector_input(&mut self, vectors: GVVectorArray) {
        if let Some(param_type) = self.next_param_type(ParamCategory::VectorInput) {
            debug_assert_eq!(param_type.data_type().value_type(), vectors.value_type());
        }
        self.args
            .push(BuilderArg::Param(ParamArg::VectorInput(vectors)));
    }

    pub fn add_vector_output(&mut self, vectors: &'a mut GVectorArray) {
        if let Some(param_type) = self.next_param_type(ParamCategory::VectorOutput) {
            debug_assert_eq!(param_type.data_type().value_type(), vectors.value_type());
        }
        debug_assert!(vectors.len() >= self.mask.min_array_size());
        self.args
            .push(BuilderArg::Param(ParamArg::VectorOutput(Some(vectors))));
    }

    pub fn add_vector_mutable(&mut self, vectors: &'a mut GVectorArray) {
        if let Some(param_type) = self.next_param_type(ParamCategory::VectorMutable) {
            debug_assert_eq!(param_type.data_type().value_type(), vectors.value_type());
        }
        debug_assert!(vectors.len() >= self.mask.min_array_size());
        self.args
            .push(BuilderArg::Param(ParamArg::VectorMutable(Some(vectors))));
    }

    /// The collected arguments. Must be called after all parameters of the
    /// signature were added.
    pub fn params(&mut self) -> Params<'_> {
        debug_assert_eq!(
            self.args.len(),
            self.signature.param_count(),
            "missing parameters for {}",
            self.signature.name
        );
        let args = self
            .args
            .iter_mut()
            .map(|arg| match arg {
                BuilderArg::IgnoredSingleOutput(scratch) => ParamArg::SingleOutput {
                    span: Some(scratch.as_mutable_span()),
                    ignored: true,
                },
                BuilderArg::Param(param) => match param {
                    ParamArg::SingleInput(varray) => ParamArg::SingleInput(varray.clone()),
                    ParamArg::VectorInput(vectors) => ParamArg::VectorInput(vectors.clone()),
                    ParamArg::SingleOutput { span, ignored } => ParamArg::SingleOutput {
                        span: span.as_mut().map(GMutableSpan::reborrow),
                        ignored: *ignored,
                    },
                    ParamArg::SingleMutable(span) => {
                        ParamArg::SingleMutable(span.as_mut().map(GMutableSpan::reborrow))
                    }
                    ParamArg::VectorOutput(vectors) => {
                        ParamArg::VectorOutput(vectors.as_mut().map(|vectors| &mut **vectors))
                    }
                    ParamArg::VectorMutable(vectors) => {
                        ParamArg::VectorMutable(vectors.as_mut().map(|vectors| &mut **vectors))
                    }
                },
            })
            .collect();
        Params { args }
    }
}

impl Debug for ParamsBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamsBuilder")
            .field("function", &self.signature.name)
            .field("mask", &self.mask)
            .field("added", &self.args.len())
            .finish()
    }
}
