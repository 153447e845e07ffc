//! Multi-functions built from element-wise closures, plus a few generic
//! functions used when lowering fields.
//!
//! ```
//! use fields::{build, ExecPreset, IndexMask, MultiFunction, ParamsBuilder, VArray};
//!
//! let add = build::si2_so("add", |a: &i32, b: &i32| a + b, ExecPreset::AllSpanOrSingle);
//! let mask = IndexMask::from_size(3);
//! let mut result = vec![0; 3];
//! let mut builder = ParamsBuilder::new(&add, &mask);
//! builder.add_readonly_single_input(VArray::from_vec(vec![1, 2, 3]).into());
//! builder.add_readonly_single_input_value(10);
//! builder.add_single_output_slice(&mut result);
//! add.call(&mask, &mut builder.params(), &Default::default());
//! drop(builder);
//! assert_eq!(result, vec![11, 12, 13]);
//! ```

use super::{Context, DataType, MultiFunction, Params, ParamCategory, Signature, SignatureBuilder};
use crate::{
    dynamic::{FieldValue, GValue},
    hash::default_hash,
    index_mask::IndexMask,
};
use std::{any::TypeId, fmt, marker::PhantomData, sync::Arc};

/// How element-wise functions process their inputs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExecPreset {
    /// Evaluate the closure once per index.
    #[default]
    Simple,
    /// When every input is a single value, evaluate the closure once and
    /// fill the output with the result. Only valid for pure closures.
    AllSpanOrSingle,
}

macro_rules! element_functions {
    ($($builder:ident => $function:ident($($input:ident: $ty:ident = $index:literal),+) -> $output:literal;)*) => {$(
        #[doc = concat!(
            "Element-wise function with ", stringify!($output), " single input(s) and one single output."
        )]
        pub struct $function<$($ty,)+ O, F> {
            signature: Signature,
            element_fn: F,
            preset: ExecPreset,
            _types: PhantomData<fn($($ty,)+) -> O>,
        }

        pub fn $builder<$($ty,)+ O, F>(
            name: impl Into<String>,
            element_fn: F,
            preset: ExecPreset,
        ) -> $function<$($ty,)+ O, F>
        where
            $($ty: FieldValue,)+
            O: FieldValue,
            F: Fn($(&$ty),+) -> O + Send + Sync + 'static,
        {
            let signature = SignatureBuilder::new(name)
                $(.single_input::<$ty>(stringify!($input)))+
                .single_output::<O>("result")
                .build();
            $function {
                signature,
                element_fn,
                preset,
                _types: PhantomData,
            }
        }

        impl<$($ty,)+ O, F> MultiFunction for $function<$($ty,)+ O, F>
        where
            $($ty: FieldValue,)+
            O: FieldValue,
            F: Fn($(&$ty),+) -> O + Send + Sync + 'static,
        {
            fn signature(&self) -> &Signature {
                &self.signature
            }

            fn call(&self, mask: &IndexMask, params: &mut Params<'_>, _context: &Context<'_>) {
                $(let $input = params.readonly_single_input::<$ty>($index);)+
                let mut result = params.single_output::<O>($output);

                if self.preset == ExecPreset::AllSpanOrSingle {
                    if let ($(Some($input),)+) = ($($input.get_internal_single(),)+) {
                        result.fill(mask, &(self.element_fn)($($input),+));
                        return;
                    }
                }

                mask.foreach_index(|index| {
                    result[index] = (self.element_fn)($(&*$input.get_ref(index)),+);
                });
            }
        }
    )*};
}

element_functions! {
    si1_so => CustomSI1SO(a: A = 0) -> 1;
    si2_so => CustomSI2SO(a: A = 0, b: B = 1) -> 2;
    si3_so => CustomSI3SO(a: A = 0, b: B = 1, c: C = 2) -> 3;
    si4_so => CustomSI4SO(a: A = 0, b: B = 1, c: C = 2, d: D = 3) -> 4;
}

/// Function with one single mutable parameter, modified in place.
pub struct CustomSM<T, F> {
    signature: Signature,
    element_fn: F,
    _types: PhantomData<fn(T)>,
}

pub fn sm<T, F>(name: impl Into<String>, element_fn: F) -> CustomSM<T, F>
where
    T: FieldValue,
    F: Fn(&mut T) + Send + Sync + 'static,
{
    CustomSM {
        signature: SignatureBuilder::new(name)
            .single_mutable::<T>("value")
            .build(),
        element_fn,
        _types: PhantomData,
    }
}

impl<T, F> MultiFunction for CustomSM<T, F>
where
    T: FieldValue,
    F: Fn(&mut T) + Send + Sync + 'static,
{
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, mask: &IndexMask, params: &mut Params<'_>, _context: &Context<'_>) {
        let mut values = params.single_mutable::<T>(0);
        mask.foreach_index(|index| (self.element_fn)(&mut values[index]));
    }
}

/// Converts values with [`From`].
pub struct Convert<A, B> {
    signature: Signature,
    _types: PhantomData<fn(A) -> B>,
}

pub fn convert<A, B>() -> Convert<A, B>
where
    A: FieldValue,
    B: FieldValue + From<A>,
{
    let name = format!("{} to {}", A::value_type().name(), B::value_type().name());
    Convert {
        signature: SignatureBuilder::new(name)
            .single_input::<A>("a")
            .single_output::<B>("b")
            .build(),
        _types: PhantomData,
    }
}

impl<A, B> MultiFunction for Convert<A, B>
where
    A: FieldValue,
    B: FieldValue + From<A>,
{
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, mask: &IndexMask, params: &mut Params<'_>, _context: &Context<'_>) {
        let inputs = params.readonly_single_input::<A>(0);
        let mut outputs = params.single_output::<B>(1);
        mask.foreach_index(|index| outputs[index] = B::from(inputs.get(index)));
    }

    fn function_hash(&self) -> u64 {
        default_hash(&(TypeId::of::<A>(), TypeId::of::<B>()))
    }

    fn equals(&self, other: &dyn MultiFunction) -> bool {
        other.as_any().is::<Self>()
    }
}

/// Outputs the same value at every index. Two constants are equal when
/// their values are.
pub struct Constant<T> {
    value: T,
    signature: Signature,
}

impl<T: FieldValue> Constant<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            signature: SignatureBuilder::new("Constant")
                .single_output::<T>("value")
                .build(),
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }
}

impl<T: FieldValue> MultiFunction for Constant<T> {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, mask: &IndexMask, params: &mut Params<'_>, _context: &Context<'_>) {
        params.single_output::<T>(0).fill(mask, &self.value);
    }

    fn function_hash(&self) -> u64 {
        self.value.hash_value()
    }

    fn equals(&self, other: &dyn MultiFunction) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|other| other.value == self.value)
    }

    fn debug_name(&self) -> String {
        format!("{:?}", self.value)
    }
}

/// Type-erased [`Constant`], used to materialize constant field nodes.
pub struct GenericConstant {
    value: GValue,
    signature: Signature,
}

impl GenericConstant {
    pub fn new(value: GValue) -> Self {
        let signature = SignatureBuilder::new("Constant")
            .output("value", DataType::Single(value.value_type()))
            .build();
        Self { value, signature }
    }

    pub fn value(&self) -> &GValue {
        &self.value
    }
}

impl MultiFunction for GenericConstant {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, mask: &IndexMask, params: &mut Params<'_>, _context: &Context<'_>) {
        let mut output = params.single_output_generic(0);
        self.value.fill(mask, &mut output);
    }

    fn function_hash(&self) -> u64 {
        self.value.hash_value()
    }

    fn equals(&self, other: &dyn MultiFunction) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|other| other.value == self.value)
    }

    fn debug_name(&self) -> String {
        format!("{:?}", self.value)
    }
}

/// Outputs a copy of a shared vector at every index.
pub struct ConstantArray<T> {
    values: Arc<Vec<T>>,
    signature: Signature,
}

impl<T: FieldValue> ConstantArray<T> {
    pub fn new(values: Vec<T>) -> Self {
        Self {
            values: Arc::new(values),
            signature: SignatureBuilder::new("Constant Array")
                .vector_output::<T>("array")
                .build(),
        }
    }
}

impl<T: FieldValue> MultiFunction for ConstantArray<T> {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, mask: &IndexMask, params: &mut Params<'_>, _context: &Context<'_>) {
        let vectors = params.vector_output::<T>(0);
        mask.foreach_index(|index| vectors.extend(index, self.values.iter().cloned()));
    }
}

/// Copies its input to its output. Used when the same value has to be
/// returned through two different output parameters.
pub struct GenericCopy {
    signature: Signature,
}

impl GenericCopy {
    pub fn new(data_type: DataType) -> Self {
        Self {
            signature: SignatureBuilder::new("Copy")
                .input("input", data_type)
                .output("output", data_type)
                .build(),
        }
    }
}

impl MultiFunction for GenericCopy {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, mask: &IndexMask, params: &mut Params<'_>, _context: &Context<'_>) {
        match self.signature.param_type(0).data_type() {
            DataType::Single(_) => {
                let mut output = params.single_output_generic(1);
                params
                    .readonly_single_input_generic(0)
                    .materialize_to(mask, &mut output);
            }
            DataType::Vector(_) => {
                let output = params.vector_output_generic(1);
                output.extend_from(params.readonly_vector_input_generic(0), mask);
            }
        }
    }
}

/// Ignores its inputs and outputs default values.
pub struct DefaultOutput {
    signature: Signature,
}

impl DefaultOutput {
    pub fn new(input_types: &[DataType], output_types: &[DataType]) -> Self {
        let mut builder = SignatureBuilder::new("Default Output");
        for (index, data_type) in input_types.iter().enumerate() {
            builder = builder.input(format!("input {index}"), *data_type);
        }
        for (index, data_type) in output_types.iter().enumerate() {
            builder = builder.output(format!("output {index}"), *data_type);
        }
        Self {
            signature: builder.build(),
        }
    }
}

impl MultiFunction for DefaultOutput {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, mask: &IndexMask, params: &mut Params<'_>, _context: &Context<'_>) {
        for index in 0..self.signature.param_count() {
            let param_type = self.signature.param_type(index);
            if param_type.category() == ParamCategory::SingleOutput {
                let mut output = params.single_output_generic(index);
                param_type
                    .data_type()
                    .value_type()
                    .default_value()
                    .fill(mask, &mut output);
            }
            // Vector outputs start out empty.
        }
    }
}

impl<T: FieldValue> fmt::Debug for Constant<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Constant").field(&self.value).finish()
    }
}

impl fmt::Debug for GenericConstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GenericConstant").field(&self.value).finish()
    }
}
