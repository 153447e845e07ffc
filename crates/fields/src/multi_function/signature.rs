use crate::dynamic::{FieldValue, ValueType};
use std::fmt::{self, Display};

/// How a function uses a parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InterfaceType {
    /// Read only.
    Input,
    /// Written for every index of the mask, never read.
    Output,
    /// Read and then overwritten in place.
    Mutable,
}

/// What a parameter stores per index: one value or a vector of values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataType {
    Single(&'static dyn ValueType),
    Vector(&'static dyn ValueType),
}

impl DataType {
    pub fn single<T: FieldValue>() -> Self {
        Self::Single(T::value_type())
    }

    pub fn vector<T: FieldValue>() -> Self {
        Self::Vector(T::value_type())
    }

    /// The value type, or the element type for vectors.
    pub fn value_type(&self) -> &'static dyn ValueType {
        match self {
            Self::Single(ty) | Self::Vector(ty) => *ty,
        }
    }

    pub fn is_single(&self) -> bool {
        matches!(self, Self::Single(_))
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, Self::Vector(_))
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(ty) => f.write_str(ty.name()),
            Self::Vector(ty) => write!(f, "Vector<{}>", ty.name()),
        }
    }
}

/// The six ways a parameter can be passed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamCategory {
    SingleInput,
    VectorInput,
    SingleOutput,
    VectorOutput,
    SingleMutable,
    VectorMutable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParamType {
    interface: InterfaceType,
    data_type: DataType,
}

impl ParamType {
    pub const fn new(interface: InterfaceType, data_type: DataType) -> Self {
        Self {
            interface,
            data_type,
        }
    }

    pub fn interface_type(&self) -> InterfaceType {
        self.interface
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn category(&self) -> ParamCategory {
        match (self.interface, self.data_type) {
            (InterfaceType::Input, DataType::Single(_)) => ParamCategory::SingleInput,
            (InterfaceType::Input, DataType::Vector(_)) => ParamCategory::VectorInput,
            (InterfaceType::Output, DataType::Single(_)) => ParamCategory::SingleOutput,
            (InterfaceType::Output, DataType::Vector(_)) => ParamCategory::VectorOutput,
            (InterfaceType::Mutable, DataType::Single(_)) => ParamCategory::SingleMutable,
            (InterfaceType::Mutable, DataType::Vector(_)) => ParamCategory::VectorMutable,
        }
    }

    pub fn is_input_or_mutable(&self) -> bool {
        matches!(self.interface, InterfaceType::Input | InterfaceType::Mutable)
    }

    pub fn is_output_or_mutable(&self) -> bool {
        matches!(self.interface, InterfaceType::Output | InterfaceType::Mutable)
    }
}

impl Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let interface = match self.interface {
            InterfaceType::Input => "in",
            InterfaceType::Output => "out",
            InterfaceType::Mutable => "mut",
        };
        write!(f, "{interface} {}", self.data_type)
    }
}

/// Name and ordered parameter list of a multi-function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    params: Vec<(ParamType, String)>,
}

impl Signature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub fn param_type(&self, index: usize) -> ParamType {
        self.params[index].0
    }

    pub fn param_name(&self, index: usize) -> &str {
        &self.params[index].1
    }

    pub fn params(&self) -> impl Iterator<Item = ParamType> + '_ {
        self.params.iter().map(|(param_type, _)| *param_type)
    }

    pub fn input_count(&self) -> usize {
        self.params()
            .filter(|param| param.interface_type() == InterfaceType::Input)
            .count()
    }

    pub fn output_count(&self) -> usize {
        self.params()
            .filter(|param| param.interface_type() == InterfaceType::Output)
            .count()
    }

    pub fn add(&mut self, name: impl Into<String>, param_type: ParamType) {
        self.params.push((param_type, name.into()));
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (index, (param_type, name)) in self.params.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param_type} {name}")?;
        }
        f.write_str(")")
    }
}

/// Builds a [`Signature`] one parameter at a time.
///
/// ```
/// use fields::{ParamCategory, SignatureBuilder};
///
/// let signature = SignatureBuilder::new("mix")
///     .single_input::<f32>("a")
///     .single_input::<f32>("b")
///     .single_output::<f32>("result")
///     .build();
/// assert_eq!(signature.param_count(), 3);
/// assert_eq!(signature.param_type(2).category(), ParamCategory::SingleOutput);
/// ```
#[derive(Clone, Debug)]
pub struct SignatureBuilder {
    signature: Signature,
}

impl SignatureBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            signature: Signature::new(name),
        }
    }

    pub fn add(mut self, name: impl Into<String>, param_type: ParamType) -> Self {
        self.signature.add(name, param_type);
        self
    }

    pub fn input(self, name: impl Into<String>, data_type: DataType) -> Self {
        self.add(name, ParamType::new(InterfaceType::Input, data_type))
    }

    pub fn output(self, name: impl Into<String>, data_type: DataType) -> Self {
        self.add(name, ParamType::new(InterfaceType::Output, data_type))
    }

    pub fn mutable(self, name: impl Into<String>, data_type: DataType) -> Self {
        self.add(name, ParamType::new(InterfaceType::Mutable, data_type))
    }

    pub fn single_input<T: FieldValue>(self, name: impl Into<String>) -> Self {
        self.input(name, DataType::single::<T>())
    }

    pub fn single_output<T: FieldValue>(self, name: impl Into<String>) -> Self {
        self.output(name, DataType::single::<T>())
    }

    pub fn single_mutable<T: FieldValue>(self, name: impl Into<String>) -> Self {
        self.mutable(name, DataType::single::<T>())
    }

    pub fn vector_input<T: FieldValue>(self, name: impl Into<String>) -> Self {
        self.input(name, DataType::vector::<T>())
    }

    pub fn vector_output<T: FieldValue>(self, name: impl Into<String>) -> Self {
        self.output(name, DataType::vector::<T>())
    }

    pub fn vector_mutable<T: FieldValue>(self, name: impl Into<String>) -> Self {
        self.mutable(name, DataType::vector::<T>())
    }

    pub fn build(self) -> Signature {
        self.signature
    }
}
