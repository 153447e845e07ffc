use crate::{
    dynamic::GVArray,
    field::{FieldContext, FieldInput, FieldNodeKind, GFieldRef},
    hash::{HashMap, HashSet, OrderedMap},
    index_mask::IndexMask,
    resource_scope::ResourceScope,
};

/// Facts about the graph behind a set of fields, shared by the partition
/// and the lowering.
#[derive(Default)]
pub(crate) struct FieldTreeInfo<'a> {
    /// The fields that consume each field.
    pub field_users: HashMap<GFieldRef<'a>, Vec<GFieldRef<'a>>>,
    /// Every structurally distinct input in the graph, keyed by its field.
    pub deduplicated_field_inputs: OrderedMap<GFieldRef<'a>, &'a dyn FieldInput>,
}

impl<'a> FieldTreeInfo<'a> {
    pub fn users(&self, field: &GFieldRef<'a>) -> &[GFieldRef<'a>] {
        self.field_users
            .get(field)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Walks the graph behind `fields` once, recording who uses every field
/// and which inputs are reached. Structurally equal subgraphs are visited
/// once.
#[tracing::instrument(skip_all)]
pub(crate) fn preprocess_field_tree<'a, I>(fields: I) -> FieldTreeInfo<'a>
where
    I: IntoIterator<Item = GFieldRef<'a>>,
{
    let mut info = FieldTreeInfo::default();
    let mut handled: HashSet<GFieldRef<'a>> = HashSet::default();
    let mut stack: Vec<GFieldRef<'a>> = fields
        .into_iter()
        .filter(|field| handled.insert(*field))
        .collect();

    while let Some(field) = stack.pop() {
        match field.node().kind() {
            FieldNodeKind::Input(input) => {
                info.deduplicated_field_inputs
                    .entry(field)
                    .or_insert(&**input);
            }
            FieldNodeKind::Operation(operation) => {
                for input in operation.inputs() {
                    let input = input.field_ref();
                    info.field_users.entry(input).or_default().push(field);
                    if handled.insert(input) {
                        stack.push(input);
                    }
                }
            }
            FieldNodeKind::Constant(_) => {}
        }
    }

    tracing::trace!(
        visited = handled.len(),
        inputs = info.deduplicated_field_inputs.len(),
        "preprocessed field tree"
    );
    info
}

/// Asks the context for the values of every input, in the order of
/// [`FieldTreeInfo::deduplicated_field_inputs`]. Inputs the context can't
/// provide get the default value of their type.
pub(crate) fn get_field_context_inputs(
    scope: &ResourceScope,
    mask: &IndexMask,
    context: &dyn FieldContext,
    info: &FieldTreeInfo<'_>,
) -> Vec<GVArray> {
    info.deduplicated_field_inputs
        .values()
        .map(|input| {
            let varray = context
                .get_varray_for_input(*input, mask, scope)
                .unwrap_or_else(|| {
                    tracing::trace!(input = %input.debug_name(), "using default values for input");
                    GVArray::for_single_default(input.value_type(), mask.min_array_size())
                });
            debug_assert!(varray.value_type() == input.value_type());
            debug_assert!(varray.len() >= mask.min_array_size());
            varray
        })
        .collect()
}

/// The fields whose values differ between indices, i.e. everything that
/// depends on an input that isn't a single value. Only the shape of the
/// inputs matters, not their values.
pub(crate) fn find_varying_fields<'a>(
    info: &FieldTreeInfo<'a>,
    context_inputs: &[GVArray],
) -> HashSet<GFieldRef<'a>> {
    let mut varying = HashSet::default();
    let mut stack = Vec::new();

    let varying_inputs = info
        .deduplicated_field_inputs
        .keys()
        .zip(context_inputs)
        .filter(|(_, varray)| !varray.is_single());
    for (input, _) in varying_inputs {
        for user in info.users(input) {
            if varying.insert(*user) {
                stack.push(*user);
            }
        }
    }

    while let Some(field) = stack.pop() {
        for user in info.users(&field) {
            if varying.insert(*user) {
                stack.push(*user);
            }
        }
    }
    varying
}
