use super::{Context, MultiFunction, Params};
use crate::{config::EvaluationConfig, index_mask::IndexMask};
use rayon::prelude::*;

/// Calls `function`, splitting the mask into chunks when that is worthwhile.
///
/// Chunks run on the rayon pool when parallel execution is enabled and the
/// mask is large enough for the function's grain size. Functions that
/// allocate memory proportional to the mask are also split when running on
/// the calling thread, to bound their memory use. Every chunk gets disjoint
/// sub-spans of the output parameters, so no synchronization is needed.
pub fn call_auto(
    function: &dyn MultiFunction,
    mask: &IndexMask,
    mut params: Params<'_>,
    context: &Context<'_>,
    config: &EvaluationConfig,
) {
    if mask.is_empty() {
        return;
    }

    let hints = function.execution_hints();
    let grain_size = if hints.uniform_execution_time {
        hints.min_grain_size
    } else {
        hints.min_grain_size / 4
    }
    .max(1);

    let parallel = config.parallel
        && mask.len() >= config.min_parallel_size
        && mask.len() > grain_size
        && rayon::current_num_threads() > 1;
    let split_sequentially = !parallel && hints.allocates_array && mask.len() > grain_size;

    if params.has_vector_outputs() || !(parallel || split_sequentially) {
        function.call(mask, &mut params, context);
        return;
    }

    let max_chunks = if parallel {
        config.chunk_limit()
    } else {
        usize::MAX
    };
    let chunks = mask.chunks(grain_size, max_chunks);
    if chunks.len() <= 1 {
        function.call(mask, &mut params, context);
        return;
    }

    let boundaries: Vec<usize> = chunks[1..].iter().filter_map(IndexMask::first).collect();
    let chunk_params = params.split_at_indices(&boundaries);
    tracing::trace!(
        function = %function.debug_name(),
        indices = mask.len(),
        chunks = chunks.len(),
        parallel,
        "splitting multi-function call"
    );

    if parallel {
        chunks
            .into_par_iter()
            .zip(chunk_params)
            .for_each(|(chunk, mut params)| function.call(&chunk, &mut params, context));
    } else {
        for (chunk, mut params) in chunks.into_iter().zip(chunk_params) {
            function.call(&chunk, &mut params, context);
        }
    }
}
