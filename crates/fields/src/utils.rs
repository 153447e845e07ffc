/// Whether two possibly unsized references point at the same object.
pub(crate) fn same_object<A: ?Sized, B: ?Sized>(a: &A, b: &B) -> bool {
    a as *const A as *const () == b as *const B as *const ()
}

#[cfg(test)]
pub(crate) fn test_logger() {
    use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_env("FIELDS_LOG")
        .or_else(|_| EnvFilter::try_new("info"))
        .expect("valid default filter");
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_test_writer())
        .try_init();
}
