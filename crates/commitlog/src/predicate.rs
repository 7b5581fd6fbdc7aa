//! Series filtering.

use quill_core::Ident;
use std::sync::Arc;

/// Decides whether a series is returned by the reader.
///
/// Called with `(series_id, namespace)` once per series, when its metadata is
/// first resolved. Must be pure: the answer is cached for every later
/// datapoint of the series.
pub type SeriesPredicate = Arc<dyn Fn(&Ident, &Ident) -> bool + Send + Sync>;

/// Predicate that accepts every series.
pub fn read_all_series() -> SeriesPredicate {
    Arc::new(|_: &Ident, _: &Ident| true)
}

/// Predicate that accepts only series in `namespace`.
pub fn in_namespace(namespace: impl Into<Ident>) -> SeriesPredicate {
    let namespace = namespace.into();
    Arc::new(move |_: &Ident, ns: &Ident| *ns == namespace)
}
