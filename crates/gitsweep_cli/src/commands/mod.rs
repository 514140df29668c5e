pub(crate) mod completions;
pub(crate) mod limits;
pub(crate) mod migrate;
pub(crate) mod sync;
pub(crate) mod target;
