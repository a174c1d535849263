//! Secondary index maintenance
//!
//! Index entries are persisted KV state derived from items. Maintenance is
//! differential: every item transition maps to at most one delete and one
//! write per index, applied through the ambient KV handle so item and
//! index mutations share a transaction.

pub(crate) mod maintainer;
pub(crate) mod paths;
