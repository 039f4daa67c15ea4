//! Configuration-to-evaluation pipeline.
//!
//! Exercises the whole path a policy takes: parsed configuration tree to
//! boolean expression, fileclass registration and set-expression resolution,
//! then evaluation against attribute sets, including the attribute-mask
//! contract (fetch what the expression reads, or evaluation stays
//! Indeterminate).
