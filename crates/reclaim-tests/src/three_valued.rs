//! Algebraic laws of three-valued policy evaluation.
//!
//! The evaluator implements Kleene's strong three-valued logic: these tests
//! pin the full truth tables and the laws (commutativity, double negation,
//! De Morgan) that follow from them, over arbitrary expression shapes.
