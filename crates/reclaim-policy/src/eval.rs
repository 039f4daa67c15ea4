//! Three-valued policy expression evaluation.
//!
//! `Indeterminate` is load-bearing: it means "a required attribute is not in
//! the attribute set," so the caller must fetch more attributes before the
//! policy can be decided. It is never collapsed into `NoMatch`.

use crate::attr::{AttrKind, EntryAttrs};
use crate::expr::{BoolExpr, CompareOp, Comparison, TypedValue};
use tracing::trace;

/// Result of evaluating a policy expression against an attribute set.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PolicyMatch {
    /// The entry matches the expression.
    Match,
    /// The entry does not match.
    NoMatch,
    /// A required attribute is missing; the result cannot be decided yet.
    Indeterminate,
}

impl PolicyMatch {
    fn negate(self) -> PolicyMatch {
        match self {
            PolicyMatch::Match => PolicyMatch::NoMatch,
            PolicyMatch::NoMatch => PolicyMatch::Match,
            // NOT of unknown is unknown.
            PolicyMatch::Indeterminate => PolicyMatch::Indeterminate,
        }
    }

    fn from_bool(b: bool) -> PolicyMatch {
        if b {
            PolicyMatch::Match
        } else {
            PolicyMatch::NoMatch
        }
    }
}

/// Evaluates `expr` against `attrs` at time `now` (epoch seconds).
///
/// `now` anchors duration criteria: a condition like `last_mod > 30d`
/// compares the attribute's age (`now - last_mod`) to the duration value.
/// AND short-circuits on `NoMatch`, OR on `Match`; an `Indeterminate` side
/// only surfaces when the other side cannot decide the result alone.
pub fn evaluate(expr: &BoolExpr, attrs: &EntryAttrs, now: u64) -> PolicyMatch {
    match expr {
        BoolExpr::Condition(cmp) => {
            let result = eval_condition(cmp, attrs, now);
            trace!(criterion = %cmp.criterion, op = %cmp.op, ?result, "condition evaluated");
            result
        }
        BoolExpr::Not(child) => evaluate(child, attrs, now).negate(),
        BoolExpr::And(l, r) => match evaluate(l, attrs, now) {
            PolicyMatch::NoMatch => PolicyMatch::NoMatch,
            left => match (left, evaluate(r, attrs, now)) {
                (_, PolicyMatch::NoMatch) => PolicyMatch::NoMatch,
                (PolicyMatch::Indeterminate, _) | (_, PolicyMatch::Indeterminate) => {
                    PolicyMatch::Indeterminate
                }
                _ => PolicyMatch::Match,
            },
        },
        BoolExpr::Or(l, r) => match evaluate(l, attrs, now) {
            PolicyMatch::Match => PolicyMatch::Match,
            left => match (left, evaluate(r, attrs, now)) {
                (_, PolicyMatch::Match) => PolicyMatch::Match,
                (PolicyMatch::Indeterminate, _) | (_, PolicyMatch::Indeterminate) => {
                    PolicyMatch::Indeterminate
                }
                _ => PolicyMatch::NoMatch,
            },
        },
    }
}

fn eval_condition(cmp: &Comparison, attrs: &EntryAttrs, now: u64) -> PolicyMatch {
    match cmp.criterion {
        AttrKind::Fullpath => eval_str(cmp, attrs.fullpath.as_deref()),
        AttrKind::Name => eval_str(cmp, attrs.name.as_deref()),
        AttrKind::Owner => eval_str(cmp, attrs.owner.as_deref()),
        AttrKind::Group => eval_str(cmp, attrs.group.as_deref()),
        AttrKind::PoolName => eval_str(cmp, attrs.pool_name.as_deref()),
        AttrKind::Fileclass => eval_str(cmp, attrs.fileclass.as_deref()),
        AttrKind::Size => eval_u64(cmp, attrs.size),
        AttrKind::DirCount => eval_u64(cmp, attrs.dircount),
        AttrKind::StripeCount => eval_u64(cmp, attrs.stripe_count.map(u64::from)),
        AttrKind::LastAccess => eval_age(cmp, attrs.last_access, now),
        AttrKind::LastMod => eval_age(cmp, attrs.last_mod, now),
        AttrKind::ParentId => {
            let Some(parent) = attrs.parent else {
                return PolicyMatch::Indeterminate;
            };
            match (&cmp.value, cmp.op) {
                (TypedValue::Int(v), CompareOp::Eq) => {
                    PolicyMatch::from_bool(parent.inode == *v as u64)
                }
                (TypedValue::Int(v), CompareOp::Ne) => {
                    PolicyMatch::from_bool(parent.inode != *v as u64)
                }
                _ => PolicyMatch::NoMatch,
            }
        }
        AttrKind::Type => {
            let Some(ftype) = attrs.ftype else {
                return PolicyMatch::Indeterminate;
            };
            match (&cmp.value, cmp.op) {
                (TypedValue::Type(v), CompareOp::Eq) => PolicyMatch::from_bool(ftype == *v),
                (TypedValue::Type(v), CompareOp::Ne) => PolicyMatch::from_bool(ftype != *v),
                _ => PolicyMatch::NoMatch,
            }
        }
        AttrKind::Status => {
            let Some(status) = attrs.status else {
                return PolicyMatch::Indeterminate;
            };
            match (&cmp.value, cmp.op) {
                (TypedValue::Status(v), CompareOp::Eq) => PolicyMatch::from_bool(status == *v),
                (TypedValue::Status(v), CompareOp::Ne) => PolicyMatch::from_bool(status != *v),
                _ => PolicyMatch::NoMatch,
            }
        }
    }
}

fn eval_str(cmp: &Comparison, attr: Option<&str>) -> PolicyMatch {
    let Some(actual) = attr else {
        return PolicyMatch::Indeterminate;
    };
    let TypedValue::Str(ref expected) = cmp.value else {
        return PolicyMatch::NoMatch;
    };
    let result = match cmp.op {
        CompareOp::Eq => actual == expected,
        CompareOp::Ne => actual != expected,
        CompareOp::Like => cmp.glob_matches(actual),
        CompareOp::Unlike => !cmp.glob_matches(actual),
        // Ordering operators are rejected at build time for string criteria.
        _ => false,
    };
    PolicyMatch::from_bool(result)
}

fn eval_u64(cmp: &Comparison, attr: Option<u64>) -> PolicyMatch {
    let Some(actual) = attr else {
        return PolicyMatch::Indeterminate;
    };
    let expected = match cmp.value {
        TypedValue::Int(v) if v >= 0 => v as u64,
        TypedValue::Int(_) => return PolicyMatch::NoMatch,
        TypedValue::Size(v) => v,
        _ => return PolicyMatch::NoMatch,
    };
    PolicyMatch::from_bool(compare_ord(actual, expected, cmp.op))
}

/// Duration criteria compare the attribute's age against the configured
/// duration: `last_mod > 30d` reads "modified more than 30 days ago".
fn eval_age(cmp: &Comparison, attr: Option<u64>, now: u64) -> PolicyMatch {
    let Some(stamp) = attr else {
        return PolicyMatch::Indeterminate;
    };
    let TypedValue::Duration(expected) = cmp.value else {
        return PolicyMatch::NoMatch;
    };
    let age = now.saturating_sub(stamp);
    PolicyMatch::from_bool(compare_ord(age, expected, cmp.op))
}

fn compare_ord(actual: u64, expected: u64, op: CompareOp) -> bool {
    match op {
        CompareOp::Eq => actual == expected,
        CompareOp::Ne => actual != expected,
        CompareOp::Gt => actual > expected,
        CompareOp::Ge => actual >= expected,
        CompareOp::Lt => actual < expected,
        CompareOp::Le => actual <= expected,
        CompareOp::Like | CompareOp::Unlike => false,
    }
}
