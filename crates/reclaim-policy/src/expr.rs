//! Boolean policy expression model.
//!
//! Leaves are typed comparisons over entry attributes; inner nodes are
//! AND/OR/NOT. Subtrees are shared through `Arc`, so a policy referencing a
//! named fileclass aliases the registered definition instead of deep-copying
//! it, and nothing has to track which node "owns" which child.

use crate::attr::{AttrKind, AttrMask, EntryStatus, FileType};
use crate::error::{PolicyError, PolicyResult};
use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// Comparison operator of a policy condition.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CompareOp {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Greater or equal.
    Ge,
    /// Less than.
    Lt,
    /// Less or equal.
    Le,
    /// Wildcard match (shell glob, whole value).
    Like,
    /// Wildcard non-match.
    Unlike,
}

impl CompareOp {
    /// Whether this is an ordering operator (>, >=, <, <=).
    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            CompareOp::Gt | CompareOp::Ge | CompareOp::Lt | CompareOp::Le
        )
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Like => "matches",
            CompareOp::Unlike => "not-matches",
        };
        f.write_str(s)
    }
}

/// Typed value of a policy condition.
#[derive(Clone, Debug, PartialEq)]
pub enum TypedValue {
    /// String (paths, names, owners, pools).
    Str(String),
    /// Plain integer (dircount, stripe count).
    Int(i64),
    /// Size in bytes.
    Size(u64),
    /// Duration in seconds, compared against attribute age.
    Duration(u64),
    /// File type.
    Type(FileType),
    /// Synchronization status.
    Status(EntryStatus),
}

/// Returns true if the string contains shell wildcard metacharacters.
pub fn has_wildcards(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

/// Checks `**` placement: every occurrence must be delimited by `/` or a
/// string boundary on both sides.
fn validate_any_level(pattern: &str) -> bool {
    let bytes = pattern.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'*' && i + 1 < bytes.len() && bytes[i + 1] == b'*' {
            let before_ok = i == 0 || bytes[i - 1] == b'/';
            let after = i + 2;
            let after_ok = after == bytes.len() || bytes[after] == b'/';
            if !before_ok || !after_ok {
                return false;
            }
            i = after;
        } else {
            i += 1;
        }
    }
    true
}

/// Compiles a shell glob into an anchored regex matching the whole value.
///
/// In path mode, `*` and `?` stop at path separators and `**` spans any
/// number of levels (including zero when written as `a/**/b`). In plain
/// mode `*` and `?` are unrestricted and `**` collapses into `*`.
fn glob_to_regex(pattern: &str, path_mode: bool) -> Result<Regex, regex::Error> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    let bytes = pattern.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'*' => {
                if i + 1 < bytes.len() && bytes[i + 1] == b'*' {
                    if path_mode {
                        // "**/" spans zero or more whole levels; a trailing
                        // "**" spans the rest of the path.
                        if i + 2 < bytes.len() && bytes[i + 2] == b'/' {
                            re.push_str("(.*/)?");
                            i += 3;
                            continue;
                        }
                        re.push_str(".*");
                    } else {
                        re.push_str(".*");
                    }
                    i += 2;
                    continue;
                }
                re.push_str(if path_mode { "[^/]*" } else { ".*" });
                i += 1;
            }
            b'?' => {
                re.push_str(if path_mode { "[^/]" } else { "." });
                i += 1;
            }
            b'[' => {
                // Copy a character class through, translating leading '!'
                // to regex negation.
                let Some(end) = pattern[i + 1..].find(']').map(|p| i + 1 + p) else {
                    re.push_str("\\[");
                    i += 1;
                    continue;
                };
                re.push('[');
                let mut inner = &pattern[i + 1..end];
                if let Some(rest) = inner.strip_prefix('!') {
                    re.push('^');
                    inner = rest;
                }
                for c in inner.chars() {
                    if c == '\\' || c == '^' {
                        re.push('\\');
                    }
                    re.push(c);
                }
                re.push(']');
                i = end + 1;
            }
            _ => {
                let Some(c) = pattern[i..].chars().next() else {
                    break;
                };
                if regex_syntax_char(c) {
                    re.push('\\');
                }
                re.push(c);
                i += c.len_utf8();
            }
        }
    }
    re.push('$');
    Regex::new(&re)
}

fn regex_syntax_char(c: char) -> bool {
    matches!(
        c,
        '.' | '+' | '(' | ')' | '{' | '}' | '^' | '$' | '|' | '\\' | ']'
    )
}

/// A leaf predicate: `{criterion, operator, value}` plus a compiled matcher
/// for wildcard operators.
#[derive(Clone, Debug)]
pub struct Comparison {
    /// The attribute the condition reads.
    pub criterion: AttrKind,
    /// Comparison operator, after wildcard promotion.
    pub op: CompareOp,
    /// Right-hand value.
    pub value: TypedValue,
    /// Compiled glob matcher, present iff `op` is Like/Unlike.
    matcher: Option<Regex>,
}

impl Comparison {
    /// Builds a comparison, applying wildcard normalization.
    ///
    /// `=` / `!=` over a string containing wildcards are promoted to
    /// `matches` / `not-matches`; explicit match operators require wildcard
    /// characters. `**` placement is validated before compilation. `line` is
    /// the configuration source line, carried into any error.
    pub fn new(
        criterion: AttrKind,
        op: CompareOp,
        value: TypedValue,
        line: u32,
    ) -> PolicyResult<Self> {
        let mut op = op;
        let matcher = if let TypedValue::Str(ref s) = value {
            let wild = has_wildcards(s);
            op = match (op, wild) {
                (CompareOp::Eq, true) => CompareOp::Like,
                (CompareOp::Ne, true) => CompareOp::Unlike,
                (CompareOp::Like | CompareOp::Unlike, false) => {
                    return Err(PolicyError::MissingWildcard {
                        pattern: s.clone(),
                        line,
                    });
                }
                (op, _) => op,
            };
            if matches!(op, CompareOp::Like | CompareOp::Unlike) {
                let path_mode = criterion == AttrKind::Fullpath;
                if path_mode && !validate_any_level(s) {
                    return Err(PolicyError::BadAnyLevelWildcard {
                        pattern: s.clone(),
                        line,
                    });
                }
                if !path_mode && s.contains("**") && !validate_any_level(s) {
                    return Err(PolicyError::BadAnyLevelWildcard {
                        pattern: s.clone(),
                        line,
                    });
                }
                let re = glob_to_regex(s, path_mode).map_err(|e| PolicyError::BadPattern {
                    pattern: s.clone(),
                    reason: e.to_string(),
                    line,
                })?;
                Some(re)
            } else {
                None
            }
        } else {
            None
        };
        Ok(Self {
            criterion,
            op,
            value,
            matcher,
        })
    }

    /// Applies the compiled matcher to a candidate string.
    ///
    /// Only meaningful for Like/Unlike comparisons; returns false when no
    /// matcher was compiled.
    pub fn glob_matches(&self, candidate: &str) -> bool {
        self.matcher
            .as_ref()
            .map(|re| re.is_match(candidate))
            .unwrap_or(false)
    }
}

/// A node of a boolean policy expression tree.
#[derive(Clone, Debug)]
pub enum BoolExpr {
    /// Leaf condition.
    Condition(Comparison),
    /// Logical negation.
    Not(Arc<BoolExpr>),
    /// Logical conjunction.
    And(Arc<BoolExpr>, Arc<BoolExpr>),
    /// Logical disjunction.
    Or(Arc<BoolExpr>, Arc<BoolExpr>),
}

impl BoolExpr {
    /// Wraps a comparison as a leaf node.
    pub fn cond(cmp: Comparison) -> Arc<BoolExpr> {
        Arc::new(BoolExpr::Condition(cmp))
    }

    /// Negates an expression.
    pub fn not(child: Arc<BoolExpr>) -> Arc<BoolExpr> {
        Arc::new(BoolExpr::Not(child))
    }

    /// Conjunction of two expressions.
    pub fn and(left: Arc<BoolExpr>, right: Arc<BoolExpr>) -> Arc<BoolExpr> {
        Arc::new(BoolExpr::And(left, right))
    }

    /// Disjunction of two expressions.
    pub fn or(left: Arc<BoolExpr>, right: Arc<BoolExpr>) -> Arc<BoolExpr> {
        Arc::new(BoolExpr::Or(left, right))
    }

    /// Union of every attribute kind the expression reads.
    ///
    /// The driver fetches at least this set from the database before
    /// evaluating the expression, otherwise evaluation is Indeterminate.
    pub fn attr_mask(&self) -> AttrMask {
        match self {
            BoolExpr::Condition(cmp) => AttrMask::of(cmp.criterion),
            BoolExpr::Not(child) => child.attr_mask(),
            BoolExpr::And(l, r) | BoolExpr::Or(l, r) => l.attr_mask().union(r.attr_mask()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmp(criterion: AttrKind, op: CompareOp, value: TypedValue) -> Comparison {
        Comparison::new(criterion, op, value, 1).unwrap()
    }

    #[test]
    fn test_wildcard_promotion_eq() {
        let c = cmp(
            AttrKind::Name,
            CompareOp::Eq,
            TypedValue::Str("*.tmp".into()),
        );
        assert_eq!(c.op, CompareOp::Like);
    }

    #[test]
    fn test_wildcard_promotion_ne() {
        let c = cmp(
            AttrKind::Name,
            CompareOp::Ne,
            TypedValue::Str("core.?".into()),
        );
        assert_eq!(c.op, CompareOp::Unlike);
    }

    #[test]
    fn test_no_promotion_without_wildcards() {
        let c = cmp(
            AttrKind::Owner,
            CompareOp::Eq,
            TypedValue::Str("root".into()),
        );
        assert_eq!(c.op, CompareOp::Eq);
    }

    #[test]
    fn test_like_requires_wildcards() {
        let err = Comparison::new(
            AttrKind::Name,
            CompareOp::Like,
            TypedValue::Str("plain".into()),
            7,
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::MissingWildcard { line: 7, .. }));
    }

    #[test]
    fn test_any_level_rejected_without_separator() {
        let err = Comparison::new(
            AttrKind::Fullpath,
            CompareOp::Eq,
            TypedValue::Str("a/**b".into()),
            3,
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::BadAnyLevelWildcard { .. }));
    }

    #[test]
    fn test_any_level_accepted_with_separators() {
        let c = cmp(
            AttrKind::Fullpath,
            CompareOp::Eq,
            TypedValue::Str("/fs/**/scratch".into()),
        );
        assert_eq!(c.op, CompareOp::Like);
        assert!(c.glob_matches("/fs/scratch"));
        assert!(c.glob_matches("/fs/a/b/scratch"));
        assert!(!c.glob_matches("/fs/a/b/scratch/deeper"));
    }

    #[test]
    fn test_path_star_does_not_cross_separator() {
        let c = cmp(
            AttrKind::Fullpath,
            CompareOp::Eq,
            TypedValue::Str("/fs/*/log".into()),
        );
        assert!(c.glob_matches("/fs/nodeA/log"));
        assert!(!c.glob_matches("/fs/nodeA/sub/log"));
    }

    #[test]
    fn test_path_question_mark_excludes_separator() {
        let c = cmp(
            AttrKind::Fullpath,
            CompareOp::Eq,
            TypedValue::Str("/fs/v?".into()),
        );
        assert!(c.glob_matches("/fs/v1"));
        assert!(!c.glob_matches("/fs/v/"));
    }

    #[test]
    fn test_plain_glob_matches_whole_value() {
        let c = cmp(
            AttrKind::Name,
            CompareOp::Eq,
            TypedValue::Str("*.log".into()),
        );
        assert!(c.glob_matches("daemon.log"));
        // Whole-value semantics, not substring search.
        assert!(!c.glob_matches("daemon.log.1"));
    }

    #[test]
    fn test_character_class() {
        let c = cmp(
            AttrKind::Name,
            CompareOp::Eq,
            TypedValue::Str("data[0-9]".into()),
        );
        assert!(c.glob_matches("data5"));
        assert!(!c.glob_matches("dataX"));
    }

    #[test]
    fn test_negated_character_class() {
        let c = cmp(
            AttrKind::Name,
            CompareOp::Eq,
            TypedValue::Str("data[!0-9]".into()),
        );
        assert!(c.glob_matches("dataX"));
        assert!(!c.glob_matches("data5"));
    }

    #[test]
    fn test_regex_metachars_are_literal() {
        let c = cmp(
            AttrKind::Name,
            CompareOp::Eq,
            TypedValue::Str("a.b*".into()),
        );
        assert!(c.glob_matches("a.bc"));
        assert!(!c.glob_matches("aXbc"));
    }

    #[test]
    fn test_attr_mask_accumulates_over_tree() {
        let left = BoolExpr::cond(cmp(
            AttrKind::Size,
            CompareOp::Gt,
            TypedValue::Size(1 << 20),
        ));
        let right = BoolExpr::cond(cmp(
            AttrKind::Owner,
            CompareOp::Eq,
            TypedValue::Str("batch".into()),
        ));
        let expr = BoolExpr::and(left, BoolExpr::not(right));
        let mask = expr.attr_mask();
        assert!(mask.contains(AttrKind::Size));
        assert!(mask.contains(AttrKind::Owner));
        assert!(!mask.contains(AttrKind::Fullpath));
    }

    #[test]
    fn test_shared_subtree_via_arc() {
        let shared = BoolExpr::cond(cmp(
            AttrKind::Group,
            CompareOp::Eq,
            TypedValue::Str("hpc".into()),
        ));
        let a = BoolExpr::not(Arc::clone(&shared));
        let b = BoolExpr::and(Arc::clone(&shared), a);
        // Both trees alias the same leaf.
        assert!(b.attr_mask().contains(AttrKind::Group));
        assert!(Arc::strong_count(&shared) >= 2);
    }
}
