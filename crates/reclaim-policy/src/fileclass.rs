//! Fileclass registry and set-expression resolution.
//!
//! A fileclass is a named, pre-built boolean expression. Policies reference
//! classes by name and combine them with union, intersection, and negation;
//! resolving a reference aliases the registered `Arc` subtree, it never
//! copies it.

use crate::attr::AttrMask;
use crate::error::{PolicyError, PolicyResult};
use crate::expr::BoolExpr;
use std::sync::Arc;
use tracing::debug;

/// A named, registered policy expression.
#[derive(Clone, Debug)]
pub struct Fileclass {
    /// Class name as declared.
    pub name: String,
    /// The class definition.
    pub expr: Arc<BoolExpr>,
    /// Attributes the definition reads.
    pub mask: AttrMask,
}

/// Registry of named fileclasses. Read-only after configuration load; safe
/// to share across threads without locking.
#[derive(Default)]
pub struct FileclassRegistry {
    classes: Vec<Fileclass>,
}

impl FileclassRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a class definition. Names are unique case-insensitively.
    pub fn register(&mut self, name: &str, expr: Arc<BoolExpr>) -> PolicyResult<()> {
        if self.get(name).is_some() {
            return Err(PolicyError::DuplicateFileclass { name: name.into() });
        }
        let mask = expr.attr_mask();
        debug!(class = name, mask = mask.0, "registered fileclass");
        self.classes.push(Fileclass {
            name: name.to_string(),
            expr,
            mask,
        });
        Ok(())
    }

    /// Case-insensitive lookup by class name.
    pub fn get(&self, name: &str) -> Option<&Fileclass> {
        self.classes
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Number of registered classes.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Resolves a set expression into a boolean expression and the attribute
    /// mask it requires.
    ///
    /// Singleton references alias the registered subtree; union/intersection/
    /// negation allocate fresh nodes wrapping the resolved children.
    pub fn resolve(&self, set: &SetExpr) -> PolicyResult<(Arc<BoolExpr>, AttrMask)> {
        match set {
            SetExpr::Class(name) => {
                let class = self
                    .get(name)
                    .ok_or_else(|| PolicyError::UnknownFileclass { name: name.clone() })?;
                Ok((Arc::clone(&class.expr), class.mask))
            }
            SetExpr::Union(l, r) => {
                let (le, lm) = self.resolve(l)?;
                let (re, rm) = self.resolve(r)?;
                Ok((BoolExpr::or(le, re), lm.union(rm)))
            }
            SetExpr::Inter(l, r) => {
                let (le, lm) = self.resolve(l)?;
                let (re, rm) = self.resolve(r)?;
                Ok((BoolExpr::and(le, re), lm.union(rm)))
            }
            SetExpr::Not(inner) => {
                let (expr, mask) = self.resolve(inner)?;
                Ok((BoolExpr::not(expr), mask))
            }
        }
    }
}

/// Set expression over named fileclasses.
#[derive(Clone, Debug, PartialEq)]
pub enum SetExpr {
    /// A single class by name.
    Class(String),
    /// Entries in either class.
    Union(Box<SetExpr>, Box<SetExpr>),
    /// Entries in both classes.
    Inter(Box<SetExpr>, Box<SetExpr>),
    /// Entries not in the class.
    Not(Box<SetExpr>),
}
