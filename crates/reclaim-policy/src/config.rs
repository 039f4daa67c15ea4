//! Building policy expressions from a parsed configuration tree.
//!
//! The configuration lexer/parser lives outside this crate; it hands us a
//! pre-parsed tree of blocks and key/operator/value items, each tagged with
//! its source line. This module maps criterion names to attribute kinds,
//! checks operator legality, parses typed literals (integers, sizes,
//! durations, type names), and assembles boolean trees from AND/OR/NOT
//! blocks.

use crate::attr::{AttrKind, EntryStatus, FileType};
use crate::error::{PolicyError, PolicyResult};
use crate::expr::{BoolExpr, CompareOp, Comparison, TypedValue};
use std::sync::Arc;

/// A parsed configuration item: `key <op> value`, with source line.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigItem {
    /// Left-hand key (criterion or parameter name).
    pub key: String,
    /// Operator token as written (`==`, `!=`, `>`, `>=`, `<`, `<=`).
    pub op: String,
    /// Right-hand value, unparsed.
    pub value: String,
    /// Extra option arguments attached to the item.
    pub options: Vec<String>,
    /// Source line number.
    pub line: u32,
}

/// A parsed configuration block: named, holding items and nested blocks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConfigBlock {
    /// Block name (`AND`, `OR`, `NOT`, or a section name).
    pub name: String,
    /// Source line of the block opener.
    pub line: u32,
    /// Direct key/value items.
    pub items: Vec<ConfigItem>,
    /// Nested sub-blocks.
    pub blocks: Vec<ConfigBlock>,
}

impl ConfigBlock {
    /// Finds a direct sub-block by name, case-insensitively.
    pub fn get_block(&self, name: &str) -> Option<&ConfigBlock> {
        self.blocks.iter().find(|b| b.name.eq_ignore_ascii_case(name))
    }

    /// Finds a direct item by key, case-insensitively.
    pub fn get_item(&self, key: &str) -> Option<&ConfigItem> {
        self.items.iter().find(|i| i.key.eq_ignore_ascii_case(key))
    }
}

/// Value kind a criterion expects on its right-hand side.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ValueKind {
    Str,
    Int,
    Size,
    Duration,
    Type,
    Status,
}

/// Maps a criterion name to its attribute kind and expected value kind.
fn criterion_from_name(name: &str) -> Option<(AttrKind, ValueKind)> {
    let kind = match name.to_ascii_lowercase().as_str() {
        "path" | "fullpath" => (AttrKind::Fullpath, ValueKind::Str),
        "name" => (AttrKind::Name, ValueKind::Str),
        "parent" | "parent_id" => (AttrKind::ParentId, ValueKind::Int),
        "type" => (AttrKind::Type, ValueKind::Type),
        "size" => (AttrKind::Size, ValueKind::Size),
        "owner" => (AttrKind::Owner, ValueKind::Str),
        "group" => (AttrKind::Group, ValueKind::Str),
        "last_access" => (AttrKind::LastAccess, ValueKind::Duration),
        "last_mod" | "last_modification" => (AttrKind::LastMod, ValueKind::Duration),
        "dircount" => (AttrKind::DirCount, ValueKind::Int),
        "stripe_count" | "ost_count" => (AttrKind::StripeCount, ValueKind::Int),
        "pool" | "ost_pool" => (AttrKind::PoolName, ValueKind::Str),
        "status" => (AttrKind::Status, ValueKind::Status),
        "fileclass" => (AttrKind::Fileclass, ValueKind::Str),
        _ => return None,
    };
    Some(kind)
}

fn op_from_token(token: &str) -> Option<CompareOp> {
    let op = match token {
        "==" | "=" => CompareOp::Eq,
        "!=" | "<>" => CompareOp::Ne,
        ">" => CompareOp::Gt,
        ">=" => CompareOp::Ge,
        "<" => CompareOp::Lt,
        "<=" => CompareOp::Le,
        _ => return None,
    };
    Some(op)
}

/// Parses a size literal like `512`, `16KB`, `1.5GB` (1024-based units).
pub fn parse_size(text: &str, line: u32) -> PolicyResult<u64> {
    let text = text.trim();
    let split = text
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(text.len());
    let (num, unit) = text.split_at(split);
    let value: f64 = num.trim().parse().map_err(|_| PolicyError::BadLiteral {
        text: text.into(),
        expected: "size",
        line,
    })?;
    let mult: u64 = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1 << 10,
        "MB" | "M" => 1 << 20,
        "GB" | "G" => 1 << 30,
        "TB" | "T" => 1 << 40,
        "PB" | "P" => 1 << 50,
        _ => {
            return Err(PolicyError::BadLiteral {
                text: text.into(),
                expected: "size",
                line,
            })
        }
    };
    if value < 0.0 {
        return Err(PolicyError::BadLiteral {
            text: text.into(),
            expected: "size",
            line,
        });
    }
    Ok((value * mult as f64) as u64)
}

/// Parses a duration literal like `30`, `15d`, `1h 30min`, `2w` into seconds.
pub fn parse_duration(text: &str, line: u32) -> PolicyResult<u64> {
    let bad = || PolicyError::BadLiteral {
        text: text.into(),
        expected: "duration",
        line,
    };
    let mut total: u64 = 0;
    let mut num = String::new();
    let mut unit = String::new();
    let mut saw_any = false;

    let flush = |num: &mut String, unit: &mut String, total: &mut u64| -> PolicyResult<()> {
        if num.is_empty() {
            return if unit.is_empty() { Ok(()) } else { Err(bad()) };
        }
        let n: u64 = num.parse().map_err(|_| bad())?;
        let mult = match unit.to_ascii_lowercase().as_str() {
            "" | "s" | "sec" => 1,
            "min" | "m" => 60,
            "h" | "hour" => 3600,
            "d" | "day" => 86_400,
            "w" | "week" => 604_800,
            "y" | "year" => 31_536_000,
            _ => return Err(bad()),
        };
        *total += n * mult;
        num.clear();
        unit.clear();
        Ok(())
    };

    for c in text.trim().chars() {
        if c.is_ascii_digit() {
            if !unit.is_empty() {
                flush(&mut num, &mut unit, &mut total)?;
            }
            num.push(c);
            saw_any = true;
        } else if c.is_ascii_alphabetic() {
            if num.is_empty() {
                return Err(bad());
            }
            unit.push(c);
        } else if c.is_whitespace() {
            flush(&mut num, &mut unit, &mut total)?;
        } else {
            return Err(bad());
        }
    }
    flush(&mut num, &mut unit, &mut total)?;
    if !saw_any {
        return Err(bad());
    }
    Ok(total)
}

fn parse_type(text: &str, line: u32) -> PolicyResult<FileType> {
    let t = match text.trim().to_ascii_lowercase().as_str() {
        "file" | "regular" => FileType::File,
        "directory" | "dir" => FileType::Directory,
        "symlink" | "link" => FileType::Symlink,
        "other" => FileType::Other,
        _ => {
            return Err(PolicyError::BadLiteral {
                text: text.into(),
                expected: "file type",
                line,
            })
        }
    };
    Ok(t)
}

fn parse_status(text: &str, line: u32) -> PolicyResult<EntryStatus> {
    let s = match text.trim().to_ascii_lowercase().as_str() {
        "new" => EntryStatus::New,
        "synchronized" | "synchro" => EntryStatus::Synchronized,
        "modified" => EntryStatus::Modified,
        "transfer_in_progress" | "archiving" | "restoring" => EntryStatus::TransferInProgress,
        "unknown" => EntryStatus::Unknown,
        "invalid" => EntryStatus::Invalid,
        _ => {
            return Err(PolicyError::BadLiteral {
                text: text.into(),
                expected: "status",
                line,
            })
        }
    };
    Ok(s)
}

/// Builds a leaf comparison from one configuration item.
///
/// Validates the criterion name, operator legality (ordering operators are
/// only allowed on numeric and duration criteria), and the literal syntax.
/// Wildcard promotion happens in [`Comparison::new`].
pub fn build_condition(item: &ConfigItem) -> PolicyResult<Comparison> {
    let (criterion, value_kind) =
        criterion_from_name(&item.key).ok_or_else(|| PolicyError::UnknownCriterion {
            name: item.key.clone(),
            line: item.line,
        })?;
    let op = op_from_token(&item.op).ok_or_else(|| PolicyError::IllegalOperator {
        criterion: item.key.clone(),
        op: item.op.clone(),
        line: item.line,
    })?;

    let ordering_ok = matches!(
        value_kind,
        ValueKind::Int | ValueKind::Size | ValueKind::Duration
    );
    if op.is_ordering() && !ordering_ok {
        return Err(PolicyError::IllegalOperator {
            criterion: item.key.clone(),
            op: item.op.clone(),
            line: item.line,
        });
    }

    let value = match value_kind {
        ValueKind::Str => TypedValue::Str(item.value.clone()),
        ValueKind::Int => TypedValue::Int(item.value.trim().parse().map_err(|_| {
            PolicyError::BadLiteral {
                text: item.value.clone(),
                expected: "integer",
                line: item.line,
            }
        })?),
        ValueKind::Size => TypedValue::Size(parse_size(&item.value, item.line)?),
        ValueKind::Duration => TypedValue::Duration(parse_duration(&item.value, item.line)?),
        ValueKind::Type => TypedValue::Type(parse_type(&item.value, item.line)?),
        ValueKind::Status => TypedValue::Status(parse_status(&item.value, item.line)?),
    };

    Comparison::new(criterion, op, value, item.line)
}

/// Builds a boolean expression from an AND/OR/NOT block.
///
/// Items are leaf conditions; nested blocks recurse. `NOT` takes exactly one
/// child; `AND`/`OR` fold two or more left-to-right. A block whose name is
/// not a boolean connector is treated as an implicit `AND` over its children
/// (the common "condition { ... }" form).
pub fn build_bool_expr(block: &ConfigBlock) -> PolicyResult<Arc<BoolExpr>> {
    let mut children: Vec<Arc<BoolExpr>> = Vec::new();
    for item in &block.items {
        children.push(BoolExpr::cond(build_condition(item)?));
    }
    for sub in &block.blocks {
        children.push(build_bool_expr(sub)?);
    }

    let connector = block.name.to_ascii_uppercase();
    match connector.as_str() {
        "NOT" => match (children.len(), children.pop()) {
            (1, Some(child)) => Ok(BoolExpr::not(child)),
            (n, _) => Err(PolicyError::MalformedBlock {
                block: block.name.clone(),
                reason: format!("expected exactly 1 child, found {n}"),
                line: block.line,
            }),
        },
        "OR" => fold(children, BoolExpr::or, block),
        // Anything else, including explicit "AND", is a conjunction.
        _ => fold(children, BoolExpr::and, block),
    }
}

fn fold(
    mut children: Vec<Arc<BoolExpr>>,
    combine: fn(Arc<BoolExpr>, Arc<BoolExpr>) -> Arc<BoolExpr>,
    block: &ConfigBlock,
) -> PolicyResult<Arc<BoolExpr>> {
    if children.is_empty() {
        return Err(PolicyError::MalformedBlock {
            block: block.name.clone(),
            reason: "empty boolean block".into(),
            line: block.line,
        });
    }
    let mut expr = children.remove(0);
    for next in children {
        expr = combine(expr, next);
    }
    Ok(expr)
}
