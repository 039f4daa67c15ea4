//! Error types for the policy subsystem.

use thiserror::Error;

/// Result type alias for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Error variants for policy expression building and resolution.
///
/// Parse-time variants carry the source line number of the offending
/// configuration item so operators can locate the mistake.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The criterion name does not map to any known attribute.
    #[error("unknown criterion '{name}' (line {line})")]
    UnknownCriterion {
        /// The criterion name as written in the configuration.
        name: String,
        /// Source line number.
        line: u32,
    },

    /// The operator is not legal for this criterion (e.g. ordering on a path).
    #[error("operator '{op}' is not allowed for criterion '{criterion}' (line {line})")]
    IllegalOperator {
        /// The criterion name.
        criterion: String,
        /// The operator token.
        op: String,
        /// Source line number.
        line: u32,
    },

    /// A numeric, size, or duration literal could not be parsed.
    #[error("cannot parse '{text}' as {expected} (line {line})")]
    BadLiteral {
        /// The literal as written.
        text: String,
        /// What kind of value was expected.
        expected: &'static str,
        /// Source line number.
        line: u32,
    },

    /// An any-level wildcard `**` is not delimited by path separators.
    #[error("invalid any-level wildcard in '{pattern}': '**' must be surrounded by '/' (line {line})")]
    BadAnyLevelWildcard {
        /// The offending pattern.
        pattern: String,
        /// Source line number.
        line: u32,
    },

    /// A match operator was given a value without wildcard characters.
    #[error("match operator requires wildcard characters in '{pattern}' (line {line})")]
    MissingWildcard {
        /// The offending pattern.
        pattern: String,
        /// Source line number.
        line: u32,
    },

    /// A wildcard pattern failed to compile to a matcher.
    #[error("cannot compile pattern '{pattern}': {reason} (line {line})")]
    BadPattern {
        /// The offending pattern.
        pattern: String,
        /// Compiler diagnostic.
        reason: String,
        /// Source line number.
        line: u32,
    },

    /// A set expression references a fileclass that was never registered.
    #[error("undefined fileclass '{name}'")]
    UnknownFileclass {
        /// The class name as referenced.
        name: String,
    },

    /// A fileclass name was registered twice.
    #[error("fileclass '{name}' is already defined")]
    DuplicateFileclass {
        /// The conflicting class name.
        name: String,
    },

    /// A required configuration item or sub-block is missing.
    #[error("missing item '{name}' in block '{block}' (line {line})")]
    MissingItem {
        /// The expected item name.
        name: String,
        /// The enclosing block name.
        block: String,
        /// Line of the enclosing block.
        line: u32,
    },

    /// A boolean block has the wrong number of children (e.g. NOT with two).
    #[error("malformed boolean block '{block}': {reason} (line {line})")]
    MalformedBlock {
        /// The block name (AND/OR/NOT).
        block: String,
        /// What is wrong with it.
        reason: String,
        /// Source line number.
        line: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_line() {
        let err = PolicyError::UnknownCriterion {
            name: "frobnication".into(),
            line: 42,
        };
        let msg = err.to_string();
        assert!(msg.contains("frobnication"));
        assert!(msg.contains("42"));
    }

    #[test]
    fn test_policy_result_alias() {
        let ok: PolicyResult<u32> = Ok(7);
        assert!(ok.is_ok());
        let err: PolicyResult<u32> = Err(PolicyError::UnknownFileclass { name: "x".into() });
        assert!(err.is_err());
    }
}
