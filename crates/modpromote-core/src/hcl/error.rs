//! Errors for the HCL codec

use thiserror::Error;

/// Failures reading or interpreting HCL text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HclError {
    #[error("syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },

    /// The expression is not a plain literal (references, function calls,
    /// template interpolation)
    #[error("expression is not a literal value: {expr}")]
    NotLiteral { expr: String },

    #[error("{file}: expected a '{kind}' block")]
    MissingBlock { kind: String, file: String },

    #[error("{file}: unexpected {what}")]
    Unexpected { what: String, file: String },

    #[error("block {block} is missing attribute '{name}'")]
    MissingAttribute { block: String, name: String },

    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },

    #[error("missing file {path}")]
    MissingFile { path: String },
}
