use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Syntax error at line {line}, column {column}: {message}")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("Unresolved identifier '{name}'")]
    UnresolvedIdentifier { name: String },

    #[error("Unsupported operation: {op}")]
    UnsupportedOperator { op: String },

    #[error("Unsupported expression: {kind}")]
    UnsupportedExpression { kind: String },

    #[error("Arity mismatch: expected {expected} inputs, got {got}")]
    ArityMismatch { expected: usize, got: usize },

    #[error("A network needs at least one layer")]
    EmptyNetwork,

    #[error("Layer width must be non-zero")]
    InvalidLayerWidth,

    #[error("Layer {index} expects {expected} inputs but the previous layer produces {got}")]
    LayerMismatch {
        index: usize,
        expected: usize,
        got: usize,
    },
}

impl GraphError {
    pub fn syntax(message: impl Into<String>, line: usize, column: usize) -> Self {
        GraphError::Syntax {
            message: message.into(),
            line,
            column,
        }
    }

    pub fn unexpected_char(ch: char, line: usize, column: usize) -> Self {
        GraphError::syntax(format!("Unexpected character '{}'", ch), line, column)
    }

    pub fn unresolved(name: impl Into<String>) -> Self {
        GraphError::UnresolvedIdentifier { name: name.into() }
    }

    /// True for failures raised while turning source text into an AST.
    pub fn is_syntax(&self) -> bool {
        matches!(self, GraphError::Syntax { .. })
    }
}
