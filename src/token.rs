use std::fmt;

/// Token types recognized by the lexer
#[derive(Debug, Clone, PartialEq)]
pub enum TokenType {
    // Identifiers and Literals
    Identifier(String),
    /// Numeric literal together with the text it was written as
    Number { value: f64, raw: String },

    // Operators
    Plus,    // +
    Minus,   // -
    Star,    // *
    Slash,   // /
    Percent, // %
    Power,   // **
    Assign,  // =

    // Delimiters
    LParen,    // (
    RParen,    // )
    Semicolon, // ;

    // Special
    Newline,
    Eof,
}

/// A token with its type and position information
#[derive(Debug, Clone)]
pub struct Token {
    pub token_type: TokenType,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(token_type: TokenType, line: usize, column: usize) -> Self {
        Self {
            token_type,
            line,
            column,
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TokenType::Identifier(name) => write!(f, "identifier({})", name),
            TokenType::Number { raw, .. } => write!(f, "number({})", raw),
            TokenType::Plus => write!(f, "+"),
            TokenType::Minus => write!(f, "-"),
            TokenType::Star => write!(f, "*"),
            TokenType::Slash => write!(f, "/"),
            TokenType::Percent => write!(f, "%"),
            TokenType::Power => write!(f, "**"),
            TokenType::Assign => write!(f, "="),
            TokenType::LParen => write!(f, "("),
            TokenType::RParen => write!(f, ")"),
            TokenType::Semicolon => write!(f, ";"),
            TokenType::Newline => write!(f, "newline"),
            TokenType::Eof => write!(f, "end of input"),
        }
    }
}
