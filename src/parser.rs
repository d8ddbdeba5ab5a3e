use crate::ast::*;
use crate::error::{GraphError, Result};
use crate::lexer::Lexer;
use crate::token::{Token, TokenType};

/// Deepest parenthesis nesting accepted before parsing fails
pub const MAX_NESTING: usize = 100;

/// Recursive-descent parser for the assignment language.
/// Converts a stream of tokens into a [`Program`].
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    /// Open parentheses; newlines are insignificant while this is non-zero
    depth: usize,
}

/// Tokenize and parse `source` in one go.
pub fn parse_source(source: &str) -> Result<Program> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse()
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            current: 0,
            depth: 0,
        }
    }

    /// Parse a complete program
    pub fn parse(&mut self) -> Result<Program> {
        let mut program = Program::new();

        self.skip_separators();
        while !self.is_at_end() {
            let line = self.peek().line;
            let expression = self.parse_expression()?;
            program.push(expression, line);

            match self.peek().token_type {
                TokenType::Semicolon | TokenType::Newline => self.skip_separators(),
                TokenType::Eof => {}
                _ => return Err(self.error("Expected ';' or newline after statement")),
            }
        }

        Ok(program)
    }

    fn parse_expression(&mut self) -> Result<Expression> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expression> {
        let mut targets = Vec::new();
        let mut expr = self.parse_additive()?;

        while matches!(self.peek().token_type, TokenType::Assign) {
            let name = match &expr {
                Expression::Identifier { name } => name.clone(),
                _ => return Err(self.error("Invalid assignment target")),
            };
            self.advance();
            self.skip_newlines();
            targets.push(name);
            expr = self.parse_additive()?;
        }

        // Right-associative: the last target wraps the value first
        Ok(targets.into_iter().rev().fold(expr, |value, name| Expression::Assignment {
            name,
            value: Box::new(value),
        }))
    }

    fn parse_additive(&mut self) -> Result<Expression> {
        let mut expr = self.parse_multiplicative()?;

        while let Some(op) = self.match_additive() {
            self.skip_newlines();
            let right = self.parse_multiplicative()?;
            expr = Expression::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn parse_multiplicative(&mut self) -> Result<Expression> {
        let mut expr = self.parse_power()?;

        while let Some(op) = self.match_multiplicative() {
            self.skip_newlines();
            let right = self.parse_power()?;
            expr = Expression::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn parse_power(&mut self) -> Result<Expression> {
        let mut bases = Vec::new();
        let mut exponent = self.parse_unary()?;

        while matches!(self.peek().token_type, TokenType::Power) {
            self.advance();
            self.skip_newlines();
            bases.push(exponent);
            exponent = self.parse_unary()?;
        }

        // `a ** b ** c` is `a ** (b ** c)`
        Ok(bases.into_iter().rev().fold(exponent, |right, left| Expression::Binary {
            left: Box::new(left),
            op: BinaryOperator::Pow,
            right: Box::new(right),
        }))
    }

    fn parse_unary(&mut self) -> Result<Expression> {
        if !matches!(self.peek().token_type, TokenType::Minus) {
            return self.parse_primary();
        }

        self.advance();
        match self.peek().token_type {
            TokenType::Number { value, raw } => {
                self.advance();
                Ok(Expression::Literal {
                    value: -value,
                    raw: format!("-{}", raw),
                })
            }
            _ => Err(self.error("Unary '-' is only supported before a numeric literal")),
        }
    }

    fn parse_primary(&mut self) -> Result<Expression> {
        match self.peek().token_type {
            TokenType::Number { value, raw } => {
                self.advance();
                Ok(Expression::Literal { value, raw })
            }
            TokenType::Identifier(name) => {
                self.advance();
                Ok(Expression::Identifier { name })
            }
            TokenType::LParen => {
                if self.depth >= MAX_NESTING {
                    return Err(self.error(format!(
                        "Parentheses nested deeper than {}",
                        MAX_NESTING
                    )));
                }
                self.advance();
                self.depth += 1;
                let expr = self.parse_expression()?;
                self.consume(TokenType::RParen, "Expected ')'")?;
                self.depth -= 1;
                Ok(expr)
            }
            other => Err(self.error(format!("Unexpected token: {}", other))),
        }
    }

    // Helper methods

    fn match_additive(&mut self) -> Option<BinaryOperator> {
        let op = match self.peek().token_type {
            TokenType::Plus => BinaryOperator::Add,
            TokenType::Minus => BinaryOperator::Sub,
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn match_multiplicative(&mut self) -> Option<BinaryOperator> {
        let op = match self.peek().token_type {
            TokenType::Star => BinaryOperator::Mul,
            TokenType::Slash => BinaryOperator::Div,
            TokenType::Percent => BinaryOperator::Mod,
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn consume(&mut self, token_type: TokenType, message: &str) -> Result<()> {
        if std::mem::discriminant(&self.peek().token_type) == std::mem::discriminant(&token_type) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(message))
        }
    }

    fn error(&self, message: impl Into<String>) -> GraphError {
        let token = self.peek();
        GraphError::syntax(message, token.line, token.column)
    }

    fn skip_separators(&mut self) {
        while matches!(
            self.raw_peek().token_type,
            TokenType::Semicolon | TokenType::Newline
        ) {
            self.current += 1;
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.raw_peek().token_type, TokenType::Newline) {
            self.current += 1;
        }
    }

    /// Index of the next significant token
    fn position(&self) -> usize {
        let mut pos = self.current;
        if self.depth > 0 {
            while matches!(
                self.tokens.get(pos).map(|t| &t.token_type),
                Some(TokenType::Newline)
            ) {
                pos += 1;
            }
        }
        pos
    }

    fn raw_peek(&self) -> Token {
        self.tokens
            .get(self.current)
            .cloned()
            .unwrap_or_else(|| Token::new(TokenType::Eof, 0, 0))
    }

    fn peek(&self) -> Token {
        self.tokens
            .get(self.position())
            .cloned()
            .unwrap_or_else(|| Token::new(TokenType::Eof, 0, 0))
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.current = self.position() + 1;
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().token_type, TokenType::Eof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Box<Expression> {
        Box::new(Expression::Identifier { name: name.to_string() })
    }

    #[test]
    fn parse_statements_in_order() {
        let program = parse_source("a = 1; b = 2\nc = a + b").expect("should parse");
        assert_eq!(program.len(), 3);
        let names: Vec<_> = program
            .statements
            .iter()
            .filter_map(|s| s.as_assignment().map(|(n, _)| n.to_string()))
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(program.statements[2].line, 2);
    }

    #[test]
    fn parse_precedence_and_associativity() {
        // a - b - c * d parses as ((a - b) - (c * d))
        let program = parse_source("x = a - b - c * d").unwrap();
        let (_, value) = program.statements[0].as_assignment().unwrap();
        assert_eq!(
            *value,
            Expression::Binary {
                left: Box::new(Expression::Binary {
                    left: ident("a"),
                    op: BinaryOperator::Sub,
                    right: ident("b"),
                }),
                op: BinaryOperator::Sub,
                right: Box::new(Expression::Binary {
                    left: ident("c"),
                    op: BinaryOperator::Mul,
                    right: ident("d"),
                }),
            }
        );
    }

    #[test]
    fn parse_parentheses_span_lines() {
        let program = parse_source("x = (a +\n b) * 2").unwrap();
        assert_eq!(program.len(), 1);
        assert_eq!(program.statements[0].expression.to_string(), "x = ((a + b) * 2)");
    }

    #[test]
    fn parse_negative_literal() {
        let program = parse_source("x = -2.5").unwrap();
        let (_, value) = program.statements[0].as_assignment().unwrap();
        assert_eq!(
            *value,
            Expression::Literal { value: -2.5, raw: "-2.5".to_string() }
        );
    }

    #[test]
    fn parse_chained_assignment_is_right_associative() {
        let program = parse_source("a = b = 1").unwrap();
        let (name, value) = program.statements[0].as_assignment().unwrap();
        assert_eq!(name, "a");
        assert!(matches!(value, Expression::Assignment { name, .. } if name == "b"));
    }

    #[test]
    fn parse_power_is_right_associative() {
        let program = parse_source("x = a ** b ** c").unwrap();
        assert_eq!(program.statements[0].expression.to_string(), "x = (a ** (b ** c))");
    }

    #[test]
    fn parse_long_chains_without_recursion() {
        let terms = 50_000;
        let sum = format!("x = a{}", " + a".repeat(terms));
        assert_eq!(parse_source(&sum).unwrap().len(), 1);

        let power = format!("x = a{}", " ** a".repeat(terms));
        assert_eq!(parse_source(&power).unwrap().len(), 1);

        let targets = format!("{}1", "a = ".repeat(terms));
        assert_eq!(parse_source(&targets).unwrap().len(), 1);
    }

    #[test]
    fn parse_nesting_limit() {
        let ok = format!("x = {}a{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert!(parse_source(&ok).is_ok());

        let deep = MAX_NESTING + 1;
        let err = parse_source(&format!("x = {}a{}", "(".repeat(deep), ")".repeat(deep)))
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::Syntax {
                message: format!("Parentheses nested deeper than {}", MAX_NESTING),
                line: 1,
                column: 5 + MAX_NESTING,
            }
        );
    }

    #[test]
    fn parse_rejects_invalid_target() {
        let err = parse_source("1 = a").unwrap_err();
        assert!(err.is_syntax());
    }

    #[test]
    fn parse_rejects_missing_separator() {
        let err = parse_source("a = 1 b = 2").unwrap_err();
        assert_eq!(
            err,
            GraphError::Syntax {
                message: "Expected ';' or newline after statement".to_string(),
                line: 1,
                column: 7,
            }
        );
    }

    #[test]
    fn parse_unclosed_paren() {
        assert!(parse_source("a = (1 + 2").unwrap_err().is_syntax());
    }

    #[test]
    fn parse_empty_source() {
        let program = parse_source("  \n;;\n// only a comment").unwrap();
        assert!(program.is_empty());
    }
}
