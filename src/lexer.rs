use crate::error::{GraphError, Result};
use crate::token::{Token, TokenType};

/// Converts source code into a stream of tokens
pub struct Lexer {
    source: Vec<char>,
    current: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.chars().collect(),
            current: 0,
            line: 1,
            column: 1,
        }
    }

    /// Tokenize the whole input. Newlines are kept because they terminate statements.
    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace_and_comments();
            if self.is_at_end() {
                break;
            }
            tokens.push(self.next_token()?);
        }

        tokens.push(Token::new(TokenType::Eof, self.line, self.column));
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token> {
        let start_line = self.line;
        let start_column = self.column;

        let ch = self.advance();

        let token_type = match ch {
            '\n' => {
                self.line += 1;
                self.column = 1;
                TokenType::Newline
            }
            '+' => TokenType::Plus,
            '-' => TokenType::Minus,
            '*' => {
                if self.peek() == '*' {
                    self.advance();
                    TokenType::Power
                } else {
                    TokenType::Star
                }
            }
            '/' => TokenType::Slash,
            '%' => TokenType::Percent,
            '=' => TokenType::Assign,
            '(' => TokenType::LParen,
            ')' => TokenType::RParen,
            ';' => TokenType::Semicolon,
            _ if ch.is_ascii_alphabetic() || ch == '_' => TokenType::Identifier(self.read_identifier(ch)),
            _ if ch.is_ascii_digit() => {
                let (value, raw) = self.read_number(ch, start_line, start_column)?;
                TokenType::Number { value, raw }
            }
            _ => return Err(GraphError::unexpected_char(ch, start_line, start_column)),
        };

        Ok(Token::new(token_type, start_line, start_column))
    }

    fn read_identifier(&mut self, first: char) -> String {
        let mut identifier = String::from(first);

        while !self.is_at_end() {
            let ch = self.peek();
            if ch.is_ascii_alphanumeric() || ch == '_' {
                identifier.push(self.advance());
            } else {
                break;
            }
        }

        identifier
    }

    fn read_number(&mut self, first: char, line: usize, column: usize) -> Result<(f64, String)> {
        let mut number = String::from(first);

        while !self.is_at_end() && self.peek().is_ascii_digit() {
            number.push(self.advance());
        }

        // A fractional part needs at least one digit after the dot
        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            number.push(self.advance());
            while !self.is_at_end() && self.peek().is_ascii_digit() {
                number.push(self.advance());
            }
        }

        let value = number
            .parse::<f64>()
            .map_err(|_| GraphError::syntax(format!("Invalid number '{}'", number), line, column))?;
        Ok((value, number))
    }

    fn skip_whitespace_and_comments(&mut self) {
        while !self.is_at_end() {
            match self.peek() {
                ' ' | '\t' | '\r' => {
                    self.advance();
                }
                '/' if self.peek_next() == '/' => {
                    while !self.is_at_end() && self.peek() != '\n' {
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn advance(&mut self) -> char {
        let ch = self.source[self.current];
        self.current += 1;
        if ch != '\n' {
            self.column += 1;
        }
        ch
    }

    fn peek(&self) -> char {
        self.source.get(self.current).copied().unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        self.source.get(self.current + 1).copied().unwrap_or('\0')
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }
}
