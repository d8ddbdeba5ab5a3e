use std::fmt;

use serde::Serialize;

/// Expressions of the assignment language
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Expression {
    /// Numeric literal with the text it was written as (e.g. `2.50`)
    Literal { value: f64, raw: String },
    /// Identifier reference (e.g. `x`)
    Identifier { name: String },
    /// Binary operation (e.g. `x + y`)
    Binary {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
    /// Assignment (e.g. `x = y * 2`); right-associative
    Assignment { name: String, value: Box<Expression> },
}

impl Expression {
    /// Height of the expression tree; a literal or identifier is 1.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 1)];
        while let Some((expr, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            match expr {
                Expression::Binary { left, right, .. } => {
                    stack.push((left.as_ref(), depth + 1));
                    stack.push((right.as_ref(), depth + 1));
                }
                Expression::Assignment { value, .. } => stack.push((value.as_ref(), depth + 1)),
                Expression::Literal { .. } | Expression::Identifier { .. } => {}
            }
        }
        deepest
    }

    /// Move this node's sub-expressions into `out`, leaving empty leaves.
    fn detach_children(&mut self, out: &mut Vec<Expression>) {
        let vacant = || Expression::Identifier { name: String::new() };
        match self {
            Expression::Binary { left, right, .. } => {
                out.push(std::mem::replace(left.as_mut(), vacant()));
                out.push(std::mem::replace(right.as_mut(), vacant()));
            }
            Expression::Assignment { value, .. } => {
                out.push(std::mem::replace(value.as_mut(), vacant()));
            }
            Expression::Literal { .. } | Expression::Identifier { .. } => {}
        }
    }
}

// Long operator chains nest as deep as they are long; tear them down
// without recursion.
impl Drop for Expression {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.detach_children(&mut pending);
        while let Some(mut expr) = pending.pop() {
            expr.detach_children(&mut pending);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOperator {
    Add, // +
    Sub, // -
    Mul, // *
    Div, // /
    Mod, // %
    Pow, // **
}

impl BinaryOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
            BinaryOperator::Pow => "**",
        }
    }
}

/// A top-level statement together with the line it starts on
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    pub expression: Expression,
    pub line: usize,
}

impl Statement {
    /// The `(name, value)` pair when this is a top-level assignment.
    pub fn as_assignment(&self) -> Option<(&str, &Expression)> {
        match &self.expression {
            Expression::Assignment { name, value } => Some((name.as_str(), value.as_ref())),
            _ => None,
        }
    }
}

/// The root of the AST: statements in source order
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Program {
    pub statements: Vec<Statement>,
}

impl Program {
    pub fn new() -> Self {
        Program { statements: Vec::new() }
    }

    pub fn push(&mut self, expression: Expression, line: usize) {
        self.statements.push(Statement { expression, line });
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Height of the deepest statement's expression tree.
    pub fn depth(&self) -> usize {
        self.statements
            .iter()
            .map(|s| s.expression.depth())
            .max()
            .unwrap_or(0)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        enum Piece<'a> {
            Expr(&'a Expression),
            Text(&'a str),
        }

        let mut pieces = vec![Piece::Expr(self)];
        while let Some(piece) = pieces.pop() {
            match piece {
                Piece::Text(text) => f.write_str(text)?,
                Piece::Expr(Expression::Literal { raw, .. }) => f.write_str(raw)?,
                Piece::Expr(Expression::Identifier { name }) => f.write_str(name)?,
                Piece::Expr(Expression::Binary { left, op, right }) => {
                    pieces.push(Piece::Text(")"));
                    pieces.push(Piece::Expr(right.as_ref()));
                    pieces.push(Piece::Text(" "));
                    pieces.push(Piece::Text(op.symbol()));
                    pieces.push(Piece::Text(" "));
                    pieces.push(Piece::Expr(left.as_ref()));
                    pieces.push(Piece::Text("("));
                }
                Piece::Expr(Expression::Assignment { name, value }) => {
                    pieces.push(Piece::Expr(value.as_ref()));
                    pieces.push(Piece::Text(" = "));
                    pieces.push(Piece::Text(name.as_str()));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for stmt in &self.statements {
            writeln!(f, "{};", stmt.expression)?;
        }
        Ok(())
    }
}
