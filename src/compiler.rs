//! Lowers assignment statements into graph nodes.
//!
//! Only top-level `identifier = expression` statements are compiled; every other
//! statement shape is skipped. Identifiers resolve through an [`Environment`]
//! that the compiler owns, and each statement's result is bound to its target
//! only after the whole right-hand side lowered successfully.

use log::debug;

use crate::ast::{BinaryOperator, Expression, Program, Statement};
use crate::env::Environment;
use crate::error::{GraphError, Result};
use crate::graph::{Op, Value};
use crate::parser::parse_source;

/// Everything produced from one piece of source text.
#[derive(Debug, Clone)]
pub struct Compilation {
    pub program: Program,
    pub environment: Environment,
    /// Node produced by the last compiled statement
    pub result: Option<Value>,
}

/// Parse and compile `source` with a fresh environment.
///
/// Any failure (syntax, unresolved identifier, unsupported operator) yields an
/// error and nothing else; no partially built graph escapes.
pub fn compile_source(source: &str) -> Result<Compilation> {
    let program = parse_source(source)?;
    let mut compiler = Compiler::new();
    compiler.compile(&program)?;
    let (environment, result) = compiler.into_parts();
    Ok(Compilation {
        program,
        environment,
        result,
    })
}

#[derive(Debug, Default)]
pub struct Compiler {
    env: Environment,
    last: Option<Value>,
}

impl Compiler {
    pub fn new() -> Self {
        Compiler {
            env: Environment::new(),
            last: None,
        }
    }

    /// Continue from bindings made by an earlier compilation.
    pub fn with_environment(env: Environment) -> Self {
        Compiler { env, last: None }
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn last_value(&self) -> Option<&Value> {
        self.last.as_ref()
    }

    pub fn into_parts(self) -> (Environment, Option<Value>) {
        (self.env, self.last)
    }

    /// Compile every statement in source order, stopping at the first failure.
    pub fn compile(&mut self, program: &Program) -> Result<Option<Value>> {
        for stmt in &program.statements {
            self.lower_statement(stmt)?;
        }
        Ok(self.last.clone())
    }

    /// Lower one statement. Returns `None` for statements that are skipped.
    pub fn lower_statement(&mut self, stmt: &Statement) -> Result<Option<Value>> {
        let Some((name, rhs)) = stmt.as_assignment() else {
            debug!("line {}: skipping non-assignment statement", stmt.line);
            return Ok(None);
        };

        let value = match rhs {
            Expression::Literal { value, .. } => Value::bound(name, *value),
            // Aliases the existing node; no computation node is created
            Expression::Identifier { name: source } => self.env.lookup(source)?,
            Expression::Binary { .. } => self.lower(rhs, Some(name.to_string()))?,
            Expression::Assignment { .. } => {
                return Err(GraphError::UnsupportedExpression {
                    kind: "nested assignment".to_string(),
                })
            }
        };

        debug!("line {}: {} = {}", stmt.line, name, value.data());
        if self.env.bind(name, value.clone()).is_some() {
            debug!("line {}: rebound '{}'", stmt.line, name);
        }
        self.last = Some(value.clone());
        Ok(Some(value))
    }

    /// Lower an operand expression without binding anything.
    pub fn lower_expression(&self, expr: &Expression) -> Result<Value> {
        self.lower(expr, None)
    }

    /// Post-order walk over `root` with an explicit work stack, so chains of
    /// any length lower without growing the call stack. Operands lower left
    /// then right; the operator is checked once both are built. `root_name` goes
    /// to the node produced for `root` itself.
    fn lower(&self, root: &Expression, mut root_name: Option<String>) -> Result<Value> {
        enum Task<'a> {
            Visit(&'a Expression),
            Apply(BinaryOperator),
        }

        let mut tasks = vec![Task::Visit(root)];
        let mut operands: Vec<Value> = Vec::new();

        while let Some(task) = tasks.pop() {
            match task {
                Task::Visit(Expression::Literal { value, raw }) => {
                    operands.push(Value::leaf(raw.as_str(), *value));
                }
                Task::Visit(Expression::Identifier { name }) => {
                    operands.push(self.env.lookup(name)?);
                }
                Task::Visit(Expression::Binary { left, op, right }) => {
                    tasks.push(Task::Apply(*op));
                    tasks.push(Task::Visit(right.as_ref()));
                    tasks.push(Task::Visit(left.as_ref()));
                }
                Task::Visit(Expression::Assignment { .. }) => {
                    return Err(GraphError::UnsupportedExpression {
                        kind: "nested assignment".to_string(),
                    })
                }
                Task::Apply(op) => {
                    let (Some(rhs), Some(lhs)) = (operands.pop(), operands.pop()) else {
                        return Err(GraphError::UnsupportedExpression {
                            kind: "binary expression without operands".to_string(),
                        });
                    };
                    let op = Op::from_symbol(op.symbol()).ok_or_else(|| {
                        GraphError::UnsupportedOperator {
                            op: op.symbol().to_string(),
                        }
                    })?;
                    // The root's Apply is the bottom task, so it runs last
                    let node_name = if tasks.is_empty() { root_name.take() } else { None };
                    operands.push(Value::binary(&lhs, op, &rhs, node_name)?);
                }
            }
        }

        operands.pop().ok_or_else(|| GraphError::UnsupportedExpression {
            kind: "empty expression".to_string(),
        })
    }
}
