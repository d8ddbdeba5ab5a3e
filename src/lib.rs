// micrograph
// Scalar computation graphs, reverse-mode autodiff and an assignment-to-graph compiler

pub mod analyzer;
pub mod ast;
pub mod compiler;
pub mod env;
pub mod error;
pub mod export;
pub mod graph;
pub mod lexer;
pub mod nn;
pub mod parser;
pub mod token;

pub use analyzer::{Analyzer, AnalyzerConfig};
pub use ast::{BinaryOperator, Expression, Program, Statement};
pub use compiler::{compile_source, Compilation, Compiler};
pub use env::Environment;
pub use error::{GraphError, Result};
pub use export::{GraphData, GraphLink, GraphNode};
pub use graph::{NodeId, Op, Value};
pub use lexer::Lexer;
pub use nn::{input_leaves, squared_error, Layer, LayerOutput, Network, Neuron};
pub use parser::{parse_source, Parser};
pub use token::{Token, TokenType};
