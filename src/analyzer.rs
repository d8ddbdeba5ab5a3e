//! Re-analysis session for an editor buffer.
//!
//! Every call to [`Analyzer::analyze`] compiles the whole buffer from scratch.
//! A failed analysis either clears the previous result or keeps it, depending
//! on [`AnalyzerConfig::retain_on_error`].

use log::{debug, warn};

use crate::ast::Program;
use crate::compiler::{compile_source, Compilation};
use crate::env::Environment;
use crate::error::{GraphError, Result};
use crate::export::GraphData;
use crate::graph::Value;

#[derive(Debug, Clone, Default)]
pub struct AnalyzerConfig {
    /// Keep the last good compilation when a new analysis fails
    pub retain_on_error: bool,
    /// Run a backward pass from the result after every successful analysis
    pub auto_backward: bool,
}

impl AnalyzerConfig {
    pub fn retaining() -> Self {
        AnalyzerConfig {
            retain_on_error: true,
            ..Default::default()
        }
    }

    pub fn with_auto_backward(mut self, enabled: bool) -> Self {
        self.auto_backward = enabled;
        self
    }
}

#[derive(Debug, Default)]
pub struct Analyzer {
    config: AnalyzerConfig,
    source: String,
    current: Option<Compilation>,
    last_error: Option<GraphError>,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Analyzer {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Replace the buffer and analyze it.
    pub fn analyze(&mut self, source: &str) -> Result<&Compilation> {
        self.source = source.to_string();

        match compile_source(source) {
            Ok(compilation) => {
                if self.config.auto_backward {
                    if let Some(root) = &compilation.result {
                        root.backward();
                    }
                }
                debug!(
                    "analysis ok: {} statements, {} identifiers",
                    compilation.program.len(),
                    compilation.environment.len()
                );
                self.last_error = None;
                Ok(self.current.insert(compilation))
            }
            Err(err) => {
                warn!("analysis failed: {}", err);
                if !self.config.retain_on_error {
                    self.current = None;
                }
                self.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    pub fn compilation(&self) -> Option<&Compilation> {
        self.current.as_ref()
    }

    /// Hand over the last successful compilation, ending the session.
    pub fn into_compilation(self) -> Option<Compilation> {
        self.current
    }

    pub fn parse_result(&self) -> Option<&Program> {
        self.current.as_ref().map(|c| &c.program)
    }

    pub fn environment(&self) -> Option<&Environment> {
        self.current.as_ref().map(|c| &c.environment)
    }

    pub fn result(&self) -> Option<&Value> {
        self.current.as_ref().and_then(|c| c.result.as_ref())
    }

    pub fn last_error(&self) -> Option<&GraphError> {
        self.last_error.as_ref()
    }

    pub fn graph_data(&self) -> Option<GraphData> {
        self.environment().map(GraphData::from_environment)
    }
}
