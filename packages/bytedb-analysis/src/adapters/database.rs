//! Graph-file database
//!
//! Bytecode ingestion and CFG construction are external collaborators;
//! the engine consumes their output through `ApplicationGraph`. This
//! adapter loads the serialized program graph the ingestion frontend
//! emits (methods, statements, intra-method edges, resolved call
//! targets) into an [`InMemoryGraph`].

use serde::Deserialize;
use std::path::Path;

use crate::errors::{EngineError, Result};
use crate::shared::models::{GraphBuilder, InMemoryGraph, StatementKind};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MethodSpec {
    class: String,
    name: String,
    #[serde(default)]
    descriptor: String,
    #[serde(default)]
    source_file: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementSpec {
    method: usize,
    #[serde(default)]
    line: u32,
    kind: StatementKind,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ProgramFile {
    methods: Vec<MethodSpec>,

    statements: Vec<StatementSpec>,

    /// Intra-method CFG edges as statement index pairs
    #[serde(default)]
    edges: Vec<(usize, usize)>,

    /// Resolved call targets as (statement index, method index)
    #[serde(default)]
    calls: Vec<(usize, usize)>,
}

pub struct FileDatabase;

impl FileDatabase {
    pub fn load(path: &Path) -> Result<InMemoryGraph> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            EngineError::config(format!("cannot read graph file {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<InMemoryGraph> {
        let file: ProgramFile = serde_json::from_str(text)
            .map_err(|e| EngineError::config(format!("unparseable graph file: {}", e)))?;

        let mut builder = GraphBuilder::new();
        let mut methods = Vec::new();
        for spec in &file.methods {
            let id = builder.add_method(&spec.class, &spec.name, &spec.descriptor);
            if let Some(source) = &spec.source_file {
                builder.set_source_file(id, source);
            }
            methods.push(id);
        }

        let mut statements = Vec::new();
        for (index, spec) in file.statements.into_iter().enumerate() {
            let method = *methods.get(spec.method).ok_or_else(|| {
                EngineError::config(format!(
                    "statement {} references unknown method index {}",
                    index, spec.method
                ))
            })?;
            statements.push(builder.add_statement(method, spec.line, spec.kind));
        }

        for (from, to) in file.edges {
            let (from, to) = match (statements.get(from), statements.get(to)) {
                (Some(f), Some(t)) => (*f, *t),
                _ => {
                    return Err(EngineError::config(format!(
                        "edge references unknown statement index ({}, {})",
                        from, to
                    )))
                }
            };
            builder.add_edge(from, to);
        }

        for (stmt, method) in file.calls {
            let stmt = *statements.get(stmt).ok_or_else(|| {
                EngineError::config(format!("call references unknown statement index {}", stmt))
            })?;
            let method = *methods.get(method).ok_or_else(|| {
                EngineError::config(format!("call references unknown method index {}", method))
            })?;
            builder.add_call_target(stmt, method);
        }

        Ok(builder.build())
    }
}
