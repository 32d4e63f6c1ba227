//! Application graph interface
//!
//! The engine never builds CFGs itself; it consumes them through
//! [`ApplicationGraph`] as pure read-only observations. A call statement
//! is one whose `callees` list is non-empty; exit statements are
//! recognized by membership in `exit_points`, never by having no
//! successors.
//!
//! [`InMemoryGraph`] is the materialized implementation used by the
//! graph-file adapter and by tests. [`ReversedGraph`] is the
//! predecessor/successor-swapped view the backward runner analyzes.

use once_cell::sync::OnceCell;
use rustc_hash::FxHashMap;
use std::sync::Arc;

use super::method::{Method, MethodId};
use super::statement::{Statement, StatementId, StatementKind};

/// Read-only view of the interprocedural control-flow structure
pub trait ApplicationGraph: Send + Sync {
    /// All methods, in deterministic id order
    fn methods(&self) -> Vec<MethodId>;

    fn method(&self, id: MethodId) -> &Method;

    fn statement(&self, id: StatementId) -> &Statement;

    /// All statements of a method, in id order
    fn statements_of(&self, method: MethodId) -> Vec<StatementId>;

    fn entry_points(&self, method: MethodId) -> Vec<StatementId>;

    fn exit_points(&self, method: MethodId) -> Vec<StatementId>;

    fn successors(&self, stmt: StatementId) -> Vec<StatementId>;

    /// Resolved call targets of a statement; empty for non-calls and for
    /// calls whose targets the class database could not resolve
    fn callees(&self, stmt: StatementId) -> Vec<MethodId>;

    fn method_of(&self, stmt: StatementId) -> MethodId;
}

/// Materialized in-memory application graph
#[derive(Debug, Default)]
pub struct InMemoryGraph {
    methods: Vec<Method>,
    statements: Vec<Statement>,
    stmts_by_method: FxHashMap<MethodId, Vec<StatementId>>,
    succ: FxHashMap<StatementId, Vec<StatementId>>,
    calls: FxHashMap<StatementId, Vec<MethodId>>,
    entries: FxHashMap<MethodId, Vec<StatementId>>,
    exits: FxHashMap<MethodId, Vec<StatementId>>,
}

impl ApplicationGraph for InMemoryGraph {
    fn methods(&self) -> Vec<MethodId> {
        self.methods.iter().map(|m| m.id).collect()
    }

    fn method(&self, id: MethodId) -> &Method {
        &self.methods[id.0 as usize]
    }

    fn statement(&self, id: StatementId) -> &Statement {
        &self.statements[id.0 as usize]
    }

    fn statements_of(&self, method: MethodId) -> Vec<StatementId> {
        self.stmts_by_method.get(&method).cloned().unwrap_or_default()
    }

    fn entry_points(&self, method: MethodId) -> Vec<StatementId> {
        self.entries.get(&method).cloned().unwrap_or_default()
    }

    fn exit_points(&self, method: MethodId) -> Vec<StatementId> {
        self.exits.get(&method).cloned().unwrap_or_default()
    }

    fn successors(&self, stmt: StatementId) -> Vec<StatementId> {
        self.succ.get(&stmt).cloned().unwrap_or_default()
    }

    fn callees(&self, stmt: StatementId) -> Vec<MethodId> {
        self.calls.get(&stmt).cloned().unwrap_or_default()
    }

    fn method_of(&self, stmt: StatementId) -> MethodId {
        self.statements[stmt.0 as usize].method
    }
}

/// Builder for [`InMemoryGraph`]
///
/// The first statement added to a method becomes its entry point unless
/// entries are marked explicitly. `Return` statements are exit points
/// automatically; additional exits (exceptional flow) are marked with
/// [`GraphBuilder::mark_exit`].
#[derive(Debug, Default)]
pub struct GraphBuilder {
    graph: InMemoryGraph,
    explicit_entries: FxHashMap<MethodId, Vec<StatementId>>,
    explicit_exits: FxHashMap<MethodId, Vec<StatementId>>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_method(
        &mut self,
        class_name: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> MethodId {
        let id = MethodId(self.graph.methods.len() as u32);
        self.graph.methods.push(Method {
            id,
            class_name: class_name.into(),
            name: name.into(),
            descriptor: descriptor.into(),
            source_file: None,
        });
        self.graph.stmts_by_method.insert(id, Vec::new());
        id
    }

    pub fn set_source_file(&mut self, method: MethodId, file: impl Into<String>) {
        self.graph.methods[method.0 as usize].source_file = Some(file.into());
    }

    pub fn add_statement(
        &mut self,
        method: MethodId,
        line: u32,
        kind: StatementKind,
    ) -> StatementId {
        let id = StatementId(self.graph.statements.len() as u32);
        self.graph.statements.push(Statement {
            id,
            method,
            line,
            kind,
        });
        self.graph
            .stmts_by_method
            .get_mut(&method)
            .expect("statement added to unknown method")
            .push(id);
        id
    }

    pub fn add_edge(&mut self, from: StatementId, to: StatementId) {
        self.graph.succ.entry(from).or_default().push(to);
    }

    pub fn add_call_target(&mut self, stmt: StatementId, callee: MethodId) {
        self.graph.calls.entry(stmt).or_default().push(callee);
    }

    pub fn mark_entry(&mut self, method: MethodId, stmt: StatementId) {
        self.explicit_entries.entry(method).or_default().push(stmt);
    }

    pub fn mark_exit(&mut self, method: MethodId, stmt: StatementId) {
        self.explicit_exits.entry(method).or_default().push(stmt);
    }

    pub fn build(mut self) -> InMemoryGraph {
        let method_ids: Vec<MethodId> = self.graph.methods.iter().map(|m| m.id).collect();
        for id in method_ids {
            let stmts = self.graph.stmts_by_method[&id].clone();

            let entries = match self.explicit_entries.remove(&id) {
                Some(entries) => entries,
                None => stmts.first().map(|s| vec![*s]).unwrap_or_default(),
            };

            let mut exits = self.explicit_exits.remove(&id).unwrap_or_default();
            for stmt in &stmts {
                let is_return = matches!(
                    self.graph.statements[stmt.0 as usize].kind,
                    StatementKind::Return { .. }
                );
                if is_return && !exits.contains(stmt) {
                    exits.push(*stmt);
                }
            }
            exits.sort();

            self.graph.entries.insert(id, entries);
            self.graph.exits.insert(id, exits);
        }
        self.graph
    }
}

/// Predecessor/successor-swapped view of another graph
///
/// Entry and exit roles swap along with the edge direction. The
/// predecessor index is materialized lazily on first use; call targets
/// and method structure are unchanged.
pub struct ReversedGraph {
    inner: Arc<dyn ApplicationGraph>,
    preds: OnceCell<FxHashMap<StatementId, Vec<StatementId>>>,
}

impl ReversedGraph {
    pub fn new(inner: Arc<dyn ApplicationGraph>) -> Self {
        Self {
            inner,
            preds: OnceCell::new(),
        }
    }

    fn predecessor_index(&self) -> &FxHashMap<StatementId, Vec<StatementId>> {
        self.preds.get_or_init(|| {
            let mut preds: FxHashMap<StatementId, Vec<StatementId>> = FxHashMap::default();
            for method in self.inner.methods() {
                for stmt in self.inner.statements_of(method) {
                    for succ in self.inner.successors(stmt) {
                        preds.entry(succ).or_default().push(stmt);
                    }
                }
            }
            preds
        })
    }
}

impl ApplicationGraph for ReversedGraph {
    fn methods(&self) -> Vec<MethodId> {
        self.inner.methods()
    }

    fn method(&self, id: MethodId) -> &Method {
        self.inner.method(id)
    }

    fn statement(&self, id: StatementId) -> &Statement {
        self.inner.statement(id)
    }

    fn statements_of(&self, method: MethodId) -> Vec<StatementId> {
        self.inner.statements_of(method)
    }

    fn entry_points(&self, method: MethodId) -> Vec<StatementId> {
        self.inner.exit_points(method)
    }

    fn exit_points(&self, method: MethodId) -> Vec<StatementId> {
        self.inner.entry_points(method)
    }

    fn successors(&self, stmt: StatementId) -> Vec<StatementId> {
        self.predecessor_index().get(&stmt).cloned().unwrap_or_default()
    }

    fn callees(&self, stmt: StatementId) -> Vec<MethodId> {
        self.inner.callees(stmt)
    }

    fn method_of(&self, stmt: StatementId) -> MethodId {
        self.inner.method_of(stmt)
    }
}
