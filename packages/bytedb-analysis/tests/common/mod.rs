//! Shared fixtures: rule sets and program-graph builders for the
//! end-to-end scenarios.
#![allow(dead_code)]

use std::sync::Arc;

use bytedb_analysis::config::{CompiledRules, EngineConfig, TaintRules};
use bytedb_analysis::features::ifds::application::{run_analysis, AnalysisResult};
use bytedb_analysis::features::taint::{TaintAnalyzer, TaintFlowSpace};
use bytedb_analysis::shared::models::{
    AccessPath, ApplicationGraph, GraphBuilder, MethodId, StatementId, StatementKind, UnitResolver,
};

pub const RULES: &str = r#"{
    "sources": [
        {"methodMatcher": "app\\.Io\\.source\\(\\)", "positionMatcher": "return", "mark": "TAINT"}
    ],
    "sinks": [
        {"methodMatcher": "app\\.Io\\.sink\\(String\\)", "positionMatcher": "arg0", "mark": "TAINT", "cwe": "CWE-89"}
    ],
    "sanitizers": [
        {"methodMatcher": "app\\.Io\\.sanitize\\(String\\)", "positionMatcher": "return", "mark": "TAINT"}
    ]
}"#;

pub fn rules() -> Arc<CompiledRules> {
    Arc::new(TaintRules::from_json(RULES).unwrap().compile())
}

pub fn config(resolver: UnitResolver) -> EngineConfig {
    EngineConfig {
        deadline_secs: 30,
        unit_resolver: resolver,
        ..Default::default()
    }
}

/// Run the forward taint analysis over `graph`
pub fn run_taint(
    graph: Arc<dyn ApplicationGraph>,
    starts: &[MethodId],
    resolver: UnitResolver,
) -> AnalysisResult {
    run_analysis(
        graph,
        Arc::new(TaintAnalyzer::new(rules(), 5)),
        None,
        starts,
        &config(resolver),
    )
    .unwrap()
}

/// Run with extra taint seeded on start-method formals
pub fn run_taint_seeded(
    graph: Arc<dyn ApplicationGraph>,
    starts: &[MethodId],
    resolver: UnitResolver,
    seeds: Vec<(u32, bytedb_analysis::features::ifds::domain::Mark)>,
) -> AnalysisResult {
    let space = TaintFlowSpace::new(rules(), 5).with_start_taints(seeds);
    run_analysis(
        graph,
        Arc::new(TaintAnalyzer::new(rules(), 5).with_space(space)),
        None,
        starts,
        &config(resolver),
    )
    .unwrap()
}

pub fn source_call(b: &mut GraphBuilder, m: MethodId, line: u32, result: &str) -> StatementId {
    b.add_statement(
        m,
        line,
        StatementKind::Call {
            callee: "app.Io.source()".to_string(),
            receiver: None,
            args: vec![],
            result: Some(AccessPath::local(result)),
        },
    )
}

pub fn sink_call(b: &mut GraphBuilder, m: MethodId, line: u32, arg: AccessPath) -> StatementId {
    b.add_statement(
        m,
        line,
        StatementKind::Call {
            callee: "app.Io.sink(String)".to_string(),
            receiver: None,
            args: vec![arg],
            result: None,
        },
    )
}

pub fn ret(b: &mut GraphBuilder, m: MethodId, line: u32, value: Option<AccessPath>) -> StatementId {
    b.add_statement(m, line, StatementKind::Return { value })
}

/// `m() { a = source(); b = <callee>(a); sink(b); }` calling
/// `<callee>(p) { ... }` supplied by the caller of this helper
pub struct CallThroughFixture {
    pub graph: Arc<dyn ApplicationGraph>,
    pub main: MethodId,
    pub callee: MethodId,
    pub sink_stmt: StatementId,
}

pub fn call_through_fixture(
    build_callee: impl FnOnce(&mut GraphBuilder, MethodId) -> (),
) -> CallThroughFixture {
    let mut b = GraphBuilder::new();
    let main = b.add_method("app.Main", "m", "()");
    let callee = b.add_method("app.Util", "id", "(String)");

    let s0 = source_call(&mut b, main, 1, "a");
    let s1 = b.add_statement(
        main,
        2,
        StatementKind::Call {
            callee: "app.Util.id(String)".to_string(),
            receiver: None,
            args: vec![AccessPath::local("a")],
            result: Some(AccessPath::local("b")),
        },
    );
    let s2 = sink_call(&mut b, main, 3, AccessPath::local("b"));
    let s3 = ret(&mut b, main, 4, None);
    b.add_edge(s0, s1);
    b.add_edge(s1, s2);
    b.add_edge(s2, s3);
    b.add_call_target(s1, callee);

    build_callee(&mut b, callee);

    CallThroughFixture {
        graph: Arc::new(b.build()),
        main,
        callee,
        sink_stmt: s2,
    }
}
