//! File-level round trip: analysis config and program graph from disk,
//! through the engine, into a written report.

mod common;

use std::sync::Arc;

use bytedb_analysis::adapters::{to_sarif, FileDatabase, Report};
use bytedb_analysis::config::AnalysisConfig;
use bytedb_analysis::features::ifds::application::{resolve_start_methods, run_analysis};
use bytedb_analysis::features::taint::TaintAnalyzer;
use bytedb_analysis::shared::models::ApplicationGraph;
use common::RULES;

const PROGRAM: &str = r#"{
    "methods": [
        {"class": "com.app.Main", "name": "m", "descriptor": "()", "sourceFile": "Main.java"}
    ],
    "statements": [
        {"method": 0, "line": 1, "kind": {"Call": {"callee": "app.Io.source()", "receiver": null, "args": [], "result": {"root": {"Local": "x"}, "selectors": []}}}},
        {"method": 0, "line": 2, "kind": {"Call": {"callee": "app.Io.sink(String)", "receiver": null, "args": [{"root": {"Local": "x"}, "selectors": []}], "result": null}}},
        {"method": 0, "line": 3, "kind": {"Return": {"value": null}}}
    ],
    "edges": [[0, 1], [1, 2]]
}"#;

#[test]
fn config_and_graph_files_to_report() {
    let dir = tempfile::tempdir().unwrap();
    let conf_path = dir.path().join("taint.json");
    let graph_path = dir.path().join("program.json");
    std::fs::write(&conf_path, RULES).unwrap();
    std::fs::write(&graph_path, PROGRAM).unwrap();

    let config = AnalysisConfig::from_file(&conf_path).unwrap();
    let rules = Arc::new(config.effective_rules());
    let graph: Arc<dyn ApplicationGraph> = Arc::new(FileDatabase::load(&graph_path).unwrap());

    let starts = resolve_start_methods(graph.as_ref(), &["com.app".to_string()]);
    assert_eq!(starts.len(), 1);

    let result = run_analysis(
        graph.clone(),
        Arc::new(TaintAnalyzer::new(
            rules,
            config.engine.max_access_path_depth,
        )),
        None,
        &starts,
        &config.engine,
    )
    .unwrap();
    assert_eq!(result.findings.len(), 1);

    // native report round-trips through disk
    let report_path = dir.path().join("report.json");
    let report = Report::build(graph.as_ref(), &result);
    std::fs::write(&report_path, report.to_json().unwrap()).unwrap();
    let restored: Report =
        serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(restored.outcome, "complete");
    assert_eq!(restored.findings.len(), 1);
    assert_eq!(restored.findings[0].cwe.as_deref(), Some("CWE-89"));
    assert_eq!(restored.findings[0].line, 2);

    // SARIF names the sink artifact
    let sarif = serde_json::to_string(&to_sarif(graph.as_ref(), &result)).unwrap();
    assert!(sarif.contains("Main.java"));
    assert!(sarif.contains("CWE-89"));
}
