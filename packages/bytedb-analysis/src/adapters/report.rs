//! Report emission
//!
//! Serializes an analysis result as JSON (default) or SARIF v2.1.0 for
//! CI/CD integration. The header distinguishes complete, partial
//! (deadline) and aborted outcomes; findings found before an abort are
//! still emitted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::features::ifds::application::{AnalysisResult, Finding};
use crate::features::ifds::domain::Vertex;
use crate::features::ifds::infrastructure::Outcome;
use crate::shared::models::ApplicationGraph;

/// One vertex of a witness, rendered for the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VertexRecord {
    pub statement: String,
    pub line: u32,
    pub fact: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRecord {
    pub sources: Vec<VertexRecord>,
    pub edges: Vec<(VertexRecord, VertexRecord)>,
    pub entry_points: Vec<VertexRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindingRecord {
    pub analysis: String,
    pub rule: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwe: Option<String>,
    pub method: String,
    pub file: Option<String>,
    pub line: u32,
    pub sink_fact: String,
    pub trace: TraceRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub tool: String,
    pub version: String,
    pub outcome: String,
    pub generated_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub events_dropped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    pub findings: Vec<FindingRecord>,
}

fn outcome_text(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Complete => "complete",
        Outcome::Partial => "partial",
        Outcome::Aborted => "aborted",
    }
}

fn vertex_record(graph: &dyn ApplicationGraph, vertex: &Vertex) -> VertexRecord {
    let stmt = graph.statement(vertex.stmt);
    VertexRecord {
        statement: vertex.stmt.to_string(),
        line: stmt.line,
        fact: vertex.fact.to_string(),
    }
}

fn finding_record(graph: &dyn ApplicationGraph, finding: &Finding) -> FindingRecord {
    let v = &finding.vulnerability;
    let method = graph.method(v.method);
    let sink_stmt = graph.statement(v.sink.stmt);
    FindingRecord {
        analysis: v.analysis.clone(),
        rule: v.rule.clone(),
        cwe: v.cwe.clone(),
        method: method.signature(),
        file: method.source_file.clone(),
        line: sink_stmt.line,
        sink_fact: v.sink.fact.to_string(),
        trace: TraceRecord {
            sources: finding
                .trace
                .sources
                .iter()
                .map(|v| vertex_record(graph, v))
                .collect(),
            edges: finding
                .trace
                .edges
                .iter()
                .map(|(a, b)| (vertex_record(graph, a), vertex_record(graph, b)))
                .collect(),
            entry_points: finding
                .trace
                .entry_points
                .iter()
                .map(|v| vertex_record(graph, v))
                .collect(),
        },
    }
}

impl Report {
    pub fn build(graph: &dyn ApplicationGraph, result: &AnalysisResult) -> Report {
        Report {
            tool: "bytedb-analysis".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            outcome: outcome_text(result.outcome).to_string(),
            generated_at: Utc::now(),
            duration_ms: result.duration.as_millis() as u64,
            events_dropped: result.events_dropped,
            diagnostic: result.diagnostic.clone(),
            findings: result
                .findings
                .iter()
                .map(|f| finding_record(graph, f))
                .collect(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

// --- SARIF v2.1.0 ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SarifReport {
    #[serde(rename = "$schema")]
    pub schema: String,
    pub version: String,
    pub runs: Vec<SarifRun>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SarifRun {
    pub tool: SarifTool,
    pub results: Vec<SarifResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SarifTool {
    pub driver: SarifDriver,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SarifDriver {
    pub name: String,
    pub version: String,
    pub rules: Vec<SarifRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SarifRule {
    pub id: String,
    #[serde(rename = "shortDescription")]
    pub short_description: SarifMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SarifResult {
    #[serde(rename = "ruleId")]
    pub rule_id: String,
    pub level: String,
    pub message: SarifMessage,
    pub locations: Vec<SarifLocation>,
    #[serde(rename = "codeFlows")]
    pub code_flows: Vec<SarifCodeFlow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SarifMessage {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SarifLocation {
    #[serde(rename = "physicalLocation")]
    pub physical_location: SarifPhysicalLocation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SarifPhysicalLocation {
    #[serde(rename = "artifactLocation")]
    pub artifact_location: SarifArtifactLocation,
    pub region: SarifRegion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SarifArtifactLocation {
    pub uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SarifRegion {
    #[serde(rename = "startLine")]
    pub start_line: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SarifCodeFlow {
    #[serde(rename = "threadFlows")]
    pub thread_flows: Vec<SarifThreadFlow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SarifThreadFlow {
    pub locations: Vec<SarifThreadFlowLocation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SarifThreadFlowLocation {
    pub location: SarifLocation,
    pub kinds: Vec<String>,
    pub message: SarifMessage,
}

fn sarif_location(graph: &dyn ApplicationGraph, vertex: &Vertex) -> SarifLocation {
    let stmt = graph.statement(vertex.stmt);
    let method = graph.method(stmt.method);
    SarifLocation {
        physical_location: SarifPhysicalLocation {
            artifact_location: SarifArtifactLocation {
                uri: method
                    .source_file
                    .clone()
                    .unwrap_or_else(|| format!("{}.java", method.class_name.replace('.', "/"))),
            },
            region: SarifRegion {
                start_line: stmt.line,
            },
        },
    }
}

fn hop(
    graph: &dyn ApplicationGraph,
    vertex: &Vertex,
    kind: &str,
    text: String,
) -> SarifThreadFlowLocation {
    SarifThreadFlowLocation {
        location: sarif_location(graph, vertex),
        kinds: vec![kind.to_string()],
        message: SarifMessage { text },
    }
}

/// SARIF rendering of an analysis result
pub fn to_sarif(graph: &dyn ApplicationGraph, result: &AnalysisResult) -> SarifReport {
    let mut rules: Vec<SarifRule> = Vec::new();
    let mut results = Vec::new();

    for finding in &result.findings {
        let v = &finding.vulnerability;
        let rule_id = v.cwe.clone().unwrap_or_else(|| v.analysis.clone());

        if !rules.iter().any(|r| r.id == rule_id) {
            rules.push(SarifRule {
                id: rule_id.clone(),
                short_description: SarifMessage {
                    text: format!("{} ({})", v.analysis, v.rule),
                },
            });
        }

        let mut locations = vec![hop(
            graph,
            &v.sink,
            "sink",
            format!("sink reached with {}", v.sink.fact),
        )];
        for source in finding.trace.sources.iter().rev() {
            locations.insert(
                0,
                hop(graph, source, "source", format!("introduced as {}", source.fact)),
            );
        }

        results.push(SarifResult {
            rule_id,
            level: "error".to_string(),
            message: SarifMessage {
                text: format!(
                    "{}: {} flows into {} at line {}",
                    v.analysis,
                    v.sink.fact,
                    graph.method(v.method).signature(),
                    graph.statement(v.sink.stmt).line
                ),
            },
            locations: vec![sarif_location(graph, &v.sink)],
            code_flows: vec![SarifCodeFlow {
                thread_flows: vec![SarifThreadFlow { locations }],
            }],
        });
    }

    SarifReport {
        schema: "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/main/sarif-2.1/schema/sarif-schema-2.1.0.json".to_string(),
        version: "2.1.0".to_string(),
        runs: vec![SarifRun {
            tool: SarifTool {
                driver: SarifDriver {
                    name: "bytedb-analysis".to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    rules,
                },
            },
            results,
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::ifds::domain::{Fact, Mark, Vulnerability};
    use crate::features::ifds::infrastructure::{SolverStats, TraceGraph};
    use crate::features::ifds::ports::Aggregate;
    use crate::shared::models::{AccessPath, GraphBuilder, MethodId, StatementKind};
    use std::sync::Arc;
    use std::time::Duration;

    fn fixture() -> (Arc<dyn ApplicationGraph>, AnalysisResult) {
        let mut b = GraphBuilder::new();
        let m = b.add_method("com.app.Main", "main", "()");
        b.set_source_file(m, "Main.java");
        let s0 = b.add_statement(m, 4, StatementKind::Nop);
        let s1 = b.add_statement(
            m,
            5,
            StatementKind::Call {
                callee: "app.Io.sink(String)".to_string(),
                receiver: None,
                args: vec![AccessPath::local("x")],
                result: None,
            },
        );
        b.add_edge(s0, s1);
        let graph: Arc<dyn ApplicationGraph> = Arc::new(b.build());

        let sink = crate::features::ifds::domain::Vertex::new(
            s1,
            Fact::marked(AccessPath::local("x"), Mark::Taint, 5),
        );
        let source = crate::features::ifds::domain::Vertex::new(s0, Fact::Zero);
        let result = AnalysisResult {
            outcome: Outcome::Complete,
            findings: vec![Finding {
                vulnerability: Vulnerability {
                    analysis: "taint-forward".to_string(),
                    rule: "app\\.Io\\.sink\\(String\\)".to_string(),
                    cwe: Some("CWE-89".to_string()),
                    method: MethodId(0),
                    sink: sink.clone(),
                },
                trace: TraceGraph {
                    sources: vec![source.clone()],
                    edges: vec![(source.clone(), sink)],
                    entry_points: vec![source],
                },
            }],
            stats: SolverStats::default(),
            events_dropped: false,
            duration: Duration::from_millis(12),
            diagnostic: None,
            aggregate: Aggregate::default(),
        };
        (graph, result)
    }

    #[test]
    fn test_json_report_shape() {
        let (graph, result) = fixture();
        let report = Report::build(graph.as_ref(), &result);
        let json = report.to_json().unwrap();

        assert_eq!(report.outcome, "complete");
        assert!(json.contains("\"cwe\": \"CWE-89\""));
        assert!(json.contains("com.app.Main.main()"));
        assert!(json.contains("x[TAINT]"));
        // trace survives the round trip
        let parsed: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.findings[0].trace.edges.len(), 1);
    }

    #[test]
    fn test_sarif_shape() {
        let (graph, result) = fixture();
        let sarif = to_sarif(graph.as_ref(), &result);

        assert_eq!(sarif.version, "2.1.0");
        assert_eq!(sarif.runs.len(), 1);
        let run = &sarif.runs[0];
        assert_eq!(run.tool.driver.rules[0].id, "CWE-89");
        assert_eq!(run.results[0].rule_id, "CWE-89");

        let json = serde_json::to_string(&sarif).unwrap();
        assert!(json.contains("\"$schema\""));
        assert!(json.contains("\"codeFlows\""));
        assert!(json.contains("Main.java"));

        // the code flow ends at the sink
        let flow = &run.results[0].code_flows[0].thread_flows[0];
        assert_eq!(flow.locations.last().unwrap().kinds, vec!["sink"]);
    }

    #[test]
    fn test_partial_outcome_is_visible() {
        let (graph, mut result) = fixture();
        result.outcome = Outcome::Partial;
        let report = Report::build(graph.as_ref(), &result);
        assert_eq!(report.outcome, "partial");
        // findings found before the deadline are still emitted
        assert_eq!(report.findings.len(), 1);
    }
}
