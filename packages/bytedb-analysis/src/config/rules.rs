//! Taint rule configuration
//!
//! A JSON document enumerating sources, sinks, pass-throughs, and
//! sanitizers keyed by method-signature patterns. A default rule set is
//! embedded in the binary; a user configuration is merged structurally:
//! rule lists are concatenated and deduplicated by matcher identity.
//!
//! Matchers are anchored regular expressions over the full signature
//! string (`com.app.Service.find(String)`); position matchers are
//! `this`, `argN`, or `return`.

use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{EngineError, Result};
use crate::features::ifds::domain::Mark;

/// Argument/receiver/result position referenced by a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Position {
    This,
    Arg(u32),
    Return,
}

impl Position {
    pub fn parse(text: &str) -> Result<Position> {
        match text {
            "this" => Ok(Position::This),
            "return" => Ok(Position::Return),
            other => {
                let index = other
                    .strip_prefix("arg")
                    .and_then(|n| n.parse::<u32>().ok())
                    .ok_or_else(|| {
                        EngineError::resolution(format!("unknown position matcher `{}`", other))
                    })?;
                Ok(Position::Arg(index))
            }
        }
    }
}

/// Source/sink/sanitizer rule as written in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRule {
    pub method_matcher: String,
    pub position_matcher: String,
    pub mark: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwe: Option<String>,
}

/// Pass-through rule: taint at `from` reappears at `to`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassThroughRule {
    pub method_matcher: String,
    pub from: String,
    pub to: String,
    pub mark: String,
}

/// The rule document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaintRules {
    pub sources: Vec<PositionRule>,
    pub sinks: Vec<PositionRule>,
    pub pass_through: Vec<PassThroughRule>,
    pub sanitizers: Vec<PositionRule>,
}

static DEFAULT_RULES_JSON: &str = include_str!("../../resources/default-rules.json");

static DEFAULT_RULES: Lazy<TaintRules> = Lazy::new(|| {
    serde_json::from_str(DEFAULT_RULES_JSON).expect("embedded default rules must parse")
});

impl TaintRules {
    /// The rule set embedded in the binary
    pub fn default_rules() -> TaintRules {
        DEFAULT_RULES.clone()
    }

    pub fn from_json(text: &str) -> Result<TaintRules> {
        serde_json::from_str(text)
            .map_err(|e| EngineError::config(format!("unparseable taint rules: {}", e)))
    }

    /// Append `user` rules to this set, deduplicating by matcher identity
    pub fn merged_with(mut self, user: TaintRules) -> TaintRules {
        fn dedup_position(rules: &mut Vec<PositionRule>) {
            let mut seen = FxHashSet::default();
            rules.retain(|r| {
                seen.insert((
                    r.method_matcher.clone(),
                    r.position_matcher.clone(),
                    r.mark.clone(),
                ))
            });
        }

        self.sources.extend(user.sources);
        self.sinks.extend(user.sinks);
        self.pass_through.extend(user.pass_through);
        self.sanitizers.extend(user.sanitizers);

        dedup_position(&mut self.sources);
        dedup_position(&mut self.sinks);
        dedup_position(&mut self.sanitizers);

        let mut seen = FxHashSet::default();
        self.pass_through.retain(|r| {
            seen.insert((
                r.method_matcher.clone(),
                r.from.clone(),
                r.to.clone(),
                r.mark.clone(),
            ))
        });

        self
    }

    /// Compile matchers; rules that fail to compile are recorded and
    /// skipped so one bad pattern does not reject the whole document
    pub fn compile(&self) -> CompiledRules {
        let mut compiled = CompiledRules::default();

        for rule in &self.sources {
            match CompiledPositionRule::compile(rule) {
                Ok(r) => compiled.sources.push(r),
                Err(e) => compiled.skip(&rule.method_matcher, e),
            }
        }
        for rule in &self.sinks {
            match CompiledPositionRule::compile(rule) {
                Ok(r) => compiled.sinks.push(r),
                Err(e) => compiled.skip(&rule.method_matcher, e),
            }
        }
        for rule in &self.sanitizers {
            match CompiledPositionRule::compile(rule) {
                Ok(r) => compiled.sanitizers.push(r),
                Err(e) => compiled.skip(&rule.method_matcher, e),
            }
        }
        for rule in &self.pass_through {
            match CompiledPassThroughRule::compile(rule) {
                Ok(r) => compiled.pass_through.push(r),
                Err(e) => compiled.skip(&rule.method_matcher, e),
            }
        }

        compiled
    }
}

fn anchored(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{})$", pattern))
        .map_err(|e| EngineError::resolution(format!("invalid method matcher: {}", e)))
}

#[derive(Debug, Clone)]
pub struct CompiledPositionRule {
    pub matcher: Regex,
    pub matcher_text: String,
    pub position: Position,
    pub mark: Mark,
    pub cwe: Option<String>,
}

impl CompiledPositionRule {
    fn compile(rule: &PositionRule) -> Result<CompiledPositionRule> {
        Ok(CompiledPositionRule {
            matcher: anchored(&rule.method_matcher)?,
            matcher_text: rule.method_matcher.clone(),
            position: Position::parse(&rule.position_matcher)?,
            mark: Mark::parse(&rule.mark),
            cwe: rule.cwe.clone(),
        })
    }

    pub fn matches(&self, signature: &str) -> bool {
        self.matcher.is_match(signature)
    }
}

#[derive(Debug, Clone)]
pub struct CompiledPassThroughRule {
    pub matcher: Regex,
    pub from: Position,
    pub to: Position,
    pub mark: Mark,
}

impl CompiledPassThroughRule {
    fn compile(rule: &PassThroughRule) -> Result<CompiledPassThroughRule> {
        Ok(CompiledPassThroughRule {
            matcher: anchored(&rule.method_matcher)?,
            from: Position::parse(&rule.from)?,
            to: Position::parse(&rule.to)?,
            mark: Mark::parse(&rule.mark),
        })
    }

    pub fn matches(&self, signature: &str) -> bool {
        self.matcher.is_match(signature)
    }
}

/// Rules with compiled matchers, ready for the flow functions
#[derive(Debug, Clone, Default)]
pub struct CompiledRules {
    pub sources: Vec<CompiledPositionRule>,
    pub sinks: Vec<CompiledPositionRule>,
    pub pass_through: Vec<CompiledPassThroughRule>,
    pub sanitizers: Vec<CompiledPositionRule>,

    /// Matchers skipped during compilation, for the report header
    pub skipped: Vec<String>,
}

impl CompiledRules {
    fn skip(&mut self, matcher: &str, error: EngineError) {
        warn!(matcher, %error, "skipping rule");
        self.skipped.push(matcher.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn source(matcher: &str) -> PositionRule {
        PositionRule {
            method_matcher: matcher.to_string(),
            position_matcher: "return".to_string(),
            mark: "TAINT".to_string(),
            cwe: None,
        }
    }

    #[test]
    fn test_position_parse() {
        assert_eq!(Position::parse("this").unwrap(), Position::This);
        assert_eq!(Position::parse("return").unwrap(), Position::Return);
        assert_eq!(Position::parse("arg2").unwrap(), Position::Arg(2));
        assert!(Position::parse("argX").is_err());
        assert!(Position::parse("result").is_err());
    }

    #[test]
    fn test_default_rules_parse() {
        let rules = TaintRules::default_rules();
        assert!(!rules.sources.is_empty());
        assert!(!rules.sinks.is_empty());
        assert!(rules.sinks.iter().any(|s| s.cwe.is_some()));
    }

    #[test]
    fn test_merge_appends_and_dedups() {
        let base = TaintRules {
            sources: vec![source("a\\.B\\.c\\(.*\\)")],
            ..Default::default()
        };
        let user = TaintRules {
            sources: vec![source("a\\.B\\.c\\(.*\\)"), source("x\\.Y\\.z\\(\\)")],
            ..Default::default()
        };

        let merged = base.merged_with(user);
        assert_eq!(merged.sources.len(), 2);
        assert_eq!(merged.sources[0].method_matcher, "a\\.B\\.c\\(.*\\)");
        assert_eq!(merged.sources[1].method_matcher, "x\\.Y\\.z\\(\\)");
    }

    #[test]
    fn test_matcher_is_anchored() {
        let rules = TaintRules {
            sinks: vec![PositionRule {
                method_matcher: "com\\.db\\.Sql\\.query\\(String\\)".to_string(),
                position_matcher: "arg0".to_string(),
                mark: "TAINT".to_string(),
                cwe: Some("CWE-89".to_string()),
            }],
            ..Default::default()
        };

        let compiled = rules.compile();
        assert!(compiled.sinks[0].matches("com.db.Sql.query(String)"));
        assert!(!compiled.sinks[0].matches("xcom.db.Sql.query(String)x"));
    }

    #[test]
    fn test_bad_rule_is_skipped_not_fatal() {
        let rules = TaintRules {
            sources: vec![source("([unclosed")],
            sinks: vec![PositionRule {
                method_matcher: "ok\\.Sink\\.run\\(\\)".to_string(),
                position_matcher: "arg0".to_string(),
                mark: "TAINT".to_string(),
                cwe: None,
            }],
            ..Default::default()
        };

        let compiled = rules.compile();
        assert!(compiled.sources.is_empty());
        assert_eq!(compiled.sinks.len(), 1);
        assert_eq!(compiled.skipped, vec!["([unclosed".to_string()]);
    }

    #[test]
    fn test_rules_json_shape() {
        let text = r#"{
            "sources": [
                {"methodMatcher": "a\\.B\\.get\\(\\)", "positionMatcher": "return", "mark": "TAINT"}
            ],
            "sinks": [
                {"methodMatcher": "a\\.B\\.run\\(String\\)", "positionMatcher": "arg0", "mark": "TAINT", "cwe": "CWE-89"}
            ],
            "passThrough": [
                {"methodMatcher": "a\\.B\\.id\\(.*\\)", "from": "arg0", "to": "return", "mark": "TAINT"}
            ],
            "sanitizers": [
                {"methodMatcher": "a\\.B\\.clean\\(String\\)", "positionMatcher": "return", "mark": "TAINT"}
            ]
        }"#;

        let rules = TaintRules::from_json(text).unwrap();
        assert_eq!(rules.sources.len(), 1);
        assert_eq!(rules.pass_through.len(), 1);
        assert_eq!(rules.sinks[0].cwe.as_deref(), Some("CWE-89"));
    }
}
