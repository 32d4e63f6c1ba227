/*
 * Taint flow functions
 *
 * The rule-driven instantiation of the four flow-function families.
 * Taint is introduced at configured source calls, carried across
 * assignments field-sensitively, substituted between actuals and
 * formals at call boundaries, regenerated by pass-through rules at
 * calls the class database cannot resolve, and stripped by sanitizer
 * rules.
 *
 * Calls with no resolved callees go through the sequent family (the
 * solver treats them as plain statements), so source/sink/pass-through
 * handling lives in the shared call-transfer helper used by both the
 * sequent and the call-to-return families.
 */

use std::sync::Arc;

use crate::config::{CompiledRules, Position};
use crate::features::ifds::domain::{Fact, Mark};
use crate::features::ifds::ports::FlowFunctionSpace;
use crate::shared::models::{AccessPath, Method, RValue, Root, Statement, StatementKind};

/// Resolve a rule position against a call statement
pub(crate) fn position_path(stmt: &Statement, position: Position) -> Option<&AccessPath> {
    match position {
        Position::This => stmt.call_receiver(),
        Position::Arg(i) => stmt.call_args().get(i as usize),
        Position::Return => stmt.call_result(),
    }
}

pub struct TaintFlowSpace {
    rules: Arc<CompiledRules>,
    depth: usize,

    /// Extra taint seeded on formal parameters of start methods
    start_taints: Vec<(u32, Mark)>,
}

impl TaintFlowSpace {
    pub fn new(rules: Arc<CompiledRules>, depth: usize) -> Self {
        Self {
            rules,
            depth,
            start_taints: Vec::new(),
        }
    }

    /// Also seed `argN` with `mark` at every start-method entry
    pub fn with_start_taints(mut self, taints: Vec<(u32, Mark)>) -> Self {
        self.start_taints = taints;
        self
    }

    /// Sanitizer veto for a (statement, position, mark) triple
    fn sanitized(&self, signature: &str, position: Position, mark: &Mark) -> bool {
        self.rules
            .sanitizers
            .iter()
            .any(|rule| rule.position == position && rule.mark == *mark && rule.matches(signature))
    }

    /// Shared transfer for call statements: source gen from Zero,
    /// pass-through regeneration, sanitizer stripping, result overwrite.
    fn call_transfer(&self, call: &Statement, fact: &Fact) -> Vec<Fact> {
        let Some(signature) = call.invoked_signature() else {
            return vec![fact.clone()];
        };

        let mut out = Vec::new();

        if fact.is_zero() {
            out.push(Fact::Zero);
            // taint springs from Zero at configured sources
            for rule in &self.rules.sources {
                if !rule.matches(signature) {
                    continue;
                }
                if let Some(target) = position_path(call, rule.position) {
                    out.push(Fact::marked(target.clone(), rule.mark.clone(), self.depth));
                }
            }
            return out;
        }

        // strip marks cleansed in place (argN/this sanitizer positions)
        let mut current = Some(fact.clone());
        for rule in &self.rules.sanitizers {
            if !rule.matches(signature) {
                continue;
            }
            let Some(clean) = position_path(call, rule.position) else {
                continue;
            };
            let still = current.take();
            current = match still {
                Some(f) if f.path().is_some_and(|p| p.starts_with(clean)) => {
                    f.without_mark(&rule.mark)
                }
                other => other,
            };
        }
        let Some(fact) = current else {
            return out;
        };

        // pass-through regeneration (library calls with no body)
        if let Fact::Taint(t) = &fact {
            for rule in &self.rules.pass_through {
                if !t.marks.contains(&rule.mark) || !rule.matches(signature) {
                    continue;
                }
                let (Some(from), Some(to)) = (
                    position_path(call, rule.from),
                    position_path(call, rule.to),
                ) else {
                    continue;
                };
                if self.sanitized(signature, rule.to, &rule.mark) {
                    continue;
                }
                if let Some(rebased) = t.path.rebased(from, to) {
                    out.push(fact.with_path(rebased, self.depth));
                }
            }
        }

        // the call result is overwritten; facts under it die
        let overwritten = call
            .call_result()
            .is_some_and(|result| fact.path().is_some_and(|p| p.starts_with(result)));
        if !overwritten {
            out.push(fact);
        }
        out
    }

    fn assign_transfer(&self, lhs: &AccessPath, rhs: &RValue, fact: &Fact) -> Vec<Fact> {
        let Fact::Taint(t) = fact else {
            return vec![Fact::Zero];
        };

        let mut out = Vec::new();

        // gen: taint flows from the right-hand side into lhs
        if let RValue::Use(source) = rhs {
            if let Some(rebased) = t.path.rebased(source, lhs) {
                out.push(fact.with_path(rebased, self.depth));
            }
        }

        // kill: anything under lhs is overwritten
        if !t.path.starts_with(lhs) {
            out.push(fact.clone());
        }
        out
    }
}

impl FlowFunctionSpace for TaintFlowSpace {
    fn start_facts(&self, _stmt: &Statement) -> Vec<Fact> {
        let mut facts = vec![Fact::Zero];
        for (index, mark) in &self.start_taints {
            facts.push(Fact::marked(
                AccessPath::arg(*index),
                mark.clone(),
                self.depth,
            ));
        }
        facts
    }

    fn sequent(&self, curr: &Statement, _next: &Statement, fact: &Fact) -> Vec<Fact> {
        match &curr.kind {
            StatementKind::Assign { lhs, rhs } => self.assign_transfer(lhs, rhs, fact),
            StatementKind::Call { .. } => self.call_transfer(curr, fact),
            StatementKind::Return { .. } | StatementKind::Nop => vec![fact.clone()],
        }
    }

    fn call_to_start(&self, call: &Statement, _callee: &Method, fact: &Fact) -> Vec<Fact> {
        let Fact::Taint(t) = fact else {
            return vec![Fact::Zero];
        };

        let mut out = Vec::new();
        for (index, actual) in call.call_args().iter().enumerate() {
            if let Some(rebased) = t.path.rebased(actual, &AccessPath::arg(index as u32)) {
                out.push(fact.with_path(rebased, self.depth));
            }
        }
        if let Some(receiver) = call.call_receiver() {
            if let Some(rebased) = t.path.rebased(receiver, &AccessPath::this()) {
                out.push(fact.with_path(rebased, self.depth));
            }
        }
        if matches!(t.path.root, Root::Static { .. }) {
            out.push(fact.clone());
        }
        out
    }

    fn call_to_return(&self, call: &Statement, _ret: &Statement, fact: &Fact) -> Vec<Fact> {
        self.call_transfer(call, fact)
    }

    fn exit_to_return(
        &self,
        call: &Statement,
        _ret: &Statement,
        exit: &Statement,
        fact: &Fact,
    ) -> Vec<Fact> {
        let Fact::Taint(t) = fact else {
            return vec![Fact::Zero];
        };

        let mut out = Vec::new();

        // returned value lands in the call result
        if let StatementKind::Return { value: Some(value) } = &exit.kind {
            if let Some(result) = call.call_result() {
                if let Some(rebased) = t.path.rebased(value, result) {
                    let sanitized = call.invoked_signature().is_some_and(|sig| {
                        t.marks
                            .iter()
                            .all(|mark| self.sanitized(sig, Position::Return, mark))
                    });
                    if !sanitized {
                        out.push(fact.with_path(rebased, self.depth));
                    }
                }
            }
        }

        // formals flow back into actuals (out-parameters via fields)
        match &t.path.root {
            Root::Arg(index) => {
                if let Some(actual) = call.call_args().get(*index as usize) {
                    if let Some(rebased) = t.path.rebased(&AccessPath::arg(*index), actual) {
                        out.push(fact.with_path(rebased, self.depth));
                    }
                }
            }
            Root::This => {
                if let Some(receiver) = call.call_receiver() {
                    if let Some(rebased) = t.path.rebased(&AccessPath::this(), receiver) {
                        out.push(fact.with_path(rebased, self.depth));
                    }
                }
            }
            Root::Static { .. } => out.push(fact.clone()),
            // callee locals (and any stray returned-value marker) die
            // at the boundary
            Root::Local(_) | Root::Return => {}
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TaintRules;
    use crate::shared::models::{MethodId, StatementId};

    fn rules() -> Arc<CompiledRules> {
        let text = r#"{
            "sources": [
                {"methodMatcher": "app\\.Io\\.source\\(\\)", "positionMatcher": "return", "mark": "TAINT"}
            ],
            "sinks": [
                {"methodMatcher": "app\\.Io\\.sink\\(String\\)", "positionMatcher": "arg0", "mark": "TAINT", "cwe": "CWE-89"}
            ],
            "passThrough": [
                {"methodMatcher": "app\\.Io\\.concat\\(String\\)", "from": "arg0", "to": "return", "mark": "TAINT"}
            ],
            "sanitizers": [
                {"methodMatcher": "app\\.Io\\.sanitize\\(String\\)", "positionMatcher": "return", "mark": "TAINT"},
                {"methodMatcher": "app\\.Io\\.scrub\\(String\\)", "positionMatcher": "arg0", "mark": "TAINT"}
            ]
        }"#;
        Arc::new(TaintRules::from_json(text).unwrap().compile())
    }

    fn space() -> TaintFlowSpace {
        TaintFlowSpace::new(rules(), 5)
    }

    fn call(callee: &str, args: Vec<AccessPath>, result: Option<AccessPath>) -> Statement {
        Statement {
            id: StatementId(0),
            method: MethodId(0),
            line: 1,
            kind: StatementKind::Call {
                callee: callee.to_string(),
                receiver: None,
                args,
                result,
            },
        }
    }

    fn assign(lhs: AccessPath, rhs: RValue) -> Statement {
        Statement {
            id: StatementId(0),
            method: MethodId(0),
            line: 1,
            kind: StatementKind::Assign { lhs, rhs },
        }
    }

    fn nop(id: u32) -> Statement {
        Statement {
            id: StatementId(id),
            method: MethodId(0),
            line: 1,
            kind: StatementKind::Nop,
        }
    }

    fn tainted(path: AccessPath) -> Fact {
        Fact::marked(path, Mark::Taint, 5)
    }

    #[test]
    fn test_source_gens_from_zero() {
        let stmt = call("app.Io.source()", vec![], Some(AccessPath::local("x")));
        let out = space().sequent(&stmt, &nop(1), &Fact::Zero);

        assert!(out.contains(&Fact::Zero));
        assert!(out.contains(&tainted(AccessPath::local("x"))));
    }

    #[test]
    fn test_zero_survives_every_family() {
        let s = space();
        let stmt = nop(0);
        let callee = Method {
            id: MethodId(1),
            class_name: "app.Io".to_string(),
            name: "f".to_string(),
            descriptor: "()".to_string(),
            source_file: None,
        };
        let c = call("app.Io.f()", vec![], None);
        let ret = Statement {
            id: StatementId(9),
            method: MethodId(1),
            line: 9,
            kind: StatementKind::Return { value: None },
        };

        assert!(s.start_facts(&stmt).contains(&Fact::Zero));
        assert!(s.sequent(&stmt, &nop(1), &Fact::Zero).contains(&Fact::Zero));
        assert!(s.call_to_start(&c, &callee, &Fact::Zero).contains(&Fact::Zero));
        assert!(s.call_to_return(&c, &nop(1), &Fact::Zero).contains(&Fact::Zero));
        assert!(s
            .exit_to_return(&c, &nop(1), &ret, &Fact::Zero)
            .contains(&Fact::Zero));
    }

    #[test]
    fn test_assign_gen_and_kill() {
        let s = space();
        let stmt = assign(
            AccessPath::local("y"),
            RValue::Use(AccessPath::local("x")),
        );

        // x tainted: y becomes tainted, x stays
        let out = s.sequent(&stmt, &nop(1), &tainted(AccessPath::local("x")));
        assert!(out.contains(&tainted(AccessPath::local("y"))));
        assert!(out.contains(&tainted(AccessPath::local("x"))));

        // y previously tainted: overwritten
        let out = s.sequent(&stmt, &nop(1), &tainted(AccessPath::local("y")));
        assert!(!out.contains(&tainted(AccessPath::local("y"))));
    }

    #[test]
    fn test_assign_is_field_sensitive() {
        let s = space();
        // u.name = x
        let stmt = assign(
            AccessPath::local("u").field("name"),
            RValue::Use(AccessPath::local("x")),
        );

        let out = s.sequent(&stmt, &nop(1), &tainted(AccessPath::local("x")));
        assert!(out.contains(&tainted(AccessPath::local("u").field("name"))));

        // taint on a sibling field is untouched
        let sibling = tainted(AccessPath::local("u").field("id"));
        let out = s.sequent(&stmt, &nop(1), &sibling);
        assert_eq!(out, vec![sibling]);
    }

    #[test]
    fn test_const_assign_kills() {
        let s = space();
        let stmt = assign(AccessPath::local("x"), RValue::Const);
        let out = s.sequent(&stmt, &nop(1), &tainted(AccessPath::local("x")));
        assert!(out.is_empty());
    }

    #[test]
    fn test_call_to_start_substitutes_actuals() {
        let s = space();
        let callee = Method {
            id: MethodId(1),
            class_name: "app.Io".to_string(),
            name: "id".to_string(),
            descriptor: "(String)".to_string(),
            source_file: None,
        };
        let c = call(
            "app.Io.id(String)",
            vec![AccessPath::local("a")],
            Some(AccessPath::local("b")),
        );

        let out = s.call_to_start(&c, &callee, &tainted(AccessPath::local("a").field("f")));
        assert_eq!(out, vec![tainted(AccessPath::arg(0).field("f"))]);

        // unrelated locals do not enter the callee
        let out = s.call_to_start(&c, &callee, &tainted(AccessPath::local("z")));
        assert!(out.is_empty());
    }

    #[test]
    fn test_exit_to_return_maps_return_value() {
        let s = space();
        let c = call(
            "app.Io.id(String)",
            vec![AccessPath::local("a")],
            Some(AccessPath::local("b")),
        );
        let exit = Statement {
            id: StatementId(9),
            method: MethodId(1),
            line: 9,
            kind: StatementKind::Return {
                value: Some(AccessPath::local("ret")),
            },
        };

        let out = s.exit_to_return(&c, &nop(2), &exit, &tainted(AccessPath::local("ret")));
        assert_eq!(out, vec![tainted(AccessPath::local("b"))]);

        // arg-rooted facts map back to the actual argument
        let out = s.exit_to_return(&c, &nop(2), &exit, &tainted(AccessPath::arg(0).field("f")));
        assert_eq!(out, vec![tainted(AccessPath::local("a").field("f"))]);
    }

    #[test]
    fn test_sanitizer_blocks_returned_taint() {
        let s = space();
        let c = call(
            "app.Io.sanitize(String)",
            vec![AccessPath::local("p")],
            Some(AccessPath::local("q")),
        );
        let exit = Statement {
            id: StatementId(9),
            method: MethodId(1),
            line: 9,
            kind: StatementKind::Return {
                value: Some(AccessPath::local("ret")),
            },
        };

        let out = s.exit_to_return(&c, &nop(2), &exit, &tainted(AccessPath::local("ret")));
        assert!(!out.contains(&tainted(AccessPath::local("q"))));
    }

    #[test]
    fn test_in_place_sanitizer_strips_mark() {
        let s = space();
        let c = call("app.Io.scrub(String)", vec![AccessPath::local("x")], None);

        let out = s.sequent(&c, &nop(1), &tainted(AccessPath::local("x")));
        assert!(out.is_empty());

        // unrelated facts pass untouched
        let out = s.sequent(&c, &nop(1), &tainted(AccessPath::local("y")));
        assert_eq!(out, vec![tainted(AccessPath::local("y"))]);
    }

    #[test]
    fn test_pass_through_regenerates_into_result() {
        let s = space();
        let c = call(
            "app.Io.concat(String)",
            vec![AccessPath::local("x")],
            Some(AccessPath::local("r")),
        );

        let out = s.sequent(&c, &nop(1), &tainted(AccessPath::local("x")));
        assert!(out.contains(&tainted(AccessPath::local("r"))));
        assert!(out.contains(&tainted(AccessPath::local("x"))));
    }

    #[test]
    fn test_result_overwrite_kills() {
        let s = space();
        // r = unknown(); previous taint on r dies
        let c = call("app.Io.unknown()", vec![], Some(AccessPath::local("r")));
        let out = s.sequent(&c, &nop(1), &tainted(AccessPath::local("r")));
        assert!(out.is_empty());
    }

    #[test]
    fn test_start_taints_seed_formals() {
        let s = space().with_start_taints(vec![(0, Mark::Taint)]);
        let facts = s.start_facts(&nop(0));
        assert!(facts.contains(&Fact::Zero));
        assert!(facts.contains(&tainted(AccessPath::arg(0))));
    }

    #[test]
    fn test_deep_paths_truncate_at_bound() {
        let shallow = TaintFlowSpace::new(rules(), 2);
        let stmt = assign(
            AccessPath::local("y").field("a").field("b").field("c"),
            RValue::Use(AccessPath::local("x")),
        );
        let out = shallow.sequent(&stmt, &nop(1), &tainted(AccessPath::local("x")));
        for fact in out {
            if let Some(path) = fact.path() {
                assert!(path.depth() <= 2);
            }
        }
    }
}
