//! Statement model
//!
//! Statements are opaque handles into the application graph. The engine
//! itself only needs identity, the enclosing method, and successor
//! relations; the taint flow functions additionally consume the small
//! instruction surface exposed by [`StatementKind`] (assignments, calls
//! with their textual invoked signature, returns).

use serde::{Deserialize, Serialize};
use std::fmt;

use super::access_path::AccessPath;
use super::method::MethodId;

/// Statement identifier; equality is structural
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct StatementId(pub u32);

impl fmt::Display for StatementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Right-hand side of an assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RValue {
    /// Copy/load from another abstract location
    Use(AccessPath),

    /// Constant or otherwise taint-free expression
    Const,
}

/// The instruction surface the flow functions consume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementKind {
    /// `lhs = rhs`
    Assign { lhs: AccessPath, rhs: RValue },

    /// An invocation. `callee` is the textual method reference from the
    /// instruction (present even when no target resolves); resolved
    /// targets are a property of the application graph, not of the
    /// statement.
    Call {
        callee: String,
        receiver: Option<AccessPath>,
        args: Vec<AccessPath>,
        result: Option<AccessPath>,
    },

    /// `return value?`
    Return { value: Option<AccessPath> },

    /// Anything else (conditionals, monitors, gotos)
    Nop,
}

/// A node in the application graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub id: StatementId,

    /// Back-reference to the enclosing method
    pub method: MethodId,

    /// Source line, for reports
    pub line: u32,

    pub kind: StatementKind,
}

impl Statement {
    /// The invoked signature text, for call statements
    pub fn invoked_signature(&self) -> Option<&str> {
        match &self.kind {
            StatementKind::Call { callee, .. } => Some(callee),
            _ => None,
        }
    }

    /// Access path receiving the call result, if any
    pub fn call_result(&self) -> Option<&AccessPath> {
        match &self.kind {
            StatementKind::Call { result, .. } => result.as_ref(),
            _ => None,
        }
    }

    /// Argument access paths of a call statement
    pub fn call_args(&self) -> &[AccessPath] {
        match &self.kind {
            StatementKind::Call { args, .. } => args,
            _ => &[],
        }
    }

    /// Receiver access path of an instance call
    pub fn call_receiver(&self) -> Option<&AccessPath> {
        match &self.kind {
            StatementKind::Call { receiver, .. } => receiver.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_accessors() {
        let stmt = Statement {
            id: StatementId(1),
            method: MethodId(0),
            line: 10,
            kind: StatementKind::Call {
                callee: "com.db.Sql.query(String)".to_string(),
                receiver: Some(AccessPath::local("db")),
                args: vec![AccessPath::local("q")],
                result: Some(AccessPath::local("rows")),
            },
        };

        assert_eq!(stmt.invoked_signature(), Some("com.db.Sql.query(String)"));
        assert_eq!(stmt.call_args().len(), 1);
        assert_eq!(stmt.call_result(), Some(&AccessPath::local("rows")));
        assert_eq!(stmt.call_receiver(), Some(&AccessPath::local("db")));
    }

    #[test]
    fn test_non_call_accessors() {
        let stmt = Statement {
            id: StatementId(2),
            method: MethodId(0),
            line: 11,
            kind: StatementKind::Return { value: None },
        };

        assert_eq!(stmt.invoked_signature(), None);
        assert!(stmt.call_args().is_empty());
    }
}
