//! Access paths - abstract storage locations
//!
//! An access path is a root (local variable, formal parameter, `this`, or
//! a static field) followed by a chain of field selectors. Two paths alias
//! exactly when roots match and selector sequences are equal; prefix tests
//! support field-sensitive kill/gen in the flow functions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Root of an access path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Root {
    /// Local variable by name
    Local(String),

    /// Formal parameter, encoded `argN`
    Arg(u32),

    /// Receiver of an instance method
    This,

    /// The enclosing method's returned value; stands in for the concrete
    /// `return` expression while a fact crosses a call boundary
    Return,

    /// Static field reference
    Static { class: String, field: String },
}

impl fmt::Display for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Root::Local(name) => write!(f, "{}", name),
            Root::Arg(n) => write!(f, "arg{}", n),
            Root::This => write!(f, "this"),
            Root::Return => write!(f, "return"),
            Root::Static { class, field } => write!(f, "{}#{}", class, field),
        }
    }
}

/// Access path: root plus field-selector chain
///
/// Example: `user.account.balance` is `Local("user")` with selectors
/// `["account", "balance"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccessPath {
    pub root: Root,
    pub selectors: Vec<String>,
}

impl AccessPath {
    /// Path consisting of a bare root
    pub fn root(root: Root) -> Self {
        Self {
            root,
            selectors: Vec::new(),
        }
    }

    /// Local variable path
    pub fn local(name: impl Into<String>) -> Self {
        Self::root(Root::Local(name.into()))
    }

    /// Formal parameter path
    pub fn arg(index: u32) -> Self {
        Self::root(Root::Arg(index))
    }

    /// Receiver path
    pub fn this() -> Self {
        Self::root(Root::This)
    }

    /// Returned-value path
    pub fn returned() -> Self {
        Self::root(Root::Return)
    }

    /// Static field path
    pub fn static_field(class: impl Into<String>, field: impl Into<String>) -> Self {
        Self::root(Root::Static {
            class: class.into(),
            field: field.into(),
        })
    }

    /// Extend with one more field selector
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.selectors.push(name.into());
        self
    }

    /// Number of field selectors
    pub fn depth(&self) -> usize {
        self.selectors.len()
    }

    /// Whether `self` starts with `prefix` (same root, `prefix.selectors`
    /// a prefix of `self.selectors`). Equality counts as a prefix.
    pub fn starts_with(&self, prefix: &AccessPath) -> bool {
        self.root == prefix.root
            && self.selectors.len() >= prefix.selectors.len()
            && self.selectors[..prefix.selectors.len()] == prefix.selectors[..]
    }

    /// Re-root a path: if `self` starts with `from`, replace that prefix
    /// with `to`, keeping the remaining selectors.
    ///
    /// Used by the call transitions to substitute actual arguments into
    /// formal parameters and back. Returns `None` when `self` does not
    /// start with `from`.
    pub fn rebased(&self, from: &AccessPath, to: &AccessPath) -> Option<AccessPath> {
        if !self.starts_with(from) {
            return None;
        }
        let mut selectors = to.selectors.clone();
        selectors.extend_from_slice(&self.selectors[from.selectors.len()..]);
        Some(AccessPath {
            root: to.root.clone(),
            selectors,
        })
    }

    /// Truncate the selector chain to `depth` selectors.
    ///
    /// The analysis domain must stay finite per method; paths past the
    /// structural bound are widened to their prefix instead of rejected.
    pub fn truncated(mut self, depth: usize) -> AccessPath {
        self.selectors.truncate(depth);
        self
    }
}

impl fmt::Display for AccessPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for sel in &self.selectors {
            write!(f, ".{}", sel)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix() {
        let user = AccessPath::local("user");
        let name = AccessPath::local("user").field("name");

        assert!(name.starts_with(&user));
        assert!(name.starts_with(&name));
        assert!(!user.starts_with(&name));
        assert!(!name.starts_with(&AccessPath::local("other")));
    }

    #[test]
    fn test_rebase() {
        // call f(user.account) with formal arg0: user.account.balance -> arg0.balance
        let actual = AccessPath::local("user").field("account");
        let formal = AccessPath::arg(0);
        let fact = AccessPath::local("user").field("account").field("balance");

        let rebased = fact.rebased(&actual, &formal).unwrap();
        assert_eq!(rebased, AccessPath::arg(0).field("balance"));

        // unrelated path does not rebase
        assert!(AccessPath::local("x").rebased(&actual, &formal).is_none());
    }

    #[test]
    fn test_truncation() {
        let deep = AccessPath::local("a")
            .field("b")
            .field("c")
            .field("d");
        assert_eq!(deep.clone().truncated(2).selectors, vec!["b", "c"]);
        assert_eq!(deep.clone().truncated(10).depth(), 3);
    }

    #[test]
    fn test_display() {
        let path = AccessPath::arg(1).field("header");
        assert_eq!(path.to_string(), "arg1.header");
        assert_eq!(AccessPath::this().to_string(), "this");
        assert_eq!(AccessPath::returned().to_string(), "return");
        assert_eq!(
            AccessPath::static_field("com.app.Env", "HOME").to_string(),
            "com.app.Env#HOME"
        );
    }
}
