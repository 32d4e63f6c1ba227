//! Method model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Method identifier
///
/// Identity-based equality with a cheap total order; used everywhere the
/// engine needs deterministic iteration over methods.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct MethodId(pub u32);

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// A procedure in the analyzed program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Method {
    pub id: MethodId,

    /// Fully qualified class name, e.g. `com.app.UserService`
    pub class_name: String,

    /// Simple method name
    pub name: String,

    /// Descriptor-ish suffix, e.g. `(String)`, kept as opaque text
    pub descriptor: String,

    /// Source file, when the class database knows it
    pub source_file: Option<String>,
}

impl Method {
    /// Signature string the rule matchers run against:
    /// `com.app.UserService.find(String)`
    pub fn signature(&self) -> String {
        format!("{}.{}{}", self.class_name, self.name, self.descriptor)
    }

    /// Package portion of the class name (empty for the default package)
    pub fn package(&self) -> &str {
        match self.class_name.rfind('.') {
            Some(idx) => &self.class_name[..idx],
            None => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(class: &str) -> Method {
        Method {
            id: MethodId(0),
            class_name: class.to_string(),
            name: "run".to_string(),
            descriptor: "()".to_string(),
            source_file: None,
        }
    }

    #[test]
    fn test_signature() {
        let m = method("com.app.Job");
        assert_eq!(m.signature(), "com.app.Job.run()");
    }

    #[test]
    fn test_package() {
        assert_eq!(method("com.app.Job").package(), "com.app");
        assert_eq!(method("Job").package(), "");
    }

    #[test]
    fn test_id_order() {
        let mut ids = vec![MethodId(3), MethodId(1), MethodId(2)];
        ids.sort();
        assert_eq!(ids, vec![MethodId(1), MethodId(2), MethodId(3)]);
    }
}
