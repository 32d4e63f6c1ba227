//! Units - the partition of work across runners
//!
//! A unit is an equivalence class of methods analyzed by a single runner.
//! Edges crossing units are shipped as messages through the summary
//! store rather than propagated directly.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::method::{Method, MethodId};

/// Equivalence class assigned to a runner
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Unit {
    /// The whole program as one unit
    Whole,
    Class(String),
    Package(String),
    Method(MethodId),
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Whole => write!(f, "<whole-program>"),
            Unit::Class(name) => write!(f, "class:{}", name),
            Unit::Package(name) => write!(f, "package:{}", name),
            Unit::Method(id) => write!(f, "method:{}", id),
        }
    }
}

/// Strategy mapping methods to units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum UnitResolver {
    Singleton,
    PerClass,
    PerPackage,
    #[default]
    PerMethod,
}

impl UnitResolver {
    pub fn resolve(&self, method: &Method) -> Unit {
        match self {
            UnitResolver::Singleton => Unit::Whole,
            UnitResolver::PerClass => Unit::Class(method.class_name.clone()),
            UnitResolver::PerPackage => Unit::Package(method.package().to_string()),
            UnitResolver::PerMethod => Unit::Method(method.id),
        }
    }
}
