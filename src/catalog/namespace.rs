/*!
Defining the [Namespace] struct for handling namespaces in the catalog.
*/

use core::fmt::{self, Display};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Namespace struct for iceberg catalogs. Serialized as its sequence of
/// levels, the REST representation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace {
    levels: Vec<String>,
}

impl Namespace {
    /// Try to create new namespace with sequence of strings.
    pub fn try_new(levels: &[String]) -> Result<Self> {
        if levels.iter().any(|level| level.is_empty()) {
            Err(Error::Validation(
                "cannot create a namespace with an empty level".to_string(),
            ))
        } else {
            Ok(Namespace {
                levels: levels.to_vec(),
            })
        }
    }

    /// Create empty namespace
    pub fn empty() -> Self {
        Namespace { levels: vec![] }
    }

    /// Get the namespace levels
    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    /// Get the number of levels
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Whether this is the empty namespace.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// The enclosing namespace, if there is one. Nested namespaces inherit
    /// permissions from their parent.
    pub fn parent(&self) -> Option<Namespace> {
        if self.levels.len() < 2 {
            None
        } else {
            Some(Namespace {
                levels: self.levels[..self.levels.len() - 1].to_vec(),
            })
        }
    }
}

impl Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            Itertools::intersperse(self.levels.iter().map(|level| level as &str), ".")
                .collect::<String>()
        )
    }
}
