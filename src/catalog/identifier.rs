/*!
Defining the [TableIdentifier] struct for identifying tables in an iceberg catalog.
*/

use core::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use super::namespace::Namespace;
use crate::error::{Error, Result};

/// Separator of different namespace levels.
pub static SEPARATOR: &str = ".";

///Identifies a table in an iceberg catalog.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableIdentifier {
    namespace: Namespace,
    name: String,
}

impl TableIdentifier {
    ///Create TableIdentifier
    pub fn try_new(names: &[String]) -> Result<Self> {
        let length = names.len();
        if names.is_empty() {
            Err(Error::Validation(
                "cannot create a table identifier from an empty sequence".to_string(),
            ))
        } else if names[length - 1].is_empty() {
            Err(Error::Validation("table name cannot be empty".to_string()))
        } else {
            Ok(TableIdentifier {
                namespace: Namespace::try_new(&names[0..length - 1])?,
                name: names[length - 1].clone(),
            })
        }
    }

    ///Parse a dotted identifier string.
    pub fn parse(identifier: &str) -> Result<Self> {
        let names = identifier
            .split(SEPARATOR)
            .map(|part| part.to_string())
            .collect::<Vec<String>>();
        TableIdentifier::try_new(&names)
    }

    /// Return namespace of table
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Return name of table
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Display for TableIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}{}{}", self.namespace, SEPARATOR, self.name)
        }
    }
}
