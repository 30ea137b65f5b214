// Employee records as stored by the collection endpoint

use serde::{Deserialize, Serialize};
use std::fmt;

/// An employee record. `id` is assigned by the collection on create.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Employee {
    pub id: i64,
    pub name: String,
}

impl Employee {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Employee {
            id,
            name: name.into(),
        }
    }

    /// Two records are the same entity iff their ids match, whatever the name.
    pub fn same_entity(&self, other: &Employee) -> bool {
        self.id == other.id
    }
}

impl fmt::Display for Employee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.name)
    }
}

/// Create payload; the collection picks the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEmployee {
    pub name: String,
}

impl NewEmployee {
    pub fn new(name: impl Into<String>) -> Self {
        NewEmployee { name: name.into() }
    }
}

/// Case-insensitive substring match of `filter` against `name`.
/// An empty filter matches every name.
pub fn matches_name(name: &str, filter: &str) -> bool {
    if filter.is_empty() {
        return true;
    }
    name.to_lowercase().contains(&filter.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_entity_ignores_name() {
        let a = Employee::new(15, "Magneta");
        let b = Employee::new(15, "MagnetaX");
        let c = Employee::new(16, "Magneta");

        assert!(a.same_entity(&b));
        assert!(!a.same_entity(&c));
        assert_ne!(a, b);
    }

    #[test]
    fn test_matches_name_is_case_insensitive() {
        assert!(matches_name("RubberMan", "ma"));
        assert!(matches_name("Magneta", "MAG"));
        assert!(!matches_name("Narco", "ma"));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(matches_name("Tornado", ""));
    }

    #[test]
    fn test_filter_is_not_trimmed() {
        assert!(matches_name("Dr Nice", "r n"));
        assert!(!matches_name("Tornado", " to"));
    }

    #[test]
    fn test_display() {
        assert_eq!(Employee::new(11, "Dr Nice").to_string(), "11 Dr Nice");
    }
}
