//! Naming convention for dependent objects.
//!
//! Indexes are named `IN_<table>_<col1>_<col2>…` and triggers
//! `TR_<table>_<suffix>`. Because the name encodes what the object points
//! at, a column rename can compute the object's new name mechanically.
//! [`ConventionalName`] can only be obtained through a constructor that
//! checks the convention, so an object whose name does not follow it is
//! rejected before anything is rewritten.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};

/// Kind of a dependent schema object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// An index.
    Index,
    /// A trigger.
    Trigger,
}

impl ObjectKind {
    /// Name prefix required by the convention.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Index => "IN_",
            Self::Trigger => "TR_",
        }
    }

    /// SQL keyword used in `CREATE <KIND>` / `DROP <KIND>`.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Index => "INDEX",
            Self::Trigger => "TRIGGER",
        }
    }

    /// Parses the `type` column of `sqlite_master`.
    #[must_use]
    pub fn from_master_type(kind: &str) -> Option<Self> {
        match kind {
            "index" => Some(Self::Index),
            "trigger" => Some(Self::Trigger),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index => write!(f, "index"),
            Self::Trigger => write!(f, "trigger"),
        }
    }
}

/// A dependent object name known to follow the naming convention.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConventionalName {
    kind: ObjectKind,
    table: String,
    suffix: String,
}

impl ConventionalName {
    /// Builds the conventional name of an index over `columns`.
    #[must_use]
    pub fn index<S: AsRef<str>>(table: &str, columns: &[S]) -> Self {
        let suffix = columns
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join("_");
        Self {
            kind: ObjectKind::Index,
            table: table.to_string(),
            suffix,
        }
    }

    /// Builds the conventional name of a trigger.
    #[must_use]
    pub fn trigger(table: &str, suffix: &str) -> Self {
        Self {
            kind: ObjectKind::Trigger,
            table: table.to_string(),
            suffix: suffix.to_string(),
        }
    }

    /// Validates an existing object name against the convention for `table`.
    pub fn parse(kind: ObjectKind, table: &str, name: &str) -> Result<Self> {
        let prefix = format!("{}{}_", kind.prefix(), table);
        let violation = || MigrateError::NamingConvention {
            object: format!("{kind} '{name}'"),
            table: table.to_string(),
            reason: format!("expected a name starting with '{prefix}'"),
        };

        if name.len() <= prefix.len() || !name.is_char_boundary(prefix.len()) {
            return Err(violation());
        }
        let (head, suffix) = name.split_at(prefix.len());
        if !head.eq_ignore_ascii_case(&prefix) {
            return Err(violation());
        }

        Ok(Self {
            kind,
            table: table.to_string(),
            suffix: suffix.to_string(),
        })
    }

    /// Returns the name this object takes once `old_column` is renamed.
    ///
    /// The old column must appear in the suffix on `_` boundaries;
    /// otherwise the new name cannot be derived and the rename is refused.
    pub fn with_column_renamed(&self, old_column: &str, new_column: &str) -> Result<Self> {
        let Some(at) = find_segment(&self.suffix, old_column) else {
            return Err(MigrateError::NamingConvention {
                object: format!("{} '{}'", self.kind, self),
                table: self.table.clone(),
                reason: format!("name does not embed column '{old_column}'"),
            });
        };

        let mut suffix = String::with_capacity(self.suffix.len() + new_column.len());
        suffix.push_str(&self.suffix[..at]);
        suffix.push_str(new_column);
        suffix.push_str(&self.suffix[at + old_column.len()..]);

        Ok(Self {
            kind: self.kind,
            table: self.table.clone(),
            suffix,
        })
    }

    /// Returns this name re-bound to another table, keeping the suffix.
    #[must_use]
    pub fn with_table(&self, table: &str) -> Self {
        Self {
            kind: self.kind,
            table: table.to_string(),
            suffix: self.suffix.clone(),
        }
    }

    /// Object kind.
    #[must_use]
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Table the name is bound to.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }
}

impl fmt::Display for ConventionalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}_{}", self.kind.prefix(), self.table, self.suffix)
    }
}

/// Finds `segment` inside `haystack`, aligned on `_` separators.
fn find_segment(haystack: &str, segment: &str) -> Option<usize> {
    if segment.is_empty() {
        return None;
    }
    let lower = haystack.to_ascii_lowercase();
    let needle = segment.to_ascii_lowercase();
    let bytes = lower.as_bytes();

    lower.match_indices(&needle).map(|(at, _)| at).find(|&at| {
        let end = at + needle.len();
        let starts = at == 0 || bytes[at - 1] == b'_';
        let ends = end == bytes.len() || bytes[end] == b'_';
        starts && ends
    })
}

/// Returns true if `name` is an index SQLite maintains on its own.
#[must_use]
pub fn is_internal(name: &str) -> bool {
    name.starts_with("sqlite_")
}
