use tracing::debug;

use crate::table::{ROW_ID_COLUMN, SurveyTable};

/// What a column is used for while rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    /// The row key column. Never shown as an answer.
    RowKey,
    /// Labels respondents in the detail and question views.
    Identifier,
    Question,
}

/// Ordered column name to role mapping. Resolved on load and whenever the
/// identifier choice changes.
#[derive(Debug, Clone)]
pub struct ColumnRegistry {
    entries: Vec<(String, ColumnRole)>,
    identifier: usize,
}

impl ColumnRegistry {
    pub fn resolve(table: &SurveyTable) -> Self {
        let names = table.column_names();
        let identifier = Self::default_identifier(&names);
        let mut registry = ColumnRegistry {
            entries: names
                .iter()
                .map(|n| (n.to_string(), ColumnRole::Question))
                .collect(),
            identifier,
        };
        registry.assign_roles();
        registry
    }

    /// First column whose name contains "name" in any case, else the first column.
    pub fn default_identifier<S: AsRef<str>>(names: &[S]) -> usize {
        names
            .iter()
            .position(|n| n.as_ref().to_lowercase().contains("name"))
            .unwrap_or(0)
    }

    /// Out of range indices are ignored.
    pub fn set_identifier(&mut self, idx: usize) {
        if idx < self.entries.len() && idx != self.identifier {
            self.identifier = idx;
            self.assign_roles();
        }
    }

    pub fn set_identifier_by_name(&mut self, name: &str) -> bool {
        match self.entries.iter().position(|(n, _)| n == name) {
            Some(idx) => {
                self.set_identifier(idx);
                true
            }
            None => false,
        }
    }

    fn assign_roles(&mut self) {
        for (idx, (name, role)) in self.entries.iter_mut().enumerate() {
            *role = if name == ROW_ID_COLUMN {
                ColumnRole::RowKey
            } else if idx == self.identifier {
                ColumnRole::Identifier
            } else {
                ColumnRole::Question
            };
        }
        debug!(
            "Identifier column is \"{}\" ({})",
            self.identifier_name(),
            self.identifier
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn role(&self, idx: usize) -> Option<ColumnRole> {
        self.entries.get(idx).map(|(_, role)| *role)
    }

    pub fn identifier(&self) -> usize {
        self.identifier
    }

    pub fn identifier_name(&self) -> &str {
        self.entries
            .get(self.identifier)
            .map(|(n, _)| n.as_str())
            .unwrap_or("")
    }

    /// Columns that carry answers: everything except the row key, in table order.
    /// The identifier column is included.
    pub fn answer_columns(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, (_, role))| *role != ColumnRole::RowKey)
            .map(|(idx, _)| idx)
            .collect()
    }
}
