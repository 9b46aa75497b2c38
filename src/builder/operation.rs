//! Clause kinds and the transitions that force a unit to be nested.

use serde::Serialize;
use std::fmt;

/// A clause application on a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Operation {
    Select,
    Join,
    Where,
    GroupBy,
    OrderBy,
    Top,
    Distinct,
    RowOffset,
    RowsPerPage,
    Union,
}

impl Operation {
    pub const ALL: [Operation; 10] = [
        Operation::Select,
        Operation::Join,
        Operation::Where,
        Operation::GroupBy,
        Operation::OrderBy,
        Operation::Top,
        Operation::Distinct,
        Operation::RowOffset,
        Operation::RowsPerPage,
        Operation::Union,
    ];

    /// Whether applying `next` after `last` must first move the unit into a
    /// derived table. A fresh unit (`last == None`) never wraps.
    pub fn requires_wrap(last: Option<Operation>, next: Operation) -> bool {
        use Operation::*;

        let Some(last) = last else {
            return false;
        };

        match last {
            Select => matches!(next, Where | GroupBy | Select | Join),
            Join | Where | GroupBy => false,
            OrderBy => matches!(next, GroupBy | Distinct | Union),
            Top => next != Select,
            Distinct => matches!(next, Select | Join | Where | GroupBy | Distinct),
            RowOffset => !matches!(next, Select | RowsPerPage),
            RowsPerPage => next != Select,
            Union => true,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Select => "SELECT",
            Operation::Join => "JOIN",
            Operation::Where => "WHERE",
            Operation::GroupBy => "GROUP BY",
            Operation::OrderBy => "ORDER BY",
            Operation::Top => "TOP",
            Operation::Distinct => "DISTINCT",
            Operation::RowOffset => "OFFSET",
            Operation::RowsPerPage => "FETCH",
            Operation::Union => "UNION",
        };
        f.write_str(name)
    }
}
