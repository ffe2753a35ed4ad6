//! File selector — composable predicate builder for ad hoc reporting and
//! bulk administrative status changes.
//!
//! At most one of each condition kind (action-status, explicit file set,
//! raw condition) is ANDed together, implicitly scoped to the caller's
//! workflow context the same way the stats file count is. A subset stage
//! then limits the filtered set.

use rusqlite::types::ToSql;

use crate::db::{Database, DatabaseError};
use crate::status::ActionStatus;

/// How large a subset to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubsetSize {
    /// An absolute number of files.
    Count(u64),
    /// A percentage of the filtered set, floored to a whole count.
    Percent(u32),
}

/// Subset-limiting stage applied after filtering.
#[derive(Debug, Clone, Copy)]
pub struct Subset {
    /// Random selection instead of the deterministic file-id order.
    pub random: bool,
    /// Take from the bottom of the ordering instead of the top.
    pub from_bottom: bool,
    pub size: SubsetSize,
    /// Rows to skip before taking, for paging.
    pub offset: u64,
}

impl Subset {
    /// A deterministic top-of-ordering subset of `n` files.
    pub fn count(n: u64) -> Self {
        Self {
            random: false,
            from_bottom: false,
            size: SubsetSize::Count(n),
            offset: 0,
        }
    }

    /// A deterministic top-of-ordering subset of `percent`% of the set.
    pub fn percent(percent: u32) -> Self {
        Self {
            random: false,
            from_bottom: false,
            size: SubsetSize::Percent(percent),
            offset: 0,
        }
    }

    pub fn random(mut self) -> Self {
        self.random = true;
        self
    }

    pub fn from_bottom(mut self) -> Self {
        self.from_bottom = true;
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }
}

/// Builder for a file query.
#[derive(Debug, Clone, Default)]
pub struct FileSelector {
    action_status: Option<(String, Option<ActionStatus>)>,
    file_set: Option<Vec<i64>>,
    raw_condition: Option<String>,
    subset: Option<Subset>,
}

impl FileSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to files whose named action has the given status in the
    /// current workflow context. `None` means unattempted (no status row).
    pub fn action_status(mut self, action: &str, status: Option<ActionStatus>) -> Self {
        self.action_status = Some((action.to_string(), status));
        self
    }

    /// Restrict to an explicit, materialized set of file ids.
    pub fn file_set(mut self, ids: Vec<i64>) -> Self {
        self.file_set = Some(ids);
        self
    }

    /// Restrict by a raw boolean SQL condition over the `files f` alias.
    pub fn raw_condition(mut self, condition: &str) -> Self {
        self.raw_condition = Some(condition.to_string());
        self
    }

    /// Apply a subset-limiting stage after filtering.
    pub fn subset(mut self, subset: Subset) -> Self {
        self.subset = Some(subset);
        self
    }

    /// Materializes the selected file ids under the given workflow context.
    pub(crate) fn select_file_ids(
        &self,
        db: &Database,
        workflow_id: Option<i64>,
    ) -> Result<Vec<i64>, DatabaseError> {
        let mut conditions: Vec<String> = Vec::new();
        let mut param_values: Vec<Box<dyn ToSql>> = Vec::new();

        // Workflow-context scoping: only files visible in the context, the
        // union across all scopes when no workflow is selected.
        match workflow_id {
            Some(workflow) => {
                param_values.push(Box::new(workflow));
                conditions.push(format!(
                    "EXISTS (SELECT 1 FROM file_action_status s
                       JOIN actions a ON a.id = s.action_id
                       WHERE s.file_id = f.id AND a.workflow_id = ?{})",
                    param_values.len()
                ));
            }
            None => {
                conditions.push(
                    "EXISTS (SELECT 1 FROM file_action_status s WHERE s.file_id = f.id)"
                        .to_string(),
                );
            }
        }

        if let Some((action, status)) = &self.action_status {
            param_values.push(Box::new(action.clone()));
            let mut subquery = format!(
                "SELECT 1 FROM file_action_status s
                 JOIN actions a ON a.id = s.action_id
                 WHERE s.file_id = f.id AND a.name = ?{}",
                param_values.len()
            );
            if let Some(workflow) = workflow_id {
                param_values.push(Box::new(workflow));
                subquery.push_str(&format!(" AND a.workflow_id = ?{}", param_values.len()));
            }
            match status {
                Some(status) => {
                    param_values.push(Box::new(*status));
                    subquery.push_str(&format!(" AND s.status = ?{}", param_values.len()));
                    conditions.push(format!("EXISTS ({})", subquery));
                }
                // Unattempted: no row at all for the action.
                None => conditions.push(format!("NOT EXISTS ({})", subquery)),
            }
        }

        if let Some(ids) = &self.file_set {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders: Vec<String> = ids
                .iter()
                .map(|id| {
                    param_values.push(Box::new(*id));
                    format!("?{}", param_values.len())
                })
                .collect();
            conditions.push(format!("f.id IN ({})", placeholders.join(", ")));
        }

        if let Some(raw) = &self.raw_condition {
            conditions.push(format!("({})", raw));
        }

        let where_clause = format!("WHERE {}", conditions.join(" AND "));

        db.with_conn(|conn| {
            let params_ref: Vec<&dyn ToSql> = param_values.iter().map(|p| p.as_ref()).collect();

            let (order_clause, limit_clause) = match &self.subset {
                None => ("ORDER BY f.id ASC".to_string(), String::new()),
                Some(subset) => {
                    let total: u64 = match subset.size {
                        SubsetSize::Count(_) => 0,
                        SubsetSize::Percent(_) => conn.query_row(
                            &format!("SELECT COUNT(*) FROM files f {}", where_clause),
                            params_ref.as_slice(),
                            |r| r.get(0),
                        )?,
                    };
                    let limit = match subset.size {
                        SubsetSize::Count(n) => n,
                        // Integer division floors the percentage.
                        SubsetSize::Percent(p) => total * u64::from(p) / 100,
                    };
                    let order = if subset.random {
                        "ORDER BY RANDOM()".to_string()
                    } else if subset.from_bottom {
                        "ORDER BY f.id DESC".to_string()
                    } else {
                        "ORDER BY f.id ASC".to_string()
                    };
                    (order, format!("LIMIT {} OFFSET {}", limit, subset.offset))
                }
            };

            let sql = format!(
                "SELECT f.id FROM files f {} {} {}",
                where_clause, order_clause, limit_clause
            );
            let mut stmt = conn.prepare(&sql)?;
            let ids: Vec<i64> = stmt
                .query_map(params_ref.as_slice(), |r| r.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }
}
