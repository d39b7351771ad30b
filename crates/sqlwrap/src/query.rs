//! The fluent statement builder.

use crate::database::Database;
use serde::{Deserialize, Serialize};
use sqlwrap_core::{Row, Value};

/// Quote an identifier for embedding in SQL text.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Comparison operator for filter predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    NotEqual,
    Equal,
    GreaterThan,
    LessThan,
    Like,
}

impl Comparator {
    /// The SQL operator this comparator renders to.
    pub const fn op(self) -> &'static str {
        match self {
            Comparator::NotEqual => "<>",
            Comparator::Equal => "=",
            Comparator::GreaterThan => ">",
            Comparator::LessThan => "<",
            Comparator::Like => "LIKE",
        }
    }
}

/// Sort direction for ORDER BY clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Ascending,
    Descending,
}

/// One ORDER BY term: a column and a direction.
///
/// A bare column name converts to an ascending term, so
/// `query.order_by("name")` and `query.order_by(OrderBy::desc("age"))`
/// both work.
#[derive(Debug, Clone)]
pub struct OrderBy {
    column: String,
    direction: Direction,
}

impl OrderBy {
    /// Order by a column, ascending.
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Ascending,
        }
    }

    /// Order by a column, descending.
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Descending,
        }
    }

    fn to_sql(&self) -> String {
        let dir = match self.direction {
            Direction::Ascending => "ASC",
            Direction::Descending => "DESC",
        };
        format!("{} {}", quote_ident(&self.column), dir)
    }
}

impl From<&str> for OrderBy {
    fn from(column: &str) -> Self {
        OrderBy::asc(column)
    }
}

impl From<String> for OrderBy {
    fn from(column: String) -> Self {
        OrderBy::asc(column)
    }
}

/// One conjunctive predicate: column, comparator, bound value.
#[derive(Debug, Clone)]
struct FilterClause {
    column: String,
    comparator: Comparator,
    value: Value,
}

/// The operation a builder was seeded with.
#[derive(Debug, Clone)]
pub(crate) enum Operation {
    Create {
        columns: Vec<(String, crate::schema::ColumnType)>,
        constraints: Option<String>,
    },
    Insert {
        values: Vec<(String, Value)>,
    },
    Select {
        columns: Vec<String>,
    },
    Update {
        assignments: Vec<(String, Value)>,
    },
    Delete,
}

/// A fluent, single-use statement builder.
///
/// Created by the [`Database`] CRUD methods pre-seeded with operation and
/// table. Chain [`filter`](Query::filter) and [`order_by`](Query::order_by),
/// then call [`execute`](Query::execute); afterwards the rendered
/// statement, the results or insert id, and any captured error are
/// readable. A builder is finalized by execution: further chaining calls
/// record an error instead of mutating.
///
/// Engine failures never panic or raise; they land in the builder's error
/// field and [`check_error`](Query::check_error) is the inspection point.
pub struct Query<'db> {
    db: &'db Database,
    op: Operation,
    table: String,
    filters: Vec<FilterClause>,
    order: Vec<OrderBy>,
    statement: String,
    results: Vec<Row>,
    insert_id: Option<i64>,
    error: Option<String>,
    executed: bool,
}

impl<'db> Query<'db> {
    pub(crate) fn new(db: &'db Database, op: Operation, table: impl Into<String>) -> Self {
        Self {
            db,
            op,
            table: table.into(),
            filters: Vec::new(),
            order: Vec::new(),
            statement: String::new(),
            results: Vec::new(),
            insert_id: None,
            error: None,
            executed: false,
        }
    }

    /// Append one conjunctive predicate. Multiple calls AND together;
    /// there is no OR.
    pub fn filter(
        mut self,
        column: impl Into<String>,
        comparator: Comparator,
        value: impl Into<Value>,
    ) -> Self {
        if self.executed {
            self.note_finalized("filter");
            return self;
        }
        self.filters.push(FilterClause {
            column: column.into(),
            comparator,
            value: value.into(),
        });
        self
    }

    /// Append one ORDER BY term (ascending by default for a bare column
    /// name). Multiple calls append in order.
    pub fn order_by(mut self, order: impl Into<OrderBy>) -> Self {
        if self.executed {
            self.note_finalized("order_by");
            return self;
        }
        self.order.push(order.into());
        self
    }

    /// Append a sequence of ORDER BY terms in one call.
    pub fn order_by_all<I, O>(mut self, orders: I) -> Self
    where
        I: IntoIterator<Item = O>,
        O: Into<OrderBy>,
    {
        if self.executed {
            self.note_finalized("order_by_all");
            return self;
        }
        self.order.extend(orders.into_iter().map(Into::into));
        self
    }

    /// Render the statement, run it, and capture the outcome.
    ///
    /// Returns `self` so results are immediately inspectable. A second
    /// call records an error instead of re-running.
    pub fn execute(mut self) -> Self {
        if self.executed {
            self.note_finalized("execute");
            return self;
        }
        self.executed = true;

        // An update with nothing to set has no valid rendering; treat it
        // as a successful no-op without touching the engine.
        if matches!(&self.op, Operation::Update { assignments } if assignments.is_empty()) {
            return self;
        }

        let (sql, params) = self.render();
        self.statement = sql;
        tracing::debug!(sql = %self.statement, "executing");

        let db = self.db;
        match &self.op {
            Operation::Select { .. } => {
                // A table the engine does not know degrades to an empty
                // result set, not an error. The cache lookup self-heals,
                // so a freshly created table is never misreported.
                if db.keys_for_table(&self.table).is_empty() {
                    tracing::debug!(table = %self.table, "select on unknown table");
                } else {
                    match db.conn.query(&self.statement, &params) {
                        Ok(rows) => self.results = rows,
                        Err(e) => self.error = Some(e.to_string()),
                    }
                }
            }
            Operation::Insert { .. } => match db.conn.insert(&self.statement, &params) {
                Ok(id) => self.insert_id = Some(id),
                Err(e) => self.error = Some(e.to_string()),
            },
            Operation::Create { .. } => match db.conn.execute(&self.statement, &params) {
                Ok(_) => db.schema.refresh_table(&db.conn, &self.table),
                Err(e) => self.error = Some(e.to_string()),
            },
            Operation::Update { .. } | Operation::Delete => {
                if let Err(e) = db.conn.execute(&self.statement, &params) {
                    self.error = Some(e.to_string());
                }
            }
        }

        self
    }

    /// Returns true and records the captured diagnostic prefixed with
    /// `context` if the last engine call failed; false otherwise.
    pub fn check_error(&mut self, context: &str) -> bool {
        match self.error.take() {
            Some(msg) => {
                let full = format!("{}: {}", context, msg);
                tracing::error!(error = %full, "statement failed");
                self.error = Some(full);
                true
            }
            None => false,
        }
    }

    /// The rendered SQL text, available after `execute`.
    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// Result rows of a SELECT, empty for other operations.
    pub fn results(&self) -> &[Row] {
        &self.results
    }

    /// The rowid captured after a successful INSERT.
    pub fn insert_id(&self) -> Option<i64> {
        self.insert_id
    }

    /// The captured error, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn note_finalized(&mut self, method: &str) {
        if self.error.is_none() {
            self.error = Some(format!("query already executed; {} ignored", method));
        }
    }

    fn render(&self) -> (String, Vec<Value>) {
        let mut params = Vec::new();

        let mut sql = match &self.op {
            Operation::Create {
                columns,
                constraints,
            } => {
                let mut defs: Vec<String> = columns
                    .iter()
                    .map(|(name, ty)| format!("{} {}", quote_ident(name), ty.sql()))
                    .collect();
                if let Some(extra) = constraints {
                    if !extra.is_empty() {
                        defs.push(extra.clone());
                    }
                }
                format!(
                    "CREATE TABLE IF NOT EXISTS {} ({})",
                    quote_ident(&self.table),
                    defs.join(", ")
                )
            }

            Operation::Insert { values } => {
                if values.is_empty() {
                    // No keys supplied; avoid malformed "INSERT INTO t () VALUES ()"
                    format!("INSERT INTO {} DEFAULT VALUES", quote_ident(&self.table))
                } else {
                    let cols: Vec<String> =
                        values.iter().map(|(name, _)| quote_ident(name)).collect();
                    let marks = vec!["?"; values.len()].join(", ");
                    params.extend(values.iter().map(|(_, v)| v.clone()));
                    format!(
                        "INSERT INTO {} ({}) VALUES ({})",
                        quote_ident(&self.table),
                        cols.join(", "),
                        marks
                    )
                }
            }

            Operation::Select { columns } => {
                let cols = if columns.is_empty() {
                    "*".to_string()
                } else {
                    columns
                        .iter()
                        .map(|c| if c.as_str() == "*" { c.clone() } else { quote_ident(c) })
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                format!("SELECT {} FROM {}", cols, quote_ident(&self.table))
            }

            Operation::Update { assignments } => {
                let sets: Vec<String> = assignments
                    .iter()
                    .map(|(name, _)| format!("{} = ?", quote_ident(name)))
                    .collect();
                params.extend(assignments.iter().map(|(_, v)| v.clone()));
                format!(
                    "UPDATE {} SET {}",
                    quote_ident(&self.table),
                    sets.join(", ")
                )
            }

            Operation::Delete => format!("DELETE FROM {}", quote_ident(&self.table)),
        };

        let filters_apply = matches!(
            self.op,
            Operation::Select { .. } | Operation::Update { .. } | Operation::Delete
        );
        if filters_apply && !self.filters.is_empty() {
            let preds: Vec<String> = self
                .filters
                .iter()
                .map(|f| format!("{} {} ?", quote_ident(&f.column), f.comparator.op()))
                .collect();
            params.extend(self.filters.iter().map(|f| f.value.clone()));
            sql.push_str(" WHERE ");
            sql.push_str(&preds.join(" AND "));
        }

        if matches!(self.op, Operation::Select { .. }) && !self.order.is_empty() {
            let terms: Vec<String> = self.order.iter().map(OrderBy::to_sql).collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        (sql, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::schema::ColumnType;

    fn test_db() -> Database {
        let db = Database::open_memory().unwrap();
        let q = db
            .create(
                "users",
                &[
                    ("id", ColumnType::IntegerPrimaryKey),
                    ("name", ColumnType::Text),
                    ("age", ColumnType::Int),
                ],
                None,
            )
            .execute();
        assert!(q.error().is_none());
        db
    }

    #[test]
    fn test_comparator_operators() {
        assert_eq!(Comparator::NotEqual.op(), "<>");
        assert_eq!(Comparator::Equal.op(), "=");
        assert_eq!(Comparator::GreaterThan.op(), ">");
        assert_eq!(Comparator::LessThan.op(), "<");
        assert_eq!(Comparator::Like.op(), "LIKE");
    }

    #[test]
    fn test_create_statement() {
        let db = Database::open_memory().unwrap();
        let q = db
            .create(
                "t",
                &[("id", ColumnType::IntegerPrimaryKey), ("v", ColumnType::Real)],
                Some("UNIQUE(\"v\")"),
            )
            .execute();
        assert_eq!(
            q.statement(),
            "CREATE TABLE IF NOT EXISTS \"t\" (\"id\" INTEGER PRIMARY KEY, \"v\" REAL, UNIQUE(\"v\"))"
        );
        assert!(q.error().is_none());
    }

    #[test]
    fn test_insert_statement() {
        let db = test_db();
        let q = db
            .insert_into(
                "users",
                &[("name", Value::from("Ann")), ("age", Value::from(30))],
            )
            .execute();
        assert_eq!(
            q.statement(),
            "INSERT INTO \"users\" (\"name\", \"age\") VALUES (?, ?)"
        );
        assert_eq!(q.insert_id(), Some(1));
    }

    #[test]
    fn test_empty_insert_renders_default_values() {
        let db = test_db();
        let q = db.insert_into("users", &[]).execute();
        assert_eq!(q.statement(), "INSERT INTO \"users\" DEFAULT VALUES");
        assert_eq!(q.insert_id(), Some(1));
    }

    #[test]
    fn test_select_statement_with_filters_and_order() {
        let db = test_db();
        let q = db
            .select(&["name", "age"], "users")
            .filter("age", Comparator::GreaterThan, 20)
            .filter("name", Comparator::NotEqual, "Bob")
            .order_by(OrderBy::desc("age"))
            .order_by("name")
            .execute();
        assert_eq!(
            q.statement(),
            "SELECT \"name\", \"age\" FROM \"users\" WHERE \"age\" > ? AND \"name\" <> ? ORDER BY \"age\" DESC, \"name\" ASC"
        );
        assert!(q.error().is_none());
    }

    #[test]
    fn test_order_by_all_appends_terms() {
        let db = test_db();
        let q = db
            .select(&[], "users")
            .order_by_all(["age", "name"])
            .execute();
        assert_eq!(
            q.statement(),
            "SELECT * FROM \"users\" ORDER BY \"age\" ASC, \"name\" ASC"
        );
    }

    #[test]
    fn test_select_star_when_no_columns() {
        let db = test_db();
        let q = db.select(&[], "users").execute();
        assert_eq!(q.statement(), "SELECT * FROM \"users\"");
    }

    #[test]
    fn test_update_statement() {
        let db = test_db();
        db.insert_into("users", &[("name", Value::from("Ann")), ("age", Value::from(30))])
            .execute();
        let q = db
            .update("users", &[("age", Value::from(31))])
            .filter("name", Comparator::Equal, "Ann")
            .execute();
        assert_eq!(
            q.statement(),
            "UPDATE \"users\" SET \"age\" = ? WHERE \"name\" = ?"
        );
        assert!(q.error().is_none());
    }

    #[test]
    fn test_empty_update_is_noop() {
        let db = test_db();
        let q = db.update("users", &[]).execute();
        assert_eq!(q.statement(), "");
        assert!(q.error().is_none());
    }

    #[test]
    fn test_delete_statement() {
        let db = test_db();
        let q = db
            .delete_from("users")
            .filter("age", Comparator::LessThan, 18)
            .execute();
        assert_eq!(q.statement(), "DELETE FROM \"users\" WHERE \"age\" < ?");
        assert!(q.error().is_none());
    }

    #[test]
    fn test_executed_guard() {
        let db = test_db();
        let q = db.select(&[], "users").execute();
        let mut q = q.filter("age", Comparator::Equal, 1);
        assert!(q.check_error("post-execute mutation"));
        assert!(q.error().unwrap().contains("already executed"));
    }

    #[test]
    fn test_check_error_prefixes_context() {
        let db = test_db();
        // Selecting an unknown column is an engine error
        let mut q = db.select(&["nope"], "users").execute();
        assert!(q.check_error("select users"));
        assert!(q.error().unwrap().starts_with("select users: "));

        let mut ok = db
            .create("t", &[("id", ColumnType::Int)], None)
            .execute();
        assert!(!ok.check_error("create"));
    }

    #[test]
    fn test_select_unknown_table_yields_empty() {
        let db = Database::open_memory().unwrap();
        let mut q = db.select(&[], "missing").execute();
        assert!(q.results().is_empty());
        assert!(!q.check_error("select missing"));
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("plain"), "\"plain\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
