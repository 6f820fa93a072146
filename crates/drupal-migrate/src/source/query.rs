//! Select-query builder for legacy tables.
//!
//! Sources describe what they read (base table, fields, joins, conditions)
//! and the cursor wraps the result for paging and high-water filtering.
//! Every identifier is quoted and every value is bound.

use crate::core::identifier::{quote, quote_qualified};
use crate::core::value::Value;
use crate::error::Result;

/// Join kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

#[derive(Debug, Clone, PartialEq)]
struct Join {
    kind: JoinKind,
    table: String,
    alias: String,
    left: String,
    right: String,
}

/// Comparison operator of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    Gt,
    Lt,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, PartialEq)]
struct Condition {
    field: String,
    op: Operator,
    values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
enum Field {
    All(String),
    Column { column: String, alias: String },
}

/// A `SELECT` over one base table with optional joins.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    table: String,
    alias: String,
    fields: Vec<Field>,
    joins: Vec<Join>,
    conditions: Vec<Condition>,
    order_by: Vec<(String, bool)>,
    distinct: bool,
}

impl SelectQuery {
    /// Start a query on `table AS alias`.
    pub fn new(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: alias.into(),
            fields: Vec::new(),
            joins: Vec::new(),
            conditions: Vec::new(),
            order_by: Vec::new(),
            distinct: false,
        }
    }

    /// Base table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Every table the query reads.
    pub fn tables(&self) -> Vec<&str> {
        let mut tables = vec![self.table.as_str()];
        tables.extend(self.joins.iter().map(|j| j.table.as_str()));
        tables
    }

    /// Select every column of an alias.
    pub fn all_fields(mut self, alias: &str) -> Self {
        self.fields.push(Field::All(alias.to_string()));
        self
    }

    /// Select columns of an alias under their own names.
    pub fn fields(mut self, alias: &str, columns: &[&str]) -> Self {
        for column in columns {
            self.fields.push(Field::Column {
                column: format!("{}.{}", alias, column),
                alias: (*column).to_string(),
            });
        }
        self
    }

    /// Select one qualified column under another name.
    pub fn field_as(mut self, column: &str, alias: &str) -> Self {
        self.fields.push(Field::Column {
            column: column.to_string(),
            alias: alias.to_string(),
        });
        self
    }

    /// `INNER JOIN table AS alias ON left = right`.
    pub fn join(self, table: &str, alias: &str, left: &str, right: &str) -> Self {
        self.add_join(JoinKind::Inner, table, alias, left, right)
    }

    /// `LEFT JOIN table AS alias ON left = right`.
    pub fn left_join(self, table: &str, alias: &str, left: &str, right: &str) -> Self {
        self.add_join(JoinKind::Left, table, alias, left, right)
    }

    fn add_join(mut self, kind: JoinKind, table: &str, alias: &str, left: &str, right: &str) -> Self {
        self.joins.push(Join {
            kind,
            table: table.to_string(),
            alias: alias.to_string(),
            left: left.to_string(),
            right: right.to_string(),
        });
        self
    }

    /// Add a condition with a single value.
    pub fn condition(mut self, field: &str, op: Operator, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition {
            field: field.to_string(),
            op,
            values: vec![value.into()],
        });
        self
    }

    /// `field IN (values)`. An empty list matches nothing.
    pub fn condition_in(mut self, field: &str, values: Vec<Value>) -> Self {
        self.conditions.push(Condition {
            field: field.to_string(),
            op: Operator::In,
            values,
        });
        self
    }

    /// `field IS NULL` / `field IS NOT NULL`.
    pub fn is_null(mut self, field: &str, null: bool) -> Self {
        self.conditions.push(Condition {
            field: field.to_string(),
            op: if null { Operator::IsNull } else { Operator::IsNotNull },
            values: Vec::new(),
        });
        self
    }

    /// Order by a column, ascending or descending.
    pub fn order_by(mut self, field: &str, ascending: bool) -> Self {
        self.order_by.push((field.to_string(), ascending));
        self
    }

    /// `SELECT DISTINCT`.
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Render SQL and its bound parameters.
    pub fn to_sql(&self) -> Result<(String, Vec<Value>)> {
        let mut params = Vec::new();
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }

        let fields = if self.fields.is_empty() {
            vec![format!("{}.*", quote(&self.alias)?)]
        } else {
            self.fields
                .iter()
                .map(|f| match f {
                    Field::All(alias) => Ok(format!("{}.*", quote(alias)?)),
                    Field::Column { column, alias } => {
                        Ok(format!("{} AS {}", quote_qualified(column)?, quote(alias)?))
                    }
                })
                .collect::<Result<Vec<_>>>()?
        };
        sql.push_str(&fields.join(", "));
        sql.push_str(&format!(" FROM {} {}", quote(&self.table)?, quote(&self.alias)?));

        for join in &self.joins {
            let keyword = match join.kind {
                JoinKind::Inner => "INNER JOIN",
                JoinKind::Left => "LEFT JOIN",
            };
            sql.push_str(&format!(
                " {} {} {} ON {} = {}",
                keyword,
                quote(&join.table)?,
                quote(&join.alias)?,
                quote_qualified(&join.left)?,
                quote_qualified(&join.right)?
            ));
        }

        if !self.conditions.is_empty() {
            let mut clauses = Vec::new();
            for c in &self.conditions {
                let field = quote_qualified(&c.field)?;
                let clause = match c.op {
                    Operator::IsNull => format!("{} IS NULL", field),
                    Operator::IsNotNull => format!("{} IS NOT NULL", field),
                    Operator::In | Operator::NotIn if c.values.is_empty() => {
                        if c.op == Operator::In { "0 = 1".to_string() } else { "1 = 1".to_string() }
                    }
                    Operator::In | Operator::NotIn => {
                        params.extend(c.values.iter().cloned());
                        format!(
                            "{} {} ({})",
                            field,
                            if c.op == Operator::In { "IN" } else { "NOT IN" },
                            vec!["?"; c.values.len()].join(", ")
                        )
                    }
                    op => {
                        params.extend(c.values.iter().take(1).cloned());
                        let symbol = match op {
                            Operator::Eq => "=",
                            Operator::NotEq => "<>",
                            Operator::Gt => ">",
                            _ => "<",
                        };
                        format!("{} {} ?", field, symbol)
                    }
                };
                clauses.push(clause);
            }
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if !self.order_by.is_empty() {
            let order = self
                .order_by
                .iter()
                .map(|(f, asc)| Ok(format!("{} {}", quote_qualified(f)?, if *asc { "ASC" } else { "DESC" })))
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }

        Ok((sql, params))
    }
}
