//! Query parameters, lookups and aggregates

use crate::errors::{QuarryError, Result};
use crate::record::Record;
use crate::result_set::ResultSet;
use crate::value::{Row, Value};

/// Row filter handed to drivers
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Filter {
    #[default]
    None,
    /// Filter-language source (or SQL for SQL drivers)
    Raw(String),
    /// Field equals value, for every pair
    Equality(Row),
}

impl Filter {
    pub fn is_none(&self) -> bool {
        match self {
            Filter::None => true,
            Filter::Raw(source) => source.trim().is_empty(),
            Filter::Equality(conditions) => conditions.is_empty(),
        }
    }

    pub fn equality(field: impl Into<String>, value: impl Into<Value>) -> Filter {
        let mut conditions = Row::new();
        conditions.insert(field.into(), value.into());
        Filter::Equality(conditions)
    }

    /// Add `field = value`; a raw filter cannot absorb an equality
    pub fn merge_equality(self, field: &str, value: Value) -> Result<Filter> {
        match self {
            Filter::None => Ok(Filter::equality(field, value)),
            Filter::Equality(mut conditions) => {
                conditions.insert(field.to_string(), value);
                Ok(Filter::Equality(conditions))
            }
            Filter::Raw(source) if source.trim().is_empty() => Ok(Filter::equality(field, value)),
            Filter::Raw(source) => Err(QuarryError::invalid_input(format!(
                "cannot combine {} = {} with raw filter '{}'",
                field, value, source
            ))),
        }
    }
}

impl From<&str> for Filter {
    fn from(source: &str) -> Self {
        Filter::Raw(source.to_string())
    }
}

impl From<String> for Filter {
    fn from(source: String) -> Self {
        Filter::Raw(source)
    }
}

impl From<Row> for Filter {
    fn from(conditions: Row) -> Self {
        Filter::Equality(conditions)
    }
}

/// Parameters for `find`, calculations and result-set reloads
///
/// ```
/// use quarry_core::QueryParams;
///
/// let params = QueryParams::new()
///     .filter("age > 18")
///     .order("name ASC, age DESC")
///     .limit(10);
/// assert_eq!(params.limit, Some(10));
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryParams {
    /// Projected columns; `None` selects everything
    pub select: Option<Vec<String>>,
    pub filter: Filter,
    /// Join clause text, honored by SQL drivers only
    pub joins: Option<String>,
    /// `col [ASC|DESC], ...`
    pub order: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub group: Option<String>,
    /// Keep the result set live as rows are created and destroyed
    pub synchronize: bool,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn filter(mut self, filter: impl Into<Filter>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Add an equality condition; replaces a raw filter
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let field = field.into();
        let value = value.into();
        self.filter = match self.filter {
            Filter::Equality(mut conditions) => {
                conditions.insert(field, value);
                Filter::Equality(conditions)
            }
            _ => Filter::equality(field, value),
        };
        self
    }

    pub fn joins(mut self, joins: impl Into<String>) -> Self {
        self.joins = Some(joins.into());
        self
    }

    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn synchronize(mut self, synchronize: bool) -> Self {
        self.synchronize = synchronize;
        self
    }
}

impl From<Filter> for QueryParams {
    fn from(filter: Filter) -> Self {
        QueryParams::new().filter(filter)
    }
}

impl From<&str> for QueryParams {
    fn from(source: &str) -> Self {
        QueryParams::new().filter(source)
    }
}

impl From<String> for QueryParams {
    fn from(source: String) -> Self {
        QueryParams::new().filter(source)
    }
}

impl From<Row> for QueryParams {
    fn from(conditions: Row) -> Self {
        QueryParams::new().filter(conditions)
    }
}

/// Aggregate computed over the rows a query matches
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Aggregate {
    Count,
    Sum(String),
    Average(String),
    Min(String),
    Max(String),
}

impl Aggregate {
    pub fn name(&self) -> &'static str {
        match self {
            Aggregate::Count => "count",
            Aggregate::Sum(_) => "sum",
            Aggregate::Average(_) => "average",
            Aggregate::Min(_) => "minimum",
            Aggregate::Max(_) => "maximum",
        }
    }

    pub fn column(&self) -> Option<&str> {
        match self {
            Aggregate::Count => None,
            Aggregate::Sum(c) | Aggregate::Average(c) | Aggregate::Min(c) | Aggregate::Max(c) => {
                Some(c)
            }
        }
    }

    /// SQL select expression, e.g. `SUM(price)`
    pub fn sql_expression(&self) -> String {
        match self {
            Aggregate::Count => "COUNT(*)".to_string(),
            Aggregate::Sum(c) => format!("SUM({})", c),
            Aggregate::Average(c) => format!("AVG({})", c),
            Aggregate::Min(c) => format!("MIN({})", c),
            Aggregate::Max(c) => format!("MAX({})", c),
        }
    }
}

/// What `Model::find` should look up
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Id(Value),
    Ids(Vec<Value>),
    Params(QueryParams),
}

impl From<i64> for Lookup {
    fn from(id: i64) -> Self {
        Lookup::Id(Value::Int(id))
    }
}

impl From<i32> for Lookup {
    fn from(id: i32) -> Self {
        Lookup::Id(Value::from(id))
    }
}

impl From<Value> for Lookup {
    fn from(id: Value) -> Self {
        Lookup::Id(id)
    }
}

/// All-digit strings are ids; anything else is a raw filter
impl From<&str> for Lookup {
    fn from(source: &str) -> Self {
        let trimmed = source.trim();
        if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(id) = trimmed.parse::<i64>() {
                return Lookup::Id(Value::Int(id));
            }
        }
        Lookup::Params(QueryParams::from(source))
    }
}

impl From<String> for Lookup {
    fn from(source: String) -> Self {
        Lookup::from(source.as_str())
    }
}

impl From<Vec<Value>> for Lookup {
    fn from(ids: Vec<Value>) -> Self {
        Lookup::Ids(ids)
    }
}

impl From<Vec<i64>> for Lookup {
    fn from(ids: Vec<i64>) -> Self {
        Lookup::Ids(ids.into_iter().map(Value::Int).collect())
    }
}

impl From<QueryParams> for Lookup {
    fn from(params: QueryParams) -> Self {
        Lookup::Params(params)
    }
}

impl From<Filter> for Lookup {
    fn from(filter: Filter) -> Self {
        Lookup::Params(QueryParams::from(filter))
    }
}

impl From<Row> for Lookup {
    fn from(conditions: Row) -> Self {
        Lookup::Params(QueryParams::from(conditions))
    }
}

/// Result of `Model::find`: one record for an id, a result set otherwise
#[derive(Debug, Clone)]
pub enum Found {
    One(Option<Record>),
    Many(ResultSet),
}

impl Found {
    /// The single record, or the first of a result set
    pub fn one(self) -> Option<Record> {
        match self {
            Found::One(record) => record,
            Found::Many(set) => set.first(),
        }
    }

    pub fn many(self) -> Vec<Record> {
        match self {
            Found::One(record) => record.into_iter().collect(),
            Found::Many(set) => set.records(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;

    #[test]
    fn test_lookup_shapes() {
        assert_eq!(Lookup::from(5), Lookup::Id(Value::Int(5)));
        assert_eq!(Lookup::from("42"), Lookup::Id(Value::Int(42)));
        assert_eq!(
            Lookup::from("age > 3"),
            Lookup::Params(QueryParams::new().filter("age > 3"))
        );
        assert!(matches!(Lookup::from(vec![1, 2]), Lookup::Ids(ids) if ids.len() == 2));
    }

    #[test]
    fn test_merge_equality() {
        let merged = Filter::from(row! { "a" => 1 })
            .merge_equality("b", Value::Int(2))
            .unwrap();
        assert_eq!(merged, Filter::Equality(row! { "a" => 1, "b" => 2 }));
        assert_eq!(
            Filter::None.merge_equality("b", Value::Int(2)).unwrap(),
            Filter::equality("b", 2)
        );
        assert!(Filter::from("x > 1")
            .merge_equality("b", Value::Int(2))
            .is_err());
    }

    #[test]
    fn test_where_eq_accumulates() {
        let params = QueryParams::new().where_eq("a", 1).where_eq("b", "x");
        assert_eq!(params.filter, Filter::Equality(row! { "a" => 1, "b" => "x" }));
    }

    #[test]
    fn test_aggregate_sql() {
        assert_eq!(Aggregate::Count.sql_expression(), "COUNT(*)");
        assert_eq!(Aggregate::Average("price".into()).sql_expression(), "AVG(price)");
        assert_eq!(Aggregate::Max("price".into()).column(), Some("price"));
    }
}
