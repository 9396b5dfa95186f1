//! Query descriptors.
//!
//! A [`QueryDescriptor`] describes a read against one collection. Its normalized
//! serialization, the [`QueryKey`], is the identity used by the result cache: two
//! descriptors built with the same filters in a different order share a key.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Comparison operator of a single filter clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    ArrayContains,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "==",
            FilterOp::Ne => "!=",
            FilterOp::Lt => "<",
            FilterOp::Le => "<=",
            FilterOp::Gt => ">",
            FilterOp::Ge => ">=",
            FilterOp::In => "in",
            FilterOp::ArrayContains => "array-contains",
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `(field, op, value)` clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    fn normalized(&self) -> String {
        // serde_json maps are ordered by key, so object values serialize canonically
        format!("{}{}{}", self.field, self.op, self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

/// Normalized identity of a query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(String);

impl QueryKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable description of what to fetch.
///
/// Built with consuming builder methods; every builder call recomputes the key, so a
/// descriptor can never be observed with a key that does not match its clauses.
#[derive(Debug, Clone)]
pub struct QueryDescriptor {
    source: String,
    filters: Vec<Filter>,
    order_by: Option<OrderBy>,
    limit: Option<usize>,
    key: QueryKey,
}

impl QueryDescriptor {
    /// Start a descriptor that reads every record of `source`.
    pub fn collection(source: impl Into<String>) -> Self {
        let mut query = Self {
            source: source.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
            key: QueryKey(String::new()),
        };
        query.key = query.compute_key();
        query
    }

    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value: value.into(),
        });
        self.key = self.compute_key();
        self
    }

    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Eq, value)
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self.key = self.compute_key();
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self.key = self.compute_key();
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn order(&self) -> Option<&OrderBy> {
        self.order_by.as_ref()
    }

    pub fn max_results(&self) -> Option<usize> {
        self.limit
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    fn compute_key(&self) -> QueryKey {
        let mut clauses: Vec<String> = self.filters.iter().map(Filter::normalized).collect();
        clauses.sort();
        clauses.dedup();

        let mut key = format!("{}?{}", self.source, clauses.join("&"));
        if let Some(order) = &self.order_by {
            let direction = match order.direction {
                SortDirection::Asc => "asc",
                SortDirection::Desc => "desc",
            };
            key.push_str(&format!("#order={}:{}", order.field, direction));
        }
        if let Some(limit) = self.limit {
            key.push_str(&format!("#limit={}", limit));
        }
        QueryKey(key)
    }
}

impl PartialEq for QueryDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for QueryDescriptor {}

impl Hash for QueryDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for QueryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key.as_str())
    }
}
