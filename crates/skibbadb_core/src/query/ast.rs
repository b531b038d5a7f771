//! The query AST: a fluent builder over tagged variants.
//! Construction is purely mechanical — all of the interesting behavior lives
//! in the compiler.

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Cmp {
    pub fn sql_op(self) -> &'static str {
        match self {
            Cmp::Eq => "=",
            Cmp::Neq => "!=",
            Cmp::Gt => ">",
            Cmp::Gte => ">=",
            Cmp::Lt => "<",
            Cmp::Lte => "<=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Cmp(Cmp),
    Between,
    In,
    Nin,
    Like,
    ILike,
    StartsWith,
    EndsWith,
    Contains,
    Exists,
    NotExists,
    ArrayContains,
    ArrayNotContains,
    ArrayLength(Cmp),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    None,
    Single(Value),
    Pair(Value, Value),
    List(Vec<Value>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: Op,
    pub value: FilterValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub kind: GroupKind,
    pub items: Vec<Node>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubqueryKind {
    Exists,
    NotExists,
    In,
    NotIn,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subquery {
    pub kind: SubqueryKind,
    /// Required for `In`/`NotIn`; unused for `Exists`/`NotExists`.
    pub field: Option<String>,
    pub query: Box<QueryBuilder>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Filter(Filter),
    Group(Group),
    Subquery(Subquery),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub table: String,
    pub left_field: String,
    pub op: Cmp,
    pub right_field: String,
    pub kind: JoinKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Aggregate {
    Count {
        field: Option<String>,
        alias: String,
        distinct: bool,
    },
    Sum {
        field: String,
        alias: String,
    },
    Avg {
        field: String,
        alias: String,
    },
    Min {
        field: String,
        alias: String,
    },
    Max {
        field: String,
        alias: String,
    },
}

/// The fluent query builder. All mutators consume and return `Self`; clone it
/// before branching if you need to keep the original (I6: clone produces an
/// identical compiled result).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryBuilder {
    pub table: String,
    pub nodes: Vec<Node>,
    pub joins: Vec<Join>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub group_by: Vec<String>,
    pub having: Vec<Node>,
    pub select: Option<Vec<String>>,
    pub distinct: bool,
    pub aggregates: Vec<Aggregate>,
}

impl QueryBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    fn push(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn filter(self, field: impl Into<String>, op: Op, value: FilterValue) -> Self {
        self.push(Node::Filter(Filter {
            field: field.into(),
            op,
            value,
        }))
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, Op::Cmp(Cmp::Eq), FilterValue::Single(value.into()))
    }

    pub fn neq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, Op::Cmp(Cmp::Neq), FilterValue::Single(value.into()))
    }

    pub fn gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, Op::Cmp(Cmp::Gt), FilterValue::Single(value.into()))
    }

    pub fn gte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, Op::Cmp(Cmp::Gte), FilterValue::Single(value.into()))
    }

    pub fn lt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, Op::Cmp(Cmp::Lt), FilterValue::Single(value.into()))
    }

    pub fn lte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, Op::Cmp(Cmp::Lte), FilterValue::Single(value.into()))
    }

    pub fn between(self, field: impl Into<String>, lo: impl Into<Value>, hi: impl Into<Value>) -> Self {
        self.filter(field, Op::Between, FilterValue::Pair(lo.into(), hi.into()))
    }

    pub fn in_(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.filter(field, Op::In, FilterValue::List(values))
    }

    pub fn nin(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.filter(field, Op::Nin, FilterValue::List(values))
    }

    pub fn like(self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.filter(field, Op::Like, FilterValue::Single(Value::Text(pattern.into())))
    }

    pub fn ilike(self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.filter(field, Op::ILike, FilterValue::Single(Value::Text(pattern.into())))
    }

    pub fn starts_with(self, field: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.filter(field, Op::StartsWith, FilterValue::Single(Value::Text(prefix.into())))
    }

    pub fn ends_with(self, field: impl Into<String>, suffix: impl Into<String>) -> Self {
        self.filter(field, Op::EndsWith, FilterValue::Single(Value::Text(suffix.into())))
    }

    pub fn contains(self, field: impl Into<String>, needle: impl Into<String>) -> Self {
        self.filter(field, Op::Contains, FilterValue::Single(Value::Text(needle.into())))
    }

    pub fn exists(self, field: impl Into<String>) -> Self {
        self.filter(field, Op::Exists, FilterValue::None)
    }

    pub fn not_exists(self, field: impl Into<String>) -> Self {
        self.filter(field, Op::NotExists, FilterValue::None)
    }

    pub fn array_contains(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, Op::ArrayContains, FilterValue::Single(value.into()))
    }

    pub fn array_not_contains(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, Op::ArrayNotContains, FilterValue::Single(value.into()))
    }

    pub fn array_length(self, field: impl Into<String>, cmp: Cmp, value: impl Into<Value>) -> Self {
        self.filter(field, Op::ArrayLength(cmp), FilterValue::Single(value.into()))
    }

    fn collapse(nodes: Vec<Node>) -> Option<Node> {
        match nodes.len() {
            0 => None,
            1 => nodes.into_iter().next(),
            _ => Some(Node::Group(Group {
                kind: GroupKind::And,
                items: nodes,
            })),
        }
    }

    /// `where(a).eq(x).or(b => b.where(a).eq(y))`: replaces the filters built
    /// so far with a single OR-group combining them with the closure's
    /// filters, applied over a fresh builder on the same table.
    pub fn or(mut self, build: impl FnOnce(QueryBuilder) -> QueryBuilder) -> Self {
        let left_nodes = std::mem::take(&mut self.nodes);
        let left = Self::collapse(left_nodes);

        let sub = build(QueryBuilder::new(self.table.clone()));
        let right = Self::collapse(sub.nodes);

        let items: Vec<Node> = [left, right].into_iter().flatten().collect();
        if !items.is_empty() {
            self.nodes.push(Node::Group(Group {
                kind: GroupKind::Or,
                items,
            }));
        }
        self
    }

    pub fn and_group(mut self, build: impl FnOnce(QueryBuilder) -> QueryBuilder) -> Self {
        let sub = build(QueryBuilder::new(self.table.clone()));
        if let Some(node) = Self::collapse(sub.nodes) {
            self.nodes.push(Node::Group(Group {
                kind: GroupKind::And,
                items: vec![node],
            }));
        }
        self
    }

    pub fn join(mut self, table: impl Into<String>, left_field: impl Into<String>, op: Cmp, right_field: impl Into<String>) -> Self {
        self.joins.push(Join {
            table: table.into(),
            left_field: left_field.into(),
            op,
            right_field: right_field.into(),
            kind: JoinKind::Inner,
        });
        self
    }

    pub fn left_join(mut self, table: impl Into<String>, left_field: impl Into<String>, op: Cmp, right_field: impl Into<String>) -> Self {
        self.joins.push(Join {
            table: table.into(),
            left_field: left_field.into(),
            op,
            right_field: right_field.into(),
            kind: JoinKind::Left,
        });
        self
    }

    pub fn exists_subquery(mut self, table: impl Into<String>, build: impl FnOnce(QueryBuilder) -> QueryBuilder) -> Self {
        let query = Box::new(build(QueryBuilder::new(table)));
        self.nodes.push(Node::Subquery(Subquery {
            kind: SubqueryKind::Exists,
            field: None,
            query,
        }));
        self
    }

    pub fn not_exists_subquery(mut self, table: impl Into<String>, build: impl FnOnce(QueryBuilder) -> QueryBuilder) -> Self {
        let query = Box::new(build(QueryBuilder::new(table)));
        self.nodes.push(Node::Subquery(Subquery {
            kind: SubqueryKind::NotExists,
            field: None,
            query,
        }));
        self
    }

    pub fn in_subquery(mut self, field: impl Into<String>, table: impl Into<String>, build: impl FnOnce(QueryBuilder) -> QueryBuilder) -> Self {
        let query = Box::new(build(QueryBuilder::new(table)));
        self.nodes.push(Node::Subquery(Subquery {
            kind: SubqueryKind::In,
            field: Some(field.into()),
            query,
        }));
        self
    }

    pub fn not_in_subquery(mut self, field: impl Into<String>, table: impl Into<String>, build: impl FnOnce(QueryBuilder) -> QueryBuilder) -> Self {
        let query = Box::new(build(QueryBuilder::new(table)));
        self.nodes.push(Node::Subquery(Subquery {
            kind: SubqueryKind::NotIn,
            field: Some(field.into()),
            query,
        }));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by.push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    /// Replaces the whole ordering list with a single key.
    pub fn order_by_only(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = vec![OrderBy {
            field: field.into(),
            direction,
        }];
        self
    }

    pub fn order_by_multiple(mut self, keys: Vec<OrderBy>) -> Self {
        self.order_by = keys;
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit.max(0));
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset.max(0));
        self
    }

    /// `page(n, s)` requires `n >= 1, s >= 1`; computes `limit=s,
    /// offset=(n-1)*s`.
    pub fn page(mut self, n: i64, s: i64) -> Self {
        assert!(n >= 1 && s >= 1, "page requires n >= 1 and s >= 1");
        self.limit = Some(s);
        self.offset = Some((n - 1) * s);
        self
    }

    pub fn select(mut self, fields: Vec<String>) -> Self {
        self.select = Some(fields);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn group_by(mut self, fields: Vec<String>) -> Self {
        self.group_by = fields;
        self
    }

    pub fn having(mut self, field: impl Into<String>, op: Op, value: FilterValue) -> Self {
        self.having.push(Node::Filter(Filter {
            field: field.into(),
            op,
            value,
        }));
        self
    }

    pub fn count(mut self, field: Option<String>, alias: impl Into<String>, distinct: bool) -> Self {
        self.aggregates.push(Aggregate::Count {
            field,
            alias: alias.into(),
            distinct,
        });
        self
    }

    pub fn sum(mut self, field: impl Into<String>, alias: impl Into<String>) -> Self {
        self.aggregates.push(Aggregate::Sum {
            field: field.into(),
            alias: alias.into(),
        });
        self
    }

    pub fn avg(mut self, field: impl Into<String>, alias: impl Into<String>) -> Self {
        self.aggregates.push(Aggregate::Avg {
            field: field.into(),
            alias: alias.into(),
        });
        self
    }

    pub fn min(mut self, field: impl Into<String>, alias: impl Into<String>) -> Self {
        self.aggregates.push(Aggregate::Min {
            field: field.into(),
            alias: alias.into(),
        });
        self
    }

    pub fn max(mut self, field: impl Into<String>, alias: impl Into<String>) -> Self {
        self.aggregates.push(Aggregate::Max {
            field: field.into(),
            alias: alias.into(),
        });
        self
    }

    pub fn has_filters(&self) -> bool {
        !self.nodes.is_empty()
    }

    pub fn has_ordering(&self) -> bool {
        !self.order_by.is_empty()
    }

    pub fn has_pagination(&self) -> bool {
        self.limit.is_some() || self.offset.is_some()
    }

    pub fn filter_count(&self) -> usize {
        self.nodes.iter().map(count_node).sum()
    }

    pub fn reset(&mut self) {
        *self = QueryBuilder::new(std::mem::take(&mut self.table));
    }

    pub fn clear_filters(&mut self) {
        self.nodes.clear();
    }

    pub fn clear_order(&mut self) {
        self.order_by.clear();
    }
}

fn count_node(node: &Node) -> usize {
    match node {
        Node::Filter(_) | Node::Subquery(_) => 1,
        Node::Group(group) => group.items.iter().map(count_node).sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn or_combines_prior_and_new_filters_into_a_group() {
        let qb = QueryBuilder::new("employees")
            .eq("department", "Engineering")
            .or(|b| b.eq("department", "Marketing"));

        assert_eq!(qb.nodes.len(), 1);
        match &qb.nodes[0] {
            Node::Group(group) => {
                assert_eq!(group.kind, GroupKind::Or);
                assert_eq!(group.items.len(), 2);
            }
            _ => panic!("expected an OR group"),
        }
    }

    #[test]
    fn page_computes_limit_and_offset() {
        let qb = QueryBuilder::new("t").page(3, 10);
        assert_eq!(qb.limit, Some(10));
        assert_eq!(qb.offset, Some(20));
    }

    #[test]
    fn clone_produces_an_identical_builder() {
        let qb = QueryBuilder::new("t").eq("a", 1).order_by("a", Direction::Asc);
        let cloned = qb.clone();
        assert_eq!(qb, cloned);
    }

    #[test]
    fn filter_count_recurses_into_groups() {
        let qb = QueryBuilder::new("t")
            .eq("a", 1)
            .or(|b| b.eq("b", 2).eq("c", 3));
        assert_eq!(qb.filter_count(), 3);
    }
}
