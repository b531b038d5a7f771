//! Translates a [`QueryBuilder`] AST into parameterized SQL for the SQLite
//! dialect.

use super::ast::{
    Aggregate, Cmp, Direction, Filter, FilterValue, Group, GroupKind, Join, JoinKind, Node, Op,
    QueryBuilder, Subquery, SubqueryKind,
};
use crate::registry::Registry;
use crate::schema::CollectionDescriptor;
use crate::sql_dialect::SqlDialect;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

pub struct Compiler<'a> {
    dialect: &'a dyn SqlDialect,
    descriptor: &'a CollectionDescriptor,
    registry: Option<&'a Registry>,
}

impl<'a> Compiler<'a> {
    pub fn new(dialect: &'a dyn SqlDialect, descriptor: &'a CollectionDescriptor) -> Self {
        Self {
            dialect,
            descriptor,
            registry: None,
        }
    }

    /// Registry used to resolve constrained columns on joined tables. Without
    /// it, fields on a joined table always resolve to `json_extract`.
    pub fn with_registry(mut self, registry: &'a Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn compile(&self, qb: &QueryBuilder) -> CompiledQuery {
        let mut params = Vec::new();
        let known_tables = self.known_tables(qb);

        let select_clause = self.compile_select(qb, &known_tables);
        let mut sql = format!("SELECT {} FROM {}", select_clause, self.quote_table(&qb.table));

        for join in &qb.joins {
            sql.push_str(&self.compile_join(join, &known_tables));
        }

        if !qb.nodes.is_empty() {
            let (where_sql, where_params) = self.compile_node_list(&qb.nodes, GroupKind::And, &known_tables);
            params.extend(where_params);
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }

        if !qb.group_by.is_empty() {
            let cols: Vec<String> = qb
                .group_by
                .iter()
                .map(|f| self.resolve_field(&qb.table, f, &known_tables))
                .collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&cols.join(", "));
        }

        if !qb.having.is_empty() {
            let (having_sql, having_params) = self.compile_node_list(&qb.having, GroupKind::And, &known_tables);
            params.extend(having_params);
            sql.push_str(" HAVING ");
            sql.push_str(&having_sql);
        }

        if !qb.order_by.is_empty() {
            let order: Vec<String> = qb
                .order_by
                .iter()
                .map(|o| {
                    let dir = match o.direction {
                        Direction::Asc => "ASC",
                        Direction::Desc => "DESC",
                    };
                    format!("{} {}", self.resolve_field(&qb.table, &o.field, &known_tables), dir)
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }

        if let Some(limit) = qb.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = qb.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        CompiledQuery { sql, params }
    }

    /// Rewrites the SELECT list to `COUNT(*)` (or `COUNT(DISTINCT col)`),
    /// discarding ordering/pagination the way `Collection::count` does.
    pub fn compile_count(&self, qb: &QueryBuilder, distinct_field: Option<&str>) -> CompiledQuery {
        let known_tables = self.known_tables(qb);
        let mut params = Vec::new();
        let count_expr = match distinct_field {
            Some(field) => format!("COUNT(DISTINCT {})", self.resolve_field(&qb.table, field, &known_tables)),
            None => "COUNT(*)".to_string(),
        };
        let mut sql = format!("SELECT {} FROM {}", count_expr, self.quote_table(&qb.table));
        for join in &qb.joins {
            sql.push_str(&self.compile_join(join, &known_tables));
        }
        if !qb.nodes.is_empty() {
            let (where_sql, where_params) = self.compile_node_list(&qb.nodes, GroupKind::And, &known_tables);
            params.extend(where_params);
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }
        CompiledQuery { sql, params }
    }

    fn known_tables(&self, qb: &QueryBuilder) -> Vec<String> {
        let mut tables = vec![qb.table.clone()];
        tables.extend(qb.joins.iter().map(|j| j.table.clone()));
        tables
    }

    fn quote_table(&self, table: &str) -> String {
        self.dialect.quote_identifier(table)
    }

    fn compile_select(&self, qb: &QueryBuilder, known_tables: &[String]) -> String {
        if !qb.aggregates.is_empty() {
            let parts: Vec<String> = qb
                .aggregates
                .iter()
                .map(|agg| self.compile_aggregate(agg, &qb.table, known_tables))
                .collect();
            return parts.join(", ");
        }

        let distinct = if qb.distinct { "DISTINCT " } else { "" };

        if let Some(fields) = &qb.select {
            let parts: Vec<String> = fields
                .iter()
                .map(|f| {
                    format!(
                        "{} AS {}",
                        self.resolve_field(&qb.table, f, known_tables),
                        self.dialect.quote_identifier(f)
                    )
                })
                .collect();
            return format!("{}{}", distinct, parts.join(", "));
        }

        format!("{}{}.*", distinct, self.quote_table(&qb.table))
    }

    fn compile_aggregate(&self, agg: &Aggregate, table: &str, known_tables: &[String]) -> String {
        match agg {
            Aggregate::Count {
                field,
                alias,
                distinct,
            } => {
                let inner = match field {
                    Some(f) if *distinct => format!("DISTINCT {}", self.resolve_field(table, f, known_tables)),
                    Some(f) => self.resolve_field(table, f, known_tables),
                    None => "*".to_string(),
                };
                format!("COUNT({}) AS {}", inner, self.dialect.quote_identifier(alias))
            }
            Aggregate::Sum { field, alias } => format!(
                "SUM({}) AS {}",
                self.resolve_field(table, field, known_tables),
                self.dialect.quote_identifier(alias)
            ),
            Aggregate::Avg { field, alias } => format!(
                "AVG({}) AS {}",
                self.resolve_field(table, field, known_tables),
                self.dialect.quote_identifier(alias)
            ),
            Aggregate::Min { field, alias } => format!(
                "MIN({}) AS {}",
                self.resolve_field(table, field, known_tables),
                self.dialect.quote_identifier(alias)
            ),
            Aggregate::Max { field, alias } => format!(
                "MAX({}) AS {}",
                self.resolve_field(table, field, known_tables),
                self.dialect.quote_identifier(alias)
            ),
        }
    }

    fn compile_join(&self, join: &Join, known_tables: &[String]) -> String {
        let kind = match join.kind {
            JoinKind::Inner => "JOIN",
            JoinKind::Left => "LEFT JOIN",
        };
        format!(
            " {} {} ON {} {} {}",
            kind,
            self.quote_table(&join.table),
            self.resolve_field(&join.table, &join.left_field, known_tables),
            join.op.sql_op(),
            self.resolve_field(&join.table, &join.right_field, known_tables),
        )
    }

    fn compile_node_list(&self, nodes: &[Node], joiner: GroupKind, known_tables: &[String]) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let sep = match joiner {
            GroupKind::And => " AND ",
            GroupKind::Or => " OR ",
        };
        let parts: Vec<String> = nodes
            .iter()
            .map(|node| {
                let (sql, node_params) = self.compile_node(node, known_tables);
                params.extend(node_params);
                sql
            })
            .collect();
        (parts.join(sep), params)
    }

    fn compile_node(&self, node: &Node, known_tables: &[String]) -> (String, Vec<Value>) {
        match node {
            Node::Filter(filter) => self.compile_filter(filter, known_tables),
            Node::Group(group) => self.compile_group(group, known_tables),
            Node::Subquery(subquery) => self.compile_subquery(subquery, known_tables),
        }
    }

    fn compile_group(&self, group: &Group, known_tables: &[String]) -> (String, Vec<Value>) {
        let (inner, params) = self.compile_node_list(&group.items, group.kind, known_tables);
        (format!("({})", inner), params)
    }

    fn compile_subquery(&self, subquery: &Subquery, known_tables: &[String]) -> (String, Vec<Value>) {
        let child_descriptor = self
            .registry
            .and_then(|r| r.get(&subquery.query.table));
        let child_compiler = match &child_descriptor {
            Some(descriptor) => Compiler::new(self.dialect, descriptor),
            None => Compiler::new(self.dialect, self.descriptor),
        };
        let compiled = child_compiler.compile(&subquery.query);

        match subquery.kind {
            SubqueryKind::Exists => (format!("EXISTS ({})", compiled.sql), compiled.params),
            SubqueryKind::NotExists => (format!("NOT EXISTS ({})", compiled.sql), compiled.params),
            SubqueryKind::In | SubqueryKind::NotIn => {
                let field = subquery
                    .field
                    .as_deref()
                    .expect("in/notIn subquery requires a field");
                let expr = self.resolve_field(&subquery.query.table, field, known_tables);
                let keyword = if subquery.kind == SubqueryKind::In { "IN" } else { "NOT IN" };
                (format!("{} {} ({})", expr, keyword, compiled.sql), compiled.params)
            }
        }
    }

    fn compile_filter(&self, filter: &Filter, known_tables: &[String]) -> (String, Vec<Value>) {
        let expr = self.resolve_field_for_current(&filter.field, known_tables);

        match (&filter.op, &filter.value) {
            (Op::Cmp(cmp), FilterValue::Single(value)) => {
                (format!("{} {} ?", expr, cmp.sql_op()), vec![value.clone()])
            }
            (Op::Between, FilterValue::Pair(lo, hi)) => (
                format!("{} BETWEEN ? AND ?", expr),
                vec![lo.clone(), hi.clone()],
            ),
            (Op::In, FilterValue::List(values)) => {
                if values.is_empty() {
                    ("FALSE".to_string(), vec![])
                } else {
                    let placeholders = vec!["?"; values.len()].join(", ");
                    (format!("{} IN ({})", expr, placeholders), values.clone())
                }
            }
            (Op::Nin, FilterValue::List(values)) => {
                if values.is_empty() {
                    ("TRUE".to_string(), vec![])
                } else {
                    let placeholders = vec!["?"; values.len()].join(", ");
                    (format!("{} NOT IN ({})", expr, placeholders), values.clone())
                }
            }
            (Op::Like, FilterValue::Single(value)) => (format!("{} LIKE ?", expr), vec![value.clone()]),
            (Op::ILike, FilterValue::Single(value)) => {
                (format!("{} LIKE ? COLLATE NOCASE", expr), vec![value.clone()])
            }
            (Op::StartsWith, FilterValue::Single(Value::Text(text))) => (
                format!("{} LIKE ? ESCAPE '\\'", expr),
                vec![Value::Text(format!("{}%", escape_like(text)))],
            ),
            (Op::EndsWith, FilterValue::Single(Value::Text(text))) => (
                format!("{} LIKE ? ESCAPE '\\'", expr),
                vec![Value::Text(format!("%{}", escape_like(text)))],
            ),
            (Op::Contains, FilterValue::Single(Value::Text(text))) => (
                format!("{} LIKE ? ESCAPE '\\'", expr),
                vec![Value::Text(format!("%{}%", escape_like(text)))],
            ),
            (Op::Exists, FilterValue::None) => (format!("{} IS NOT NULL", expr), vec![]),
            (Op::NotExists, FilterValue::None) => (format!("{} IS NULL", expr), vec![]),
            (Op::ArrayContains, FilterValue::Single(value)) => (
                format!("EXISTS (SELECT 1 FROM json_each({}) WHERE value = ?)", expr),
                vec![value.clone()],
            ),
            (Op::ArrayNotContains, FilterValue::Single(value)) => (
                format!("NOT EXISTS (SELECT 1 FROM json_each({}) WHERE value = ?)", expr),
                vec![value.clone()],
            ),
            (Op::ArrayLength(cmp), FilterValue::Single(value)) => (
                format!("json_array_length({}) {} ?", expr, cmp.sql_op()),
                vec![value.clone()],
            ),
            _ => panic!("filter operator/value mismatch for field '{}'", filter.field),
        }
    }

    /// Resolve a field reference on the main query's FROM table, splitting a
    /// `t.f` qualifier only when `t` names the main table or a joined one.
    fn resolve_field_for_current(&self, path: &str, known_tables: &[String]) -> String {
        self.resolve_field(&self.descriptor.name, path, known_tables)
    }

    fn resolve_field(&self, default_table: &str, path: &str, known_tables: &[String]) -> String {
        let (table, rest) = split_qualifier(path, known_tables, default_table);
        if table == self.descriptor.name {
            if rest == self.descriptor.primary_key_field {
                return format!("{}._id", self.dialect.quote_identifier(&table));
            }
            if let Some(field) = self.descriptor.find_field(rest) {
                return format!(
                    "{}.{}",
                    self.dialect.quote_identifier(&table),
                    self.dialect.quote_identifier(&field.column_name())
                );
            }
        } else if let Some(registry) = self.registry {
            if let Some(descriptor) = registry.get(&table) {
                if rest == descriptor.primary_key_field {
                    return format!("{}._id", self.dialect.quote_identifier(&table));
                }
                if let Some(field) = descriptor.find_field(rest) {
                    return format!(
                        "{}.{}",
                        self.dialect.quote_identifier(&table),
                        self.dialect.quote_identifier(&field.column_name())
                    );
                }
            }
        }

        format!(
            "json_extract({}.doc, '$.{}')",
            self.dialect.quote_identifier(&table),
            rest
        )
    }
}

fn split_qualifier<'a>(path: &'a str, known_tables: &[String], default_table: &str) -> (String, &'a str) {
    if let Some((first, rest)) = path.split_once('.') {
        if known_tables.iter().any(|t| t == first) {
            return (first.to_string(), rest);
        }
    }
    (default_table.to_string(), path)
}

fn escape_like(value: &str) -> String {
    value.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}
