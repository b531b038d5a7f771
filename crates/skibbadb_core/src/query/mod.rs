pub mod ast;
pub mod compiler;

pub use ast::{
    Aggregate, Cmp, Direction, Filter, FilterValue, Group, GroupKind, Join, JoinKind, Node, Op,
    OrderBy, QueryBuilder, Subquery, SubqueryKind,
};
pub use compiler::{Compiler, CompiledQuery};
