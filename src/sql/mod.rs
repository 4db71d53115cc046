//! SELECT compiler and executor
//!
//! Architecture:
//! - Lexer: tokenizes query text, tokens carry byte spans
//! - Parser: clause-extraction passes producing a `QueryDescriptor`
//! - Executor: join → filter → aggregate/group → order → distinct → limit

pub mod token;
pub mod lexer;
pub mod ast;
pub mod parser;
pub mod evaluator;
pub mod join;
pub mod aggregate;
pub mod sort;
pub mod executor;

pub use token::{Token, TokenType};
pub use lexer::Lexer;
pub use ast::{
    AggregateExpr, AggregateFunc, CompareOp, Condition, Connective, JoinSpec, JoinType,
    OrderByField, QueryDescriptor, SortOrder,
};
pub use parser::{parse_select_query, Parser};
pub use executor::{QueryExecutor, APPROXIMATE_COUNT_KEY};

use crate::error::{QueryError, Result};
use crate::storage::Storage;
use crate::types::Row;

/// Compile and run one SELECT. Every failure, including parse errors,
/// comes back as `QueryError::Execution`.
pub async fn execute_select_query<S: Storage + ?Sized>(storage: &S, sql: &str) -> Result<Vec<Row>> {
    let query = parse_select_query(sql).map_err(QueryError::execution)?;
    QueryExecutor::new(storage).run(&query).await
}
