//! AST for the binary `COPY ... FROM STDIN` statement.

use crate::query::ast::common::TableRef;

#[derive(Debug, Clone)]
pub struct Copy {
    pub table: TableRef,
    /// Target columns. Their order is the field order of every data row.
    pub columns: Vec<String>,
}
