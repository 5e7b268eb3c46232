use crate::query::{
    ast::common::TableRef,
    builder::copy::CopyBuilder,
    dialect::Dialect,
    renderer::{Render, Renderer},
};

pub mod ast;
pub mod builder;
pub mod dialect;
pub mod macros;
pub mod renderer;

/// Renders the `COPY ... FROM STDIN` statement that opens a binary bulk-load
/// channel for the given columns, in the given order.
pub fn binary_copy_in<I>(dialect: &dyn Dialect, table: TableRef, columns: I) -> String
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let copy = CopyBuilder::new(table).columns(columns).build();

    let mut renderer = Renderer::new(dialect);
    copy.render(&mut renderer);
    renderer.finish()
}
