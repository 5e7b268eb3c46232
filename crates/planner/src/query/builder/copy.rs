use crate::query::ast::{common::TableRef, copy::Copy};

#[derive(Debug, Clone)]
pub struct CopyBuilder {
    ast: Copy,
}

impl CopyBuilder {
    pub fn new(table: TableRef) -> Self {
        Self {
            ast: Copy {
                table,
                columns: Vec::new(),
            },
        }
    }

    pub fn columns<I>(mut self, columns: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.ast.columns = columns.into_iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    pub fn build(self) -> Copy {
        self.ast
    }
}

#[cfg(test)]
mod tests {
    use crate::{query::builder::copy::CopyBuilder, table_ref};

    #[test]
    fn test_copy_builder_keeps_columns() {
        let copy = CopyBuilder::new(table_ref!("public", "users"))
            .columns(["id", "name"])
            .build();

        assert_eq!(copy.table.schema.as_deref(), Some("public"));
        assert_eq!(copy.columns, vec!["id", "name"]);
    }

    #[test]
    fn test_copy_builder_accepts_owned_names() {
        let names = vec!["b".to_string(), "a".to_string()];
        let copy = CopyBuilder::new(table_ref!("t")).columns(&names).build();
        assert_eq!(copy.columns, vec!["b", "a"]);
    }
}
