use crate::query::ast::copy::Copy;
use crate::query::renderer::{Render, Renderer};

impl Render for Copy {
    fn render(&self, r: &mut Renderer) {
        r.sql.push_str("COPY ");
        r.render_table_ref(&self.table);

        if !self.columns.is_empty() {
            r.sql.push_str(" (");
            let cols: Vec<String> = self
                .columns
                .iter()
                .map(|col| r.dialect.quote_identifier(col))
                .collect();
            r.sql.push_str(&cols.join(", "));
            r.sql.push(')');
        }

        r.sql.push_str(" FROM STDIN WITH (FORMAT BINARY)");
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        query::{
            builder::copy::CopyBuilder,
            dialect::Postgres,
            renderer::{Render, Renderer},
        },
        table_ref,
    };

    #[test]
    fn test_render_copy_from_stdin() {
        let copy = CopyBuilder::new(table_ref!("public", "users"))
            .columns(["id", "name"])
            .build();

        let mut renderer = Renderer::new(&Postgres);
        copy.render(&mut renderer);

        assert_eq!(
            renderer.finish(),
            r#"COPY "public"."users" ("id", "name") FROM STDIN WITH (FORMAT BINARY)"#
        );
    }

    #[test]
    fn test_render_copy_quotes_odd_names() {
        let copy = CopyBuilder::new(table_ref!("users"))
            .columns([r#"my "col""#])
            .build();

        let mut renderer = Renderer::new(&Postgres);
        copy.render(&mut renderer);

        assert_eq!(
            renderer.finish(),
            r#"COPY "users" ("my ""col""") FROM STDIN WITH (FORMAT BINARY)"#
        );
    }
}
