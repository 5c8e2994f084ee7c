use std::fmt::Write;

use crate::query::{ChildQuery, TableQuery};

/// Indenting text writer for rendering query trees.
pub struct ExplainBuilder {
    indent: u16,
    buf: String,
}

impl ExplainBuilder {
    pub fn new() -> Self {
        Self {
            indent: 0,
            buf: String::new(),
        }
    }

    pub fn build(self) -> String {
        self.buf
    }

    pub fn buf_mut(&mut self) -> &mut String {
        &mut self.buf
    }

    pub fn indent(&mut self) {
        self.indent += 1;
    }

    pub fn outdent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    pub fn newline(&mut self) {
        self.push("\n");
        self.buf.extend((0..self.indent * 2).map(|_| ' '));
    }

    pub fn push(&mut self, str: &str) {
        self.buf.push_str(str);
    }
}

pub fn explain(tree: &TableQuery) -> String {
    let mut builder = ExplainBuilder::new();

    builder.push("ROOT");
    if let Some(query) = tree.query() {
        write!(builder.buf_mut(), " {}", query).ok();
    }

    builder.indent();
    for child in tree.child_queries() {
        explain_child(&mut builder, child);
    }
    builder.outdent();

    builder.build()
}

fn explain_child(builder: &mut ExplainBuilder, child: &ChildQuery) {
    builder.newline();
    write!(
        builder.buf_mut(),
        "{} ({}: {} = parent.{}) {}",
        child.property_name(),
        child.cardinality(),
        child.foreign_key_column_name(),
        child.primary_key_column_name(),
        child.query(),
    )
    .ok();

    builder.indent();
    for grandchild in child.child_queries() {
        explain_child(builder, grandchild);
    }
    builder.outdent();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explain_nested_tree() {
        let tree = TableQuery::with_query("select * from orders").with_child(
            ChildQuery::one_to_many("select * from line_items", "id", "order_id", "items")
                .with_child(ChildQuery::one_to_one("select * from skus", "sku", "sku", "product")),
        );

        assert_eq!(
            tree.explain(),
            "ROOT select * from orders\n  \
             items (one-to-many: order_id = parent.id) select * from line_items\n    \
             product (one-to-one: sku = parent.sku) select * from skus"
        );
    }
}
