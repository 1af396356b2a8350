use super::{Connection, Context, Error, SqlDialect};
use crate::ast::Expression;

/// PostgreSQL-flavored renderer. Everything is shared with the [SqlDialect]
///  defaults except boolean literals, which PostgreSQL writes as `'t'` and
///  `'f'`.
pub struct Pgsql<C> {
    pub connection: C,
}

impl<C: Connection> Pgsql<C> {
    pub fn new(connection: C) -> Self {
        Self { connection }
    }
}

impl<C: Connection> SqlDialect for Pgsql<C> {
    fn connection(&self) -> &dyn Connection {
        &self.connection
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value { "'t'" } else { "'f'" }
    }
}

/// Renders [expr] as a PostgreSQL fragment using [connection]'s escape
///  primitive.
pub fn to_source(
    expr: &Expression,
    cx: &Context,
    connection: &dyn Connection,
) -> Result<String, Error> {
    super::to_source(expr, cx, &Pgsql { connection })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Combine, CombineOp, Compare, CompareOp, Direction, Sort};
    use crate::translate::Types;
    use crate::value::ParamType;
    use std::collections::HashMap;

    /// PostgreSQL drivers escape quotes by doubling them.
    struct Conn;
    impl Connection for Conn {
        fn escape(&self, raw: &str) -> String {
            raw.replace('\'', "''")
        }
    }

    fn types() -> Types {
        HashMap::from([
            ("product.status".to_string(), ParamType::Bool),
            ("product.label".to_string(), ParamType::Str),
            ("x".to_string(), ParamType::Int),
        ])
    }

    fn render(expr: &Expression) -> Result<String, Error> {
        let types = types();
        let cx = Context::new(&types);
        to_source(expr, &cx, &Conn)
    }

    #[test]
    fn booleans_are_quoted_letters() {
        let expr = Compare::new(CompareOp::Eq, "product.status", true).into();
        assert_eq!(Ok("product.status = 't'".to_string()), render(&expr));

        let expr = Compare::new(CompareOp::Ne, "product.status", false).into();
        assert_eq!(Ok("product.status <> 'f'".to_string()), render(&expr));
    }

    #[test]
    fn shared_behavior_is_unchanged() {
        let expr = Compare::new(CompareOp::Contains, "product.label", "it's 50%").into();
        assert_eq!(
            Ok("product.label LIKE '%it''s 50#%%'".to_string()),
            render(&expr)
        );

        let expr = Combine::new(
            CombineOp::Not,
            vec![Compare::new(CompareOp::Eq, "x", 1).into()],
        )
        .unwrap()
        .into();
        assert_eq!(Ok(" NOT ( x = 1 )".to_string()), render(&expr));

        let sort = Sort::new(Direction::Desc, "product.label").into();
        assert_eq!(Ok("product.label DESC".to_string()), render(&sort));
    }
}
