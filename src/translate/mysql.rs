use super::{Connection, Context, Error, SqlDialect};
use crate::ast::Expression;

/// MySQL-flavored renderer. The [SqlDialect] defaults are the MySQL
///  behavior, so this type only carries the connection that owns the string
///  escape primitive.
pub struct Mysql<C> {
    pub connection: C,
}

impl<C: Connection> Mysql<C> {
    pub fn new(connection: C) -> Self {
        Self { connection }
    }
}

impl<C: Connection> SqlDialect for Mysql<C> {
    fn connection(&self) -> &dyn Connection {
        &self.connection
    }
}

/// Renders [expr] as a MySQL fragment using [connection]'s escape primitive.
pub fn to_source(
    expr: &Expression,
    cx: &Context,
    connection: &dyn Connection,
) -> Result<String, Error> {
    super::to_source(expr, cx, &Mysql { connection })
}
