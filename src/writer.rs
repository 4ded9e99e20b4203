use crate::{BinaryOp, ColumnRef, CompiledSql, Dialect, Expr, Value};

/// Accumulates statement text and the ordered parameter list during
/// compilation. Every literal encountered while walking an expression tree
/// is appended to `params` and replaced by a dialect placeholder, numbered
/// monotonically across the whole statement.
pub(crate) struct SqlWriter<'d> {
    pub dialect: &'d Dialect,
    pub sql: String,
    pub params: Vec<Value>,
}

impl<'d> SqlWriter<'d> {
    pub fn new(dialect: &'d Dialect) -> Self {
        Self {
            dialect,
            sql: String::with_capacity(256),
            params: Vec::new(),
        }
    }

    pub fn push(&mut self, fragment: &str) {
        self.sql.push_str(fragment);
    }

    pub fn write_identifier(&mut self, name: &str) {
        self.dialect.quote_identifier(name, &mut self.sql);
    }

    pub fn write_column_ref(&mut self, column: &ColumnRef, qualify: bool) {
        if qualify && !column.table.is_empty() {
            self.write_identifier(&column.table);
            self.sql.push('.');
        }
        self.write_identifier(&column.name);
    }

    /// Binds `value` and writes its placeholder.
    pub fn write_param(&mut self, value: Value) {
        self.params.push(value);
        self.dialect.placeholder(self.params.len(), &mut self.sql);
    }

    pub fn write_expr(&mut self, expr: &Expr, qualify: bool) {
        match expr {
            Expr::Column(column) => self.write_column_ref(column, qualify),
            // NULL is written inline rather than bound so IS NULL keeps its
            // meaning on every backend.
            Expr::Literal(value) if value.is_null() => self.sql.push_str("NULL"),
            Expr::Literal(value) => self.write_param(value.clone()),
            Expr::Binary { op, lhs, rhs } => self.write_binary(*op, lhs, rhs, qualify),
            Expr::Unary { op, expr } => {
                match op {
                    crate::UnaryOp::Negative => self.sql.push('-'),
                    crate::UnaryOp::Not => self.sql.push_str("NOT "),
                }
                self.parenthesized(expr.precedence() <= op.precedence(), expr, qualify);
            }
            Expr::Call { function, args } => {
                self.sql.push_str(function);
                self.sql.push('(');
                let mut first = true;
                for arg in args {
                    if !first {
                        self.sql.push_str(", ");
                    }
                    first = false;
                    self.write_expr(arg, qualify);
                }
                self.sql.push(')');
            }
            Expr::Asterisk => self.sql.push('*'),
        }
    }

    fn write_binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr, qualify: bool) {
        let precedence = op.precedence();
        self.parenthesized(lhs.precedence() < precedence, lhs, qualify);
        self.sql.push_str(op.infix());
        self.parenthesized(rhs.precedence() <= precedence, rhs, qualify);
    }

    fn parenthesized(&mut self, needed: bool, expr: &Expr, qualify: bool) {
        if needed {
            self.sql.push('(');
            self.write_expr(expr, qualify);
            self.sql.push(')');
        } else {
            self.write_expr(expr, qualify);
        }
    }

    pub fn finish(self) -> CompiledSql {
        CompiledSql {
            sql: self.sql,
            params: self.params,
        }
    }
}
