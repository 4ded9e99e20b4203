use crate::Value;

/// Fully-qualified reference to a table column. An empty `table` renders
/// unqualified.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub table: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Is,
    IsNot,
    Like,
    NotLike,
    Addition,
    Subtraction,
    Multiplication,
    Division,
    Remainder,
}

impl BinaryOp {
    /// Lower numbers bind weaker, the writer parenthesizes when a child's
    /// precedence does not dominate the operator's.
    pub fn precedence(&self) -> i32 {
        match self {
            BinaryOp::Or => 100,
            BinaryOp::And => 200,
            BinaryOp::Equal
            | BinaryOp::NotEqual
            | BinaryOp::Less
            | BinaryOp::Greater
            | BinaryOp::LessEqual
            | BinaryOp::GreaterEqual => 300,
            BinaryOp::Is | BinaryOp::IsNot | BinaryOp::Like | BinaryOp::NotLike => 400,
            BinaryOp::Subtraction | BinaryOp::Addition => 800,
            BinaryOp::Multiplication | BinaryOp::Division | BinaryOp::Remainder => 900,
        }
    }

    pub fn infix(&self) -> &'static str {
        match self {
            BinaryOp::Or => " OR ",
            BinaryOp::And => " AND ",
            BinaryOp::Equal => " = ",
            BinaryOp::NotEqual => " != ",
            BinaryOp::Less => " < ",
            BinaryOp::Greater => " > ",
            BinaryOp::LessEqual => " <= ",
            BinaryOp::GreaterEqual => " >= ",
            BinaryOp::Is => " IS ",
            BinaryOp::IsNot => " IS NOT ",
            BinaryOp::Like => " LIKE ",
            BinaryOp::NotLike => " NOT LIKE ",
            BinaryOp::Addition => " + ",
            BinaryOp::Subtraction => " - ",
            BinaryOp::Multiplication => " * ",
            BinaryOp::Division => " / ",
            BinaryOp::Remainder => " % ",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negative,
    Not,
}

impl UnaryOp {
    pub fn precedence(&self) -> i32 {
        match self {
            UnaryOp::Negative => 1250,
            UnaryOp::Not => 250,
        }
    }
}

/// Sort direction for ORDER BY terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// An expression with ordering information attached.
#[derive(Debug, Clone)]
pub struct Ordered {
    pub expression: Expr,
    pub order: Order,
}

/// A predicate / projection tree node. Literal leaves are bound as
/// statement parameters at compile time, with the exception of NULL which
/// is rendered inline so `IS NULL` comparisons stay portable.
#[derive(Debug, Clone)]
pub enum Expr {
    Column(ColumnRef),
    Literal(Value),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Call {
        function: String,
        args: Vec<Expr>,
    },
    Asterisk,
}

/// Column reference expression; pass an empty `table` for an unqualified
/// name.
pub fn col(table: impl Into<String>, name: impl Into<String>) -> Expr {
    Expr::Column(ColumnRef {
        table: table.into(),
        name: name.into(),
    })
}

/// Literal expression, bound as a parameter when compiled.
pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Literal(value.into())
}

pub fn call(function: impl Into<String>, args: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Call {
        function: function.into(),
        args: args.into_iter().collect(),
    }
}

macro_rules! binary {
    ($name:ident, $op:ident) => {
        pub fn $name(self, rhs: Expr) -> Expr {
            Expr::Binary {
                op: BinaryOp::$op,
                lhs: Box::new(self),
                rhs: Box::new(rhs),
            }
        }
    };
}

impl Expr {
    binary!(eq, Equal);
    binary!(ne, NotEqual);
    binary!(lt, Less);
    binary!(gt, Greater);
    binary!(le, LessEqual);
    binary!(ge, GreaterEqual);
    binary!(like, Like);
    binary!(not_like, NotLike);
    binary!(and, And);
    binary!(or, Or);
    binary!(add, Addition);
    binary!(sub, Subtraction);
    binary!(mul, Multiplication);
    binary!(div, Division);
    binary!(rem, Remainder);

    pub fn is_null(self) -> Expr {
        Expr::Binary {
            op: BinaryOp::Is,
            lhs: Box::new(self),
            rhs: Box::new(Expr::Literal(Value::Null)),
        }
    }

    pub fn is_not_null(self) -> Expr {
        Expr::Binary {
            op: BinaryOp::IsNot,
            lhs: Box::new(self),
            rhs: Box::new(Expr::Literal(Value::Null)),
        }
    }

    pub fn not(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(self),
        }
    }

    pub fn neg(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::Negative,
            expr: Box::new(self),
        }
    }

    pub fn asc(self) -> Ordered {
        Ordered {
            expression: self,
            order: Order::Asc,
        }
    }

    pub fn desc(self) -> Ordered {
        Ordered {
            expression: self,
            order: Order::Desc,
        }
    }

    pub fn precedence(&self) -> i32 {
        match self {
            Expr::Binary { op, .. } => op.precedence(),
            Expr::Unary { op, .. } => op.precedence(),
            _ => 1_000_000,
        }
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Literal(value)
    }
}
