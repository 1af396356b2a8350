use std::str::FromStr;

use crate::translate::{self, Context};
use crate::value::Value;

/// Comparison operators. The display form is the symbol used by the filter
///  language; each SQL dialect maps the symbol to its own keyword.
#[derive(strum_macros::Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "<=")]
    Le,
    /// Substring match, `~=`
    #[strum(serialize = "~=")]
    Contains,
    /// Prefix match, `=~`
    #[strum(serialize = "=~")]
    StartsWith,
}

impl CompareOp {
    pub const ALL: [CompareOp; 8] = [
        CompareOp::Eq,
        CompareOp::Ne,
        CompareOp::Gt,
        CompareOp::Lt,
        CompareOp::Ge,
        CompareOp::Le,
        CompareOp::Contains,
        CompareOp::StartsWith,
    ];
}

impl FromStr for CompareOp {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "==" => Ok(CompareOp::Eq),
            "!=" => Ok(CompareOp::Ne),
            ">" => Ok(CompareOp::Gt),
            "<" => Ok(CompareOp::Lt),
            ">=" => Ok(CompareOp::Ge),
            "<=" => Ok(CompareOp::Le),
            "~=" => Ok(CompareOp::Contains),
            "=~" => Ok(CompareOp::StartsWith),
            _ => Err(Error::Operator(s.to_string())),
        }
    }
}

/// Boolean connectives for combining expressions.
#[derive(strum_macros::Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineOp {
    #[strum(serialize = "&&")]
    And,
    #[strum(serialize = "||")]
    Or,
    #[strum(serialize = "!")]
    Not,
}

impl CombineOp {
    pub const ALL: [CombineOp; 3] = [CombineOp::And, CombineOp::Or, CombineOp::Not];
}

impl FromStr for CombineOp {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "&&" => Ok(CombineOp::And),
            "||" => Ok(CombineOp::Or),
            "!" => Ok(CombineOp::Not),
            _ => Err(Error::Operator(s.to_string())),
        }
    }
}

/// Sort direction, `+` ascending and `-` descending.
#[derive(strum_macros::Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    #[strum(serialize = "+")]
    Asc,
    #[strum(serialize = "-")]
    Desc,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Asc, Direction::Desc];
}

impl FromStr for Direction {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "+" => Ok(Direction::Asc),
            "-" => Ok(Direction::Desc),
            _ => Err(Error::Operator(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Operator(String),
    /// `!` combines exactly one child expression
    NotTakesOne(usize),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Operator(op) => write!(f, "Invalid operator \"{op}\""),
            Self::NotTakesOne(n) => {
                write!(f, "Operator \"!\" takes exactly one expression (got {n})")
            }
        }
    }
}

impl std::error::Error for Error {}

/// Leaf node comparing a named field against a value.
///
/// Nodes are immutable once constructed; all rendering state lives in the
///  [Context] passed to the renderers.
#[derive(Debug, Clone, PartialEq)]
pub struct Compare {
    operator: CompareOp,
    name: String,
    value: Value,
}

impl Compare {
    pub fn new(operator: CompareOp, name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            operator,
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn operator(&self) -> CompareOp {
        self.operator
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// Leaf node naming a field to order by.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    operator: Direction,
    name: String,
}

impl Sort {
    pub fn new(operator: Direction, name: impl Into<String>) -> Self {
        Self {
            operator,
            name: name.into(),
        }
    }

    pub fn operator(&self) -> Direction {
        self.operator
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Internal node combining child expressions with a boolean operator.
/// Children keep their insertion order through rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct Combine {
    operator: CombineOp,
    expressions: Vec<Expression>,
}

impl Combine {
    /// `!` requires exactly one child; the arity is checked here so that a
    ///  malformed tree never reaches a renderer.
    pub fn new(operator: CombineOp, expressions: Vec<Expression>) -> Result<Self, Error> {
        if operator == CombineOp::Not && expressions.len() != 1 {
            return Err(Error::NotTakesOne(expressions.len()));
        }
        Ok(Self {
            operator,
            expressions,
        })
    }

    pub fn operator(&self) -> CombineOp {
        self.operator
    }

    pub fn expressions(&self) -> &[Expression] {
        &self.expressions
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Compare(Compare),
    Combine(Combine),
    Sort(Sort),
}

impl Expression {
    /// The storage-specific name this node sorts or filters by. Only a
    ///  comparison resolves to a name; combinations and sortings return
    ///  `None` so callers can tell leaves from composites.
    pub fn translate(&self, cx: &Context) -> Option<String> {
        match self {
            Expression::Compare(c) => Some(translate::translate_name(c.name(), cx)),
            Expression::Combine(_) | Expression::Sort(_) => None,
        }
    }
}

impl From<Compare> for Expression {
    fn from(c: Compare) -> Self {
        Expression::Compare(c)
    }
}
impl From<Combine> for Expression {
    fn from(c: Combine) -> Self {
        Expression::Combine(c)
    }
}
impl From<Sort> for Expression {
    fn from(s: Sort) -> Self {
        Expression::Sort(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_symbols() {
        assert_eq!("==", CompareOp::Eq.to_string());
        assert_eq!("=~", CompareOp::StartsWith.to_string());
        assert_eq!("&&", CombineOp::And.to_string());
        assert_eq!("-", Direction::Desc.to_string());
    }

    #[test]
    fn operator_parsing() {
        for op in CompareOp::ALL {
            assert_eq!(Ok(op), op.to_string().parse());
        }
        assert_eq!(
            Err(Error::Operator("=".to_string())),
            "=".parse::<CompareOp>()
        );
        assert_eq!(
            Err(Error::Operator("AND".to_string())),
            "AND".parse::<CombineOp>()
        );
    }

    #[test]
    fn not_arity_is_checked() {
        let one = Combine::new(
            CombineOp::Not,
            vec![Compare::new(CompareOp::Eq, "x", 1).into()],
        );
        assert!(one.is_ok());

        let two = Combine::new(
            CombineOp::Not,
            vec![
                Compare::new(CompareOp::Eq, "x", 1).into(),
                Compare::new(CompareOp::Eq, "y", 2).into(),
            ],
        );
        assert_eq!(Err(Error::NotTakesOne(2)), two);

        assert_eq!(
            Err(Error::NotTakesOne(0)),
            Combine::new(CombineOp::Not, vec![])
        );
        assert!(Combine::new(CombineOp::And, vec![]).is_ok());
    }
}
