//! The expression factory: parses the compact filter language into an
//!  expression tree.
//!
//! The grammar, loosest binding first:
//!
//! ```text
//! filter     := and ( "||" and )*
//! and        := unary ( "&&" unary )*
//! unary      := "!" unary | "(" filter ")" | comparison
//! comparison := name cmp value
//! name       := identifier, optionally with a parenthesized parameter list
//!               that is kept verbatim ("attr(7)")
//! value      := null | true | false | number | string | "[" value,* "]"
//! ```
//!
//! Sort lists are parsed separately: `"-product.ctime,product.label"` with an
//!  optional `+`/`-` direction prefix per name, ascending by default.

use crate::ast::{self, Combine, CombineOp, Compare, CompareOp, Direction, Expression, Sort};
use crate::lex::{Error as LexerError, Lexer, Token, TokenType};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Returned when the input is empty (or just whitespace)
    NoExpression,
    Lexical(LexerError),
    MissingCloseParen,
    UnexpectedToken(Token),
    UnexpectedEof,
    Expression(ast::Error),
    Other(String),
}

impl From<LexerError> for Error {
    fn from(value: LexerError) -> Self {
        Self::Lexical(value)
    }
}

impl From<ast::Error> for Error {
    fn from(value: ast::Error) -> Self {
        Self::Expression(value)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoExpression => write!(f, "Empty input"),
            Self::Lexical(l) => write!(f, "Lexical error: {l}"),
            Self::MissingCloseParen => write!(f, "Missing closing parenthesis"),
            Self::UnexpectedToken(t) => write!(f, "Unexpected token, got {t:?}"),
            Self::UnexpectedEof => write!(f, "Unexpected end of input"),
            Self::Expression(e) => write!(f, "{e}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for Error {}

/// Parses a filter string into an expression tree. The root is the single
///  comparison or the outermost combination.
pub fn parse(input: &str) -> Result<Expression, Error> {
    let mut lexer = Lexer::new(input.as_bytes());
    if lexer.peek_token()?.is_none() {
        return Err(Error::NoExpression);
    }

    let root = parse_or(&mut lexer)?;

    // Make sure we've completely parsed the input
    if let Some(tok) = lexer.next_token()? {
        Err(Error::UnexpectedToken(tok))
    } else {
        Ok(root)
    }
}

/// Parses a sort list. An empty input is an empty list, not an error,
///  because sorting is optional wherever filtering is possible.
pub fn parse_sort(input: &str) -> Result<Vec<Sort>, Error> {
    let mut lexer = Lexer::new(input.as_bytes());
    let mut sorts = Vec::new();

    if lexer.peek_token()?.is_none() {
        return Ok(sorts);
    }

    loop {
        let operator = if consume(&mut lexer, TokenType::Minus)? {
            Direction::Desc
        } else {
            _ = consume(&mut lexer, TokenType::Plus)?;
            Direction::Asc
        };
        let name = parse_name(&mut lexer)?;
        sorts.push(Sort::new(operator, name));

        match lexer.next_token()? {
            None => return Ok(sorts),
            Some(tok) if tok.ty == TokenType::Comma => continue,
            Some(tok) => return Err(Error::UnexpectedToken(tok)),
        }
    }
}

/// If the next token has type [ty], consume it and return true.
fn consume(lexer: &mut Lexer, ty: TokenType) -> Result<bool, Error> {
    if let Some(tok) = lexer.peek_token()?
        && tok.ty == ty
    {
        _ = lexer.next_token()?;
        Ok(true)
    } else {
        Ok(false)
    }
}

/// `||` chains collapse into a single Combine so that `a || b || c` becomes
///  one node with three children rather than a lopsided tree.
fn parse_or(lexer: &mut Lexer) -> Result<Expression, Error> {
    let mut children = vec![parse_and(lexer)?];
    while consume(lexer, TokenType::Or)? {
        children.push(parse_and(lexer)?);
    }
    if children.len() == 1 {
        Ok(children.remove(0))
    } else {
        Ok(Combine::new(CombineOp::Or, children)?.into())
    }
}

fn parse_and(lexer: &mut Lexer) -> Result<Expression, Error> {
    let mut children = vec![parse_unary(lexer)?];
    while consume(lexer, TokenType::And)? {
        children.push(parse_unary(lexer)?);
    }
    if children.len() == 1 {
        Ok(children.remove(0))
    } else {
        Ok(Combine::new(CombineOp::And, children)?.into())
    }
}

fn parse_unary(lexer: &mut Lexer) -> Result<Expression, Error> {
    if consume(lexer, TokenType::Bang)? {
        let child = parse_unary(lexer)?;
        return Ok(Combine::new(CombineOp::Not, vec![child])?.into());
    }

    if consume(lexer, TokenType::ParenLeft)? {
        let inner = parse_or(lexer)?;
        if !consume(lexer, TokenType::ParenRight)? {
            return Err(Error::MissingCloseParen);
        }
        return Ok(inner);
    }

    parse_comparison(lexer)
}

fn parse_comparison(lexer: &mut Lexer) -> Result<Expression, Error> {
    let name = parse_name(lexer)?;

    let op_tok = lexer.next_token()?.ok_or(Error::UnexpectedEof)?;
    let operator = match op_tok.ty {
        TokenType::Eq => CompareOp::Eq,
        TokenType::Ne => CompareOp::Ne,
        TokenType::Gt => CompareOp::Gt,
        TokenType::Lt => CompareOp::Lt,
        TokenType::Ge => CompareOp::Ge,
        TokenType::Le => CompareOp::Le,
        TokenType::Contains => CompareOp::Contains,
        TokenType::StartsWith => CompareOp::StartsWith,
        _ => return Err(Error::UnexpectedToken(op_tok)),
    };

    let value = parse_value(lexer)?;
    Ok(Compare::new(operator, name, value).into())
}

/// Parses a field name, reassembling a parameterized one ("attr(7)") into
///  the textual form the name translator understands.
fn parse_name(lexer: &mut Lexer) -> Result<String, Error> {
    let tok = lexer.next_token()?.ok_or(Error::UnexpectedEof)?;
    if tok.ty != TokenType::Identifier {
        return Err(Error::UnexpectedToken(tok));
    }
    let mut name = utf8(lexer.contents(&tok))?.to_string();

    if !consume(lexer, TokenType::ParenLeft)? {
        return Ok(name);
    }

    // Parameter list: literals and bare identifiers, kept as written (string
    //  parameters keep their quotes for the translator's param typing)
    let mut params: Vec<&str> = Vec::new();
    let mut first = true;
    loop {
        let tok = lexer.peek_token()?.ok_or(Error::UnexpectedEof)?;
        if tok.ty == TokenType::ParenRight {
            _ = lexer.next_token()?;
            break;
        }

        if !first && !consume(lexer, TokenType::Comma)? {
            return Err(Error::UnexpectedToken(tok));
        }
        first = false;

        let tok = lexer.next_token()?.ok_or(Error::UnexpectedEof)?;
        match tok.ty {
            TokenType::Number
            | TokenType::Identifier
            | TokenType::StringSingleQuote
            | TokenType::StringDoubleQuote
            | TokenType::True
            | TokenType::False
            | TokenType::Null => params.push(utf8(lexer.source_of(&tok))?),
            _ => return Err(Error::UnexpectedToken(tok)),
        }
    }

    name.push('(');
    name.push_str(&params.join(","));
    name.push(')');
    Ok(name)
}

fn parse_value(lexer: &mut Lexer) -> Result<Value, Error> {
    let tok = lexer.next_token()?.ok_or(Error::UnexpectedEof)?;
    match tok.ty {
        TokenType::True => Ok(Value::Bool(true)),
        TokenType::False => Ok(Value::Bool(false)),
        TokenType::Null => Ok(Value::Null),
        TokenType::Number => number_value(utf8(lexer.contents(&tok))?, false),
        TokenType::Minus | TokenType::Plus => {
            let negate = tok.ty == TokenType::Minus;
            let num = lexer.next_token()?.ok_or(Error::UnexpectedEof)?;
            if num.ty != TokenType::Number {
                return Err(Error::UnexpectedToken(num));
            }
            number_value(utf8(lexer.contents(&num))?, negate)
        }
        TokenType::StringSingleQuote | TokenType::StringDoubleQuote => {
            Ok(Value::Str(utf8(lexer.contents(&tok))?.to_string()))
        }
        TokenType::BracketLeft => {
            let mut items = Vec::new();
            let mut first = true;
            loop {
                let tok = lexer.peek_token()?.ok_or(Error::UnexpectedEof)?;
                if tok.ty == TokenType::BracketRight {
                    _ = lexer.next_token()?;
                    return Ok(Value::List(items));
                }
                if !first && !consume(lexer, TokenType::Comma)? {
                    return Err(Error::UnexpectedToken(tok));
                }
                first = false;
                items.push(parse_value(lexer)?);
            }
        }
        _ => Err(Error::UnexpectedToken(tok)),
    }
}

fn number_value(text: &str, negate: bool) -> Result<Value, Error> {
    if text.contains('.') {
        let f: f64 = text
            .parse()
            .map_err(|_| Error::Other(format!("Invalid number literal '{text}'")))?;
        Ok(Value::Float(if negate { -f } else { f }))
    } else {
        let i: i64 = text
            .parse()
            .map_err(|_| Error::Other(format!("Invalid number literal '{text}'")))?;
        Ok(Value::Int(if negate { -i } else { i }))
    }
}

fn utf8(bytes: &[u8]) -> Result<&str, Error> {
    std::str::from_utf8(bytes).map_err(|_| Error::Other("Invalid UTF-8 in input".to_string()))
}
