use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::ast::{Combine, CombineOp, Compare, CompareOp, Direction, Expression, Sort};
use crate::value::{DATE_FORMAT, DATETIME_FORMAT, ParamType, Value};

pub mod mysql;
pub mod postgres;

/// Mapping from logical field names to their type tags. A name missing from
///  this map is a caller configuration bug and fails the render; the type is
///  never guessed.
pub type Types = HashMap<String, ParamType>;

/// Mapping from logical field names to storage-specific expressions,
///  possibly containing `%1$s`-style placeholders filled from a
///  parameterized name. An empty replacement means "not expressible in this
///  dialect" and the node renders to nothing.
pub type Translations = HashMap<String, String>;

/// Value hooks applied before escaping, keyed by field name.
pub type Plugins<'a> = HashMap<String, &'a dyn Plugin>;

/// Name hooks rewriting a translated name, keyed like translations.
pub type Funcs = HashMap<String, NameFunc>;

/// Transforms a comparison value into its storage representation before it
///  is escaped (e.g. mapping an enum label to its numeric column value).
pub trait Plugin {
    fn translate(&self, value: &Value) -> Value;
}

impl<F> Plugin for F
where
    F: Fn(&Value) -> Value,
{
    fn translate(&self, value: &Value) -> Value {
        self(value)
    }
}

/// Called with the substituted translation, the original name and the typed
///  parameters extracted from it, returning the final storage expression.
pub type NameFunc = fn(&str, &str, &[Value]) -> String;

/// Read-only snapshot of the caller's configuration for one render pass.
/// Threading it through every recursive call keeps nodes free of rendering
///  state, so the same tree can be rendered concurrently with different
///  contexts.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    types: &'a Types,
    translations: Option<&'a Translations>,
    plugins: Option<&'a Plugins<'a>>,
    funcs: Option<&'a Funcs>,
}

impl<'a> Context<'a> {
    pub fn new(types: &'a Types) -> Self {
        Self {
            types,
            translations: None,
            plugins: None,
            funcs: None,
        }
    }

    pub fn translations(mut self, translations: &'a Translations) -> Self {
        self.translations = Some(translations);
        self
    }

    pub fn plugins(mut self, plugins: &'a Plugins<'a>) -> Self {
        self.plugins = Some(plugins);
        self
    }

    pub fn funcs(mut self, funcs: &'a Funcs) -> Self {
        self.funcs = Some(funcs);
        self
    }

    /// The type tag for [name], trying the full name first and then the
    ///  parameter-stripped form, so `attr(7)` can be typed under either
    ///  "attr(7)", "attr()" or "attr".
    pub fn param_type(&self, name: &str) -> Option<ParamType> {
        if let Some(ty) = self.types.get(name) {
            return Some(*ty);
        }
        let base = name.split('(').next()?;
        if base.len() == name.len() {
            return None;
        }
        self.types
            .get(&format!("{base}()"))
            .or_else(|| self.types.get(base))
            .copied()
    }

    fn translation(&self, key: &str) -> Option<&'a str> {
        self.translations?.get(key).map(|s| s.as_str())
    }

    fn plugin(&self, name: &str) -> Option<&'a dyn Plugin> {
        self.plugins?.get(name).copied()
    }

    fn func(&self, key: &str) -> Option<NameFunc> {
        self.funcs?.get(key).copied()
    }

    /// Runs the value plugin registered for [name], if any.
    pub(crate) fn translate_value(&self, name: &str, value: &Value) -> Value {
        match self.plugin(name) {
            Some(plugin) => plugin.translate(value),
            None => value.clone(),
        }
    }
}

static PARAMETERIZED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z0-9_.:]+)\((.*)\)$").unwrap());

/// Translates a logical field name into the storage-specific expression used
///  at render time.
///
/// An exact translation wins. A parameterized name like `attr(7)` resolves
///  its base against the translation keys ("attr()", "attr", or another
///  parameterized spelling), substitutes `%1$s`-style placeholders in order
///  and finally gives a registered name hook the chance to rewrite the
///  result. A name with no translation at all passes through unchanged:
///  unmapped names may still be valid raw column names.
pub fn translate_name(name: &str, cx: &Context) -> String {
    if let Some(translation) = cx.translation(name) {
        return translation.to_string();
    }

    if let Some(caps) = PARAMETERIZED.captures(name) {
        let base = &caps[1];
        let params = split_params(&caps[2]);
        if let Some((key, template)) = lookup_parameterized(base, cx) {
            let mut translated = substitute_params(template, &params);
            if let Some(func) = cx.func(&key).or_else(|| cx.func(name)) {
                translated = func(&translated, name, &params);
            }
            return translated;
        }
    }

    name.to_string()
}

/// Finds the translation entry for a parameterized name's base. Tries the
///  "base()" and bare spellings first, then any key whose own base matches
///  (smallest key wins to keep lookups deterministic).
fn lookup_parameterized<'a>(base: &str, cx: &Context<'a>) -> Option<(String, &'a str)> {
    let closed = format!("{base}()");
    if let Some(t) = cx.translation(&closed) {
        return Some((closed, t));
    }
    if let Some(t) = cx.translation(base) {
        return Some((base.to_string(), t));
    }

    let translations = cx.translations?;
    translations
        .iter()
        .filter(|(key, _)| key.contains('(') && key[..key.find('(').unwrap_or(0)] == *base)
        .min_by(|a, b| a.0.cmp(b.0))
        .map(|(key, template)| (key.clone(), template.as_str()))
}

/// Splits a raw parameter list on top-level commas and types each entry the
///  way the factory types literals: quoted parameters are strings, numbers
///  with a decimal point are floats, anything else numeric is an integer.
fn split_params(raw: &str) -> Vec<Value> {
    let mut params = Vec::new();
    let mut start = 0;
    let mut quote: Option<char> = None;

    let push = |params: &mut Vec<Value>, part: &str| {
        let part = part.trim();
        if part.is_empty() {
            return;
        }
        if (part.starts_with('"') && part.ends_with('"') && part.len() >= 2)
            || (part.starts_with('\'') && part.ends_with('\'') && part.len() >= 2)
        {
            params.push(Value::Str(part[1..part.len() - 1].to_string()));
        } else if part.contains('.')
            && let Ok(f) = part.parse::<f64>()
        {
            params.push(Value::Float(f));
        } else if let Ok(i) = part.parse::<i64>() {
            params.push(Value::Int(i));
        } else {
            params.push(Value::Str(part.to_string()));
        }
    };

    for (i, c) in raw.char_indices() {
        match (c, quote) {
            ('"' | '\'', None) => quote = Some(c),
            (c, Some(q)) if c == q => quote = None,
            (',', None) => {
                push(&mut params, &raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    push(&mut params, &raw[start..]);
    params
}

/// Replaces `%1$s`..`%N$s` placeholders with the positional parameters.
fn substitute_params(template: &str, params: &[Value]) -> String {
    let mut out = template.to_string();
    for (i, param) in params.iter().enumerate() {
        let placeholder = format!("%{}$s", i + 1);
        if out.contains(&placeholder) {
            out = out.replace(&placeholder, &param.to_display_string());
        }
    }
    out
}

/// The escaping primitive owned by the database connection. The renderer
///  never quotes raw strings itself: everything that ends up inside a quoted
///  literal goes through this exactly once.
pub trait Connection {
    fn escape(&self, raw: &str) -> String;
}

impl<T: Connection + ?Sized> Connection for &T {
    fn escape(&self, raw: &str) -> String {
        (**self).escape(raw)
    }
}

/// Escape character for LIKE wildcard metacharacters.
pub const LIKE_ESCAPE: char = '#';

/// Guards `%`, `_` and `[` (and the escape character itself) so a pattern
///  value matches literally. Applied after the connection escape and before
///  the surrounding wildcards are added.
fn escape_wildcards(s: &str) -> String {
    let mut res = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '#' | '%' | '_' | '[') {
            res.push(LIKE_ESCAPE);
        }
        res.push(c);
    }
    res
}

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A compared or sorted name is missing from the `types` map
    UnknownName(String),
    /// List values combine only with `==` and `!=`
    ListOperator(CompareOp),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownName(name) => write!(f, "Invalid name \"{name}\""),
            Self::ListOperator(op) => write!(
                f,
                "List values are only allowed for \"==\" and \"!=\" operators, got \"{op}\""
            ),
        }
    }
}

impl std::error::Error for Error {}

/// Rendering strategy for one SQL flavor. The default methods implement the
///  MySQL-style behavior; a new dialect overrides only what differs:
///
/// ```rust
/// use criteria_expr::translate::{Connection, SqlDialect};
///
/// struct Sqlsrv<C> {
///     connection: C,
/// }
///
/// impl<C: Connection> SqlDialect for Sqlsrv<C> {
///     fn connection(&self) -> &dyn Connection {
///         &self.connection
///     }
///
///     // SQL Server has no boolean literals at all
///     fn bool_literal(&self, value: bool) -> &'static str {
///         if value { "1" } else { "0" }
///     }
/// }
/// ```
pub trait SqlDialect {
    /// The connection owning the string escape primitive.
    fn connection(&self) -> &dyn Connection;

    /// SQL token for a comparison operator.
    fn compare_op(&self, op: CompareOp) -> &'static str {
        match op {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Le => "<=",
            CompareOp::Contains | CompareOp::StartsWith => "LIKE",
        }
    }

    /// SQL token for a combine operator.
    fn combine_op(&self, op: CombineOp) -> &'static str {
        match op {
            CombineOp::And => "AND",
            CombineOp::Or => "OR",
            CombineOp::Not => "NOT",
        }
    }

    /// SQL keyword for a sort direction.
    fn direction(&self, dir: Direction) -> &'static str {
        match dir {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }

    /// Literal form of a boolean value.
    fn bool_literal(&self, value: bool) -> &'static str {
        if value { "1" } else { "0" }
    }

    /// Escapes [value] into a literal that is safe to splice into the
    ///  generated fragment. The pattern operators wrap string values in
    ///  wildcards, with any wildcard metacharacters in the value guarded
    ///  first so they match literally.
    fn escape(&self, op: CompareOp, ty: ParamType, name: &str, value: &Value, cx: &Context) -> String {
        let value = cx.translate_value(name, value);
        match ty {
            ParamType::Null => "null".to_string(),
            ParamType::Bool => self.bool_literal(value.to_bool()).to_string(),
            ParamType::Int => value.to_int().to_string(),
            ParamType::Float => value.to_float().to_string(),
            ParamType::Date => match value.to_date() {
                Some(d) => format!(
                    "'{}'",
                    self.connection().escape(&d.format(DATE_FORMAT).to_string())
                ),
                None => "null".to_string(),
            },
            ParamType::DateTime => match value.to_datetime() {
                Some(dt) => format!(
                    "'{}'",
                    self.connection()
                        .escape(&dt.format(DATETIME_FORMAT).to_string())
                ),
                None => "null".to_string(),
            },
            ParamType::Str => {
                let escaped = self.connection().escape(&value.to_display_string());
                match op {
                    CompareOp::Contains => format!("'%{}%'", escape_wildcards(&escaped)),
                    CompareOp::StartsWith => format!("'{}%'", escape_wildcards(&escaped)),
                    _ => format!("'{escaped}'"),
                }
            }
        }
    }
}

/// Generates a SQL fragment from the expression tree. An empty string means
///  "no condition": the caller must omit the clause instead of splicing it.
/// Rendering is read-only and idempotent; the fragment carries no leading
///  WHERE/ORDER BY keyword.
pub fn to_source(
    expr: &Expression,
    cx: &Context,
    dialect: &(impl SqlDialect + ?Sized),
) -> Result<String, Error> {
    match expr {
        Expression::Compare(c) => compare_source(c, cx, dialect),
        Expression::Sort(s) => sort_source(s, cx, dialect),
        Expression::Combine(c) => combine_source(c, cx, dialect),
    }
}

fn compare_source(
    cmp: &Compare,
    cx: &Context,
    dialect: &(impl SqlDialect + ?Sized),
) -> Result<String, Error> {
    let name = cmp.name();
    let transname = translate_name(name, cx);
    if transname.is_empty() {
        return Ok(String::new());
    }

    let ty = cx
        .param_type(name)
        .ok_or_else(|| Error::UnknownName(name.to_string()))?;

    // null and list operands render dedicated terms, everything else is the
    //  plain "<name> <op> <value>" form
    if cmp.value().is_null() && matches!(cmp.operator(), CompareOp::Eq | CompareOp::Ne) {
        return Ok(match cmp.operator() {
            CompareOp::Eq => format!("{transname} IS NULL"),
            _ => format!("{transname} IS NOT NULL"),
        });
    }

    if let Value::List(items) = cmp.value() {
        let keyword = match cmp.operator() {
            CompareOp::Eq => "IN",
            CompareOp::Ne => "NOT IN",
            op => return Err(Error::ListOperator(op)),
        };
        let values: Vec<String> = items
            .iter()
            .map(|item| dialect.escape(cmp.operator(), ty, name, item, cx))
            .collect();
        return Ok(format!("{transname} {keyword} ({})", values.join(",")));
    }

    Ok(format!(
        "{transname} {} {}",
        dialect.compare_op(cmp.operator()),
        dialect.escape(cmp.operator(), ty, name, cmp.value(), cx)
    ))
}

fn sort_source(
    sort: &Sort,
    cx: &Context,
    dialect: &(impl SqlDialect + ?Sized),
) -> Result<String, Error> {
    let transname = translate_name(sort.name(), cx);
    if transname.is_empty() {
        return Ok(String::new());
    }
    if cx.param_type(sort.name()).is_none() {
        return Err(Error::UnknownName(sort.name().to_string()));
    }
    Ok(format!("{transname} {}", dialect.direction(sort.operator())))
}

fn combine_source(
    comb: &Combine,
    cx: &Context,
    dialect: &(impl SqlDialect + ?Sized),
) -> Result<String, Error> {
    let mut items = comb.expressions().iter();
    let Some(first) = items.next() else {
        return Ok(String::new());
    };

    let mut string = to_source(first, cx, dialect)?;

    if comb.operator() == CombineOp::Not {
        if string.is_empty() {
            return Ok(String::new());
        }
        return Ok(format!(
            " {} ( {string} )",
            dialect.combine_op(CombineOp::Not)
        ));
    }

    for item in items {
        let itemstr = to_source(item, cx, dialect)?;
        if !itemstr.is_empty() {
            if string.is_empty() {
                string = itemstr;
            } else {
                string = format!("{string} {} {itemstr}", dialect.combine_op(comb.operator()));
            }
        }
    }

    if string.is_empty() {
        Ok(string)
    } else {
        Ok(format!("( {string} )"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_fixture() -> (Types, Translations, Funcs) {
        let types = HashMap::from([
            ("price".to_string(), ParamType::Float),
            ("attr()".to_string(), ParamType::Int),
        ]);
        let translations = HashMap::from([
            ("price".to_string(), "t.price".to_string()),
            ("attr()".to_string(), "a.attr_%1$s".to_string()),
            ("basket:total()".to_string(), "SUM(%1$s)".to_string()),
        ]);
        let funcs: Funcs = HashMap::from([(
            "basket:total()".to_string(),
            (|translated: &str, _name: &str, params: &[Value]| {
                format!("{translated} * {}", params[1].to_display_string())
            }) as NameFunc,
        )]);
        (types, translations, funcs)
    }

    #[test]
    fn exact_translation() {
        let (types, translations, _) = context_fixture();
        let cx = Context::new(&types).translations(&translations);
        assert_eq!("t.price", translate_name("price", &cx));
    }

    #[test]
    fn unknown_names_pass_through() {
        let (types, translations, _) = context_fixture();
        let cx = Context::new(&types).translations(&translations);
        assert_eq!("stock.level", translate_name("stock.level", &cx));
    }

    #[test]
    fn parameterized_translation() {
        let (types, translations, _) = context_fixture();
        let cx = Context::new(&types).translations(&translations);
        assert_eq!("a.attr_7", translate_name("attr(7)", &cx));
        assert_eq!("a.attr_x", translate_name("attr(\"x\")", &cx));
    }

    #[test]
    fn translation_key_may_carry_placeholders() {
        // the pattern key itself may be written with the placeholder
        let types = HashMap::from([("attr()".to_string(), ParamType::Int)]);
        let translations =
            HashMap::from([("attr(%1$s)".to_string(), "a.attr_%1$s".to_string())]);
        let cx = Context::new(&types).translations(&translations);
        assert_eq!("a.attr_7", translate_name("attr(7)", &cx));
    }

    #[test]
    fn parameterized_name_hook() {
        let (types, translations, funcs) = context_fixture();
        let cx = Context::new(&types)
            .translations(&translations)
            .funcs(&funcs);
        assert_eq!(
            "SUM(b.price) * 2",
            translate_name("basket:total(\"b.price\",2)", &cx)
        );
    }

    #[test]
    fn param_typing() {
        let params = split_params(r#""EUR", 3, 1.5, 'a,b'"#);
        assert_eq!(
            vec![
                Value::Str("EUR".to_string()),
                Value::Int(3),
                Value::Float(1.5),
                Value::Str("a,b".to_string()),
            ],
            params
        );
    }

    #[test]
    fn param_type_fallback() {
        let (types, ..) = context_fixture();
        let cx = Context::new(&types);
        assert_eq!(Some(ParamType::Float), cx.param_type("price"));
        assert_eq!(Some(ParamType::Int), cx.param_type("attr(7)"));
        assert_eq!(None, cx.param_type("unknown"));
    }

    #[test]
    fn only_comparisons_translate() {
        let (types, translations, _) = context_fixture();
        let cx = Context::new(&types).translations(&translations);

        let compare: Expression = Compare::new(CompareOp::Eq, "price", 1).into();
        assert_eq!(Some("t.price".to_string()), compare.translate(&cx));

        // untranslated names pass through
        let compare: Expression = Compare::new(CompareOp::Eq, "stock", 1).into();
        assert_eq!(Some("stock".to_string()), compare.translate(&cx));

        let sort: Expression = Sort::new(Direction::Asc, "price").into();
        assert_eq!(None, sort.translate(&cx));

        let combine: Expression = Combine::new(CombineOp::And, vec![]).unwrap().into();
        assert_eq!(None, combine.translate(&cx));
    }

    #[test]
    fn test_escape_wildcards() {
        assert_eq!("foo", escape_wildcards("foo"));
        assert_eq!("50#% off", escape_wildcards("50% off"));
        assert_eq!("a#_b##c#[d", escape_wildcards("a_b#c[d"));
    }
}
