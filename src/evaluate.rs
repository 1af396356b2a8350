//! In-memory rendering backend: instead of a SQL fragment, an expression
//!  tree compiles into closures over associative records, so arrays of
//!  items can be filtered and ordered without a database round trip.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::ast::{Combine, CombineOp, Compare, CompareOp, Direction, Expression, Sort};
use crate::translate::{self, Context, Error};
use crate::value::{ParamType, Value};

/// An associative record, the in-memory analogue of a result row.
pub type Record = HashMap<String, Value>;

pub type Predicate = Box<dyn Fn(&Record) -> bool>;
pub type Comparator = Box<dyn Fn(&Record, &Record) -> Ordering>;

/// Compiles [expr] into a predicate. `Ok(None)` means the expression places
///  no condition on records at all, the closure analogue of the empty SQL
///  fragment; callers treat it as "keep everything".
///
/// Name and type validation happens here, before any record is touched, with
///  the same failure behavior as the SQL renderers.
pub fn predicate(expr: &Expression, cx: &Context) -> Result<Option<Predicate>, Error> {
    match expr {
        Expression::Compare(c) => compare_predicate(c, cx),
        Expression::Combine(c) => combine_predicate(c, cx),
        // a sorting carries no boolean meaning
        Expression::Sort(_) => Ok(None),
    }
}

fn compare_predicate(cmp: &Compare, cx: &Context) -> Result<Option<Predicate>, Error> {
    let key = translate::translate_name(cmp.name(), cx);
    if key.is_empty() {
        return Ok(None);
    }
    let ty = cx
        .param_type(cmp.name())
        .ok_or_else(|| Error::UnknownName(cmp.name().to_string()))?;

    let op = cmp.operator();
    let value = cx.translate_value(cmp.name(), cmp.value());

    // null and list operands get dedicated tests, mirroring the IS NULL and
    //  IN terms of the SQL renderers
    if value.is_null() && matches!(op, CompareOp::Eq | CompareOp::Ne) {
        let want_null = op == CompareOp::Eq;
        return Ok(Some(Box::new(move |record: &Record| {
            field(record, &key).is_null() == want_null
        })));
    }

    if let Value::List(items) = &value {
        let items: Vec<Value> = items.iter().map(|item| item.coerce(ty)).collect();
        let negate = match op {
            CompareOp::Eq => false,
            CompareOp::Ne => true,
            op => return Err(Error::ListOperator(op)),
        };
        return Ok(Some(Box::new(move |record: &Record| {
            items.contains(&field(record, &key).coerce(ty)) != negate
        })));
    }

    let value = value.coerce(ty);
    Ok(Some(Box::new(move |record: &Record| {
        let left = field(record, &key).coerce(ty);
        match op {
            CompareOp::Eq => left == value,
            CompareOp::Ne => left != value,
            CompareOp::Gt => left.compare(&value) == Ordering::Greater,
            CompareOp::Ge => left.compare(&value) != Ordering::Less,
            CompareOp::Lt => left.compare(&value) == Ordering::Less,
            CompareOp::Le => left.compare(&value) != Ordering::Greater,
            CompareOp::Contains => left
                .to_display_string()
                .contains(&value.to_display_string()),
            CompareOp::StartsWith => left
                .to_display_string()
                .starts_with(&value.to_display_string()),
        }
    })))
}

fn combine_predicate(comb: &Combine, cx: &Context) -> Result<Option<Predicate>, Error> {
    if comb.operator() == CombineOp::Not {
        // arity is checked at construction
        let Some(first) = comb.expressions().first() else {
            return Ok(None);
        };
        return match predicate(first, cx)? {
            Some(p) => Ok(Some(Box::new(move |record: &Record| !p(record)))),
            None => Ok(None),
        };
    }

    // children that place no condition are skipped, exactly like empty
    //  fragments in the SQL join
    let mut parts = Vec::with_capacity(comb.expressions().len());
    for item in comb.expressions() {
        if let Some(p) = predicate(item, cx)? {
            parts.push(p);
        }
    }
    if parts.is_empty() {
        return Ok(None);
    }

    let all = comb.operator() == CombineOp::And;
    Ok(Some(Box::new(move |record: &Record| {
        if all {
            parts.iter().all(|p| p(record))
        } else {
            parts.iter().any(|p| p(record))
        }
    })))
}

/// Compiles the sort keys into one record comparator. Keys whose translation
///  is empty are skipped, an unknown name fails like the SQL renderer, and
///  later keys break ties left by earlier ones.
pub fn comparator(sorts: &[Sort], cx: &Context) -> Result<Comparator, Error> {
    let mut keys: Vec<(String, ParamType, Direction)> = Vec::with_capacity(sorts.len());
    for sort in sorts {
        let key = translate::translate_name(sort.name(), cx);
        if key.is_empty() {
            continue;
        }
        let ty = cx
            .param_type(sort.name())
            .ok_or_else(|| Error::UnknownName(sort.name().to_string()))?;
        keys.push((key, ty, sort.operator()));
    }

    Ok(Box::new(move |a: &Record, b: &Record| {
        for (key, ty, direction) in &keys {
            let ord = field(a, key).coerce(*ty).compare(&field(b, key).coerce(*ty));
            let ord = match direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }))
}

/// Keeps the records matching [expr]. An expression without conditions keeps
///  everything.
pub fn filter(records: Vec<Record>, expr: &Expression, cx: &Context) -> Result<Vec<Record>, Error> {
    match predicate(expr, cx)? {
        Some(p) => Ok(records.into_iter().filter(|r| p(r)).collect()),
        None => Ok(records),
    }
}

/// Orders [records] in place by the given sort keys. The sort is stable, so
///  records that compare equal keep their relative order.
pub fn sort(records: &mut [Record], sorts: &[Sort], cx: &Context) -> Result<(), Error> {
    let cmp = comparator(sorts, cx)?;
    records.sort_by(|a, b| cmp(a, b));
    Ok(())
}

/// A missing field evaluates as null, matching what the storage returns for
///  an absent column.
fn field(record: &Record, key: &str) -> Value {
    record.get(key).cloned().unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::{Plugin, Plugins, Translations, Types};

    fn types() -> Types {
        HashMap::from([
            ("product.id".to_string(), ParamType::Int),
            ("product.code".to_string(), ParamType::Str),
            ("product.label".to_string(), ParamType::Str),
            ("product.price".to_string(), ParamType::Float),
            ("product.status".to_string(), ParamType::Bool),
            ("product.ctime".to_string(), ParamType::DateTime),
            ("hidden".to_string(), ParamType::Int),
        ])
    }

    fn record(id: i64, code: &str, label: &str, price: f64, status: bool, ctime: &str) -> Record {
        HashMap::from([
            ("product.id".to_string(), Value::Int(id)),
            ("product.code".to_string(), Value::Str(code.to_string())),
            ("product.label".to_string(), Value::Str(label.to_string())),
            ("product.price".to_string(), Value::Float(price)),
            ("product.status".to_string(), Value::Bool(status)),
            ("product.ctime".to_string(), Value::Str(ctime.to_string())),
        ])
    }

    fn fixture() -> Vec<Record> {
        vec![
            record(1, "shirt", "Shirt 50%_off", 19.99, true, "2024-01-01 08:00:00"),
            record(2, "shoes", "Sneaker", 99.90, false, "2024-03-01 09:30:00"),
            record(3, "socks", "Sneaker socks", 4.50, true, "2024-02-15 10:00:00"),
        ]
    }

    fn ids(records: &[Record]) -> Vec<i64> {
        records
            .iter()
            .map(|r| r["product.id"].to_int())
            .collect()
    }

    #[test]
    fn filter_by_comparison() {
        let types = types();
        let cx = Context::new(&types);

        let expr = crate::parser::parse("product.price < 20.0").unwrap();
        assert_eq!(vec![1, 3], ids(&filter(fixture(), &expr, &cx).unwrap()));

        let expr = crate::parser::parse("product.status == true").unwrap();
        assert_eq!(vec![1, 3], ids(&filter(fixture(), &expr, &cx).unwrap()));

        let expr = crate::parser::parse(r#"product.code == "shoes""#).unwrap();
        assert_eq!(vec![2], ids(&filter(fixture(), &expr, &cx).unwrap()));
    }

    #[test]
    fn pattern_operators_match_substrings() {
        let types = types();
        let cx = Context::new(&types);

        // the wildcard metacharacters of the SQL backends have no special
        //  meaning here
        let expr = crate::parser::parse(r#"product.label ~= "50%_off""#).unwrap();
        assert_eq!(vec![1], ids(&filter(fixture(), &expr, &cx).unwrap()));

        let expr = crate::parser::parse(r#"product.label =~ "Sneaker""#).unwrap();
        assert_eq!(vec![2, 3], ids(&filter(fixture(), &expr, &cx).unwrap()));
    }

    #[test]
    fn combinations_nest() {
        let types = types();
        let cx = Context::new(&types);

        let expr =
            crate::parser::parse(r#"product.status == true && product.price > 10.0"#).unwrap();
        assert_eq!(vec![1], ids(&filter(fixture(), &expr, &cx).unwrap()));

        let expr = crate::parser::parse(
            r#"!(product.label =~ "Sneaker") || product.price < 5.0"#,
        )
        .unwrap();
        assert_eq!(vec![1, 3], ids(&filter(fixture(), &expr, &cx).unwrap()));
    }

    #[test]
    fn list_and_null_terms() {
        let types = types();
        let cx = Context::new(&types);

        let expr = crate::parser::parse("product.id == [1,3]").unwrap();
        assert_eq!(vec![1, 3], ids(&filter(fixture(), &expr, &cx).unwrap()));

        let expr = crate::parser::parse("product.id != [1,3]").unwrap();
        assert_eq!(vec![2], ids(&filter(fixture(), &expr, &cx).unwrap()));

        // no record carries this field, so it evaluates as null
        let expr = crate::parser::parse("hidden == null").unwrap();
        assert_eq!(vec![1, 2, 3], ids(&filter(fixture(), &expr, &cx).unwrap()));
        let expr = crate::parser::parse("hidden != null").unwrap();
        assert!(filter(fixture(), &expr, &cx).unwrap().is_empty());
    }

    #[test]
    fn datetime_comparison_is_chronological() {
        let types = types();
        let cx = Context::new(&types);

        let expr =
            crate::parser::parse(r#"product.ctime >= "2024-02-01 00:00:00""#).unwrap();
        assert_eq!(vec![2, 3], ids(&filter(fixture(), &expr, &cx).unwrap()));
    }

    #[test]
    fn no_condition_keeps_everything() {
        let types = types();
        let cx = Context::new(&types);

        let expr = Expression::Combine(Combine::new(CombineOp::And, vec![]).unwrap());
        assert!(predicate(&expr, &cx).unwrap().is_none());
        assert_eq!(3, filter(fixture(), &expr, &cx).unwrap().len());
    }

    #[test]
    fn untranslatable_comparison_places_no_condition() {
        let types = types();
        let translations: Translations =
            HashMap::from([("product.code".to_string(), String::new())]);
        let cx = Context::new(&types).translations(&translations);

        let expr = crate::parser::parse(r#"product.code == "shoes""#).unwrap();
        assert!(predicate(&expr, &cx).unwrap().is_none());
    }

    #[test]
    fn plugins_transform_values_before_comparison() {
        let types = types();
        let to_status = |value: &Value| -> Value {
            match value {
                Value::Str(s) if s == "online" => Value::Bool(true),
                Value::Str(_) => Value::Bool(false),
                other => other.clone(),
            }
        };
        let plugins: Plugins =
            HashMap::from([("product.status".to_string(), &to_status as &dyn Plugin)]);
        let cx = Context::new(&types).plugins(&plugins);

        let expr = crate::parser::parse(r#"product.status == "online""#).unwrap();
        assert_eq!(vec![1, 3], ids(&filter(fixture(), &expr, &cx).unwrap()));
    }

    #[test]
    fn unknown_name_fails_fast() {
        let types = types();
        let cx = Context::new(&types);

        let expr = crate::parser::parse("no.such.field == 1").unwrap();
        match predicate(&expr, &cx) {
            Err(Error::UnknownName(name)) => assert_eq!("no.such.field", name),
            other => panic!("expected an unknown name error, got {:?}", other.map(|_| ())),
        }

        let sorts = crate::parser::parse_sort("no.such.field").unwrap();
        assert_eq!(
            Some(Error::UnknownName("no.such.field".to_string())),
            comparator(&sorts, &cx).err()
        );
    }

    #[test]
    fn sorting_records() {
        let types = types();
        let cx = Context::new(&types);

        let mut records = fixture();
        let sorts = crate::parser::parse_sort("-product.price").unwrap();
        sort(&mut records, &sorts, &cx).unwrap();
        assert_eq!(vec![2, 1, 3], ids(&records));

        let sorts = crate::parser::parse_sort("product.status,product.code").unwrap();
        sort(&mut records, &sorts, &cx).unwrap();
        assert_eq!(vec![2, 1, 3], ids(&records));

        let sorts = crate::parser::parse_sort("-product.ctime").unwrap();
        sort(&mut records, &sorts, &cx).unwrap();
        assert_eq!(vec![2, 3, 1], ids(&records));
    }
}
