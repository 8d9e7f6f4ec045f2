//! Query compilation and record matching.

use super::update::Update;
use bson::{Bson, Document};
use ejdb_sys::{JBEQACTKEY, JBEQERROR, JBEQINOPNOTARRAY, JBEQINVALIDQCONTROL};
use std::cmp::Ordering;
use std::ffi::c_int;

/// A compiled filter document.
#[derive(Debug, Clone, Default)]
pub(crate) struct Query {
    conds: Vec<(String, Cond)>,
    pub(crate) update: Update,
}

#[derive(Debug, Clone)]
enum Cond {
    Eq(Bson),
    Not(Box<Cond>),
    Begin(String),
    Cmp(CmpOp, f64),
    Between(f64, f64),
    In(Vec<Bson>),
    Nin(Vec<Bson>),
    StrAnd(Vec<String>),
    StrOr(Vec<String>),
    Exists(bool),
    Icase(Box<Cond>),
    ElemMatch(Box<Query>),
    All(Vec<Cond>),
}

#[derive(Debug, Clone, Copy)]
enum CmpOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Query {
    /// Compiles a filter document, returning the engine error code on failure.
    pub(crate) fn compile(doc: &Document) -> Result<Self, c_int> {
        let mut query = Query::default();
        for (key, value) in doc {
            if let Some(op) = key.strip_prefix('$') {
                if op == "do" {
                    check_do(value)?;
                } else if !query.update.parse(key, value)? {
                    return Err(JBEQINVALIDQCONTROL);
                }
                continue;
            }
            query.conds.push((key.clone(), compile_cond(value)?));
        }
        Ok(query)
    }

    /// Returns true if every condition holds for `doc`.
    pub(crate) fn matches(&self, doc: &Document) -> bool {
        self.conds
            .iter()
            .all(|(path, cond)| cond.matches(&lookup(doc, path)))
    }
}

/// `$do` blocks only accept `$join` actions. Joins themselves are not
/// resolved by this engine.
fn check_do(value: &Bson) -> Result<(), c_int> {
    let Bson::Document(actions) = value else {
        return Err(JBEQERROR);
    };
    for (_, action) in actions {
        match action {
            Bson::Document(a) if a.keys().all(|k| k == "$join") => {}
            _ => return Err(JBEQACTKEY),
        }
    }
    Ok(())
}

fn compile_cond(value: &Bson) -> Result<Cond, c_int> {
    match value {
        Bson::Document(ops) if ops.keys().next().is_some_and(|k| k.starts_with('$')) => {
            let mut conds = ops
                .iter()
                .map(|(op, arg)| compile_op(op, arg))
                .collect::<Result<Vec<_>, _>>()?;
            if conds.len() == 1 {
                Ok(conds.remove(0))
            } else {
                Ok(Cond::All(conds))
            }
        }
        other => Ok(Cond::Eq(other.clone())),
    }
}

fn compile_op(op: &str, arg: &Bson) -> Result<Cond, c_int> {
    let cond = match op {
        "$not" => Cond::Not(Box::new(compile_cond(arg)?)),
        "$begin" => match arg {
            Bson::String(prefix) => Cond::Begin(prefix.clone()),
            _ => return Err(JBEQERROR),
        },
        "$gt" => Cond::Cmp(CmpOp::Gt, number(arg).ok_or(JBEQERROR)?),
        "$gte" => Cond::Cmp(CmpOp::Gte, number(arg).ok_or(JBEQERROR)?),
        "$lt" => Cond::Cmp(CmpOp::Lt, number(arg).ok_or(JBEQERROR)?),
        "$lte" => Cond::Cmp(CmpOp::Lte, number(arg).ok_or(JBEQERROR)?),
        "$bt" => {
            let items = array(arg)?;
            match items.as_slice() {
                [lo, hi] => Cond::Between(
                    number(lo).ok_or(JBEQERROR)?,
                    number(hi).ok_or(JBEQERROR)?,
                ),
                _ => return Err(JBEQINOPNOTARRAY),
            }
        }
        "$in" => Cond::In(array(arg)?.clone()),
        "$nin" => Cond::Nin(array(arg)?.clone()),
        "$strand" => Cond::StrAnd(strings(arg)?),
        "$stror" => Cond::StrOr(strings(arg)?),
        "$exists" => match arg {
            Bson::Boolean(b) => Cond::Exists(*b),
            other => Cond::Exists(number(other).is_some_and(|n| n != 0.0)),
        },
        "$icase" => match arg {
            Bson::String(s) => Cond::Icase(Box::new(Cond::Eq(Bson::String(s.to_lowercase())))),
            Bson::Document(inner) => match inner.get("$in") {
                Some(list) => Cond::Icase(Box::new(Cond::In(
                    array(list)?.iter().map(lowercase).collect(),
                ))),
                None => return Err(JBEQERROR),
            },
            _ => return Err(JBEQERROR),
        },
        "$elemMatch" => match arg {
            Bson::Document(sub) => {
                let sub = Query::compile(sub)?;
                if !sub.update.is_empty() {
                    return Err(JBEQINVALIDQCONTROL);
                }
                Cond::ElemMatch(Box::new(sub))
            }
            _ => return Err(JBEQERROR),
        },
        _ => return Err(JBEQINVALIDQCONTROL),
    };
    Ok(cond)
}

fn array(arg: &Bson) -> Result<&Vec<Bson>, c_int> {
    match arg {
        Bson::Array(items) => Ok(items),
        _ => Err(JBEQINOPNOTARRAY),
    }
}

fn strings(arg: &Bson) -> Result<Vec<String>, c_int> {
    array(arg)?
        .iter()
        .map(|item| match item {
            Bson::String(s) => Ok(s.clone()),
            _ => Err(JBEQERROR),
        })
        .collect()
}

fn lowercase(value: &Bson) -> Bson {
    match value {
        Bson::String(s) => Bson::String(s.to_lowercase()),
        other => other.clone(),
    }
}

impl Cond {
    fn matches(&self, values: &[&Bson]) -> bool {
        match self {
            Cond::Exists(expected) => !values.is_empty() == *expected,
            Cond::Not(inner) => !inner.matches(values),
            Cond::Nin(list) => !Cond::In(list.clone()).matches(values),
            Cond::All(conds) => conds.iter().all(|c| c.matches(values)),
            Cond::Icase(inner) => {
                let lowered: Vec<Bson> = values.iter().map(|v| lowercase_deep(v)).collect();
                inner.matches(&lowered.iter().collect::<Vec<_>>())
            }
            _ => values.iter().any(|v| self.test(v)),
        }
    }

    /// Tests a single resolved value. Arrays match when any element does.
    fn test(&self, value: &Bson) -> bool {
        match self {
            Cond::Eq(target) => {
                values_equal(value, target)
                    || matches!(value, Bson::Array(items) if items.iter().any(|i| values_equal(i, target)))
            }
            Cond::In(list) => match value {
                Bson::Array(items) => items
                    .iter()
                    .any(|i| list.iter().any(|t| values_equal(i, t))),
                _ => list.iter().any(|t| values_equal(value, t)),
            },
            Cond::Begin(prefix) => match value {
                Bson::String(s) => s.starts_with(prefix.as_str()),
                Bson::Array(items) => items.iter().any(|i| self.test(i)),
                _ => false,
            },
            Cond::Cmp(op, bound) => match value {
                Bson::Array(items) => items.iter().any(|i| self.test(i)),
                _ => number(value).is_some_and(|n| match op {
                    CmpOp::Gt => n > *bound,
                    CmpOp::Gte => n >= *bound,
                    CmpOp::Lt => n < *bound,
                    CmpOp::Lte => n <= *bound,
                }),
            },
            Cond::Between(lo, hi) => match value {
                Bson::Array(items) => items.iter().any(|i| self.test(i)),
                _ => number(value).is_some_and(|n| n >= *lo && n <= *hi),
            },
            Cond::StrAnd(wanted) => {
                let tokens = tokens(value);
                wanted.iter().all(|w| tokens.contains(&w.as_str()))
            }
            Cond::StrOr(wanted) => {
                let tokens = tokens(value);
                wanted.iter().any(|w| tokens.contains(&w.as_str()))
            }
            Cond::ElemMatch(sub) => match value {
                Bson::Array(items) => items
                    .iter()
                    .any(|i| matches!(i, Bson::Document(d) if sub.matches(d))),
                _ => false,
            },
            Cond::Exists(_) | Cond::Not(_) | Cond::Nin(_) | Cond::All(_) | Cond::Icase(_) => {
                self.matches(&[value])
            }
        }
    }
}

fn lowercase_deep(value: &Bson) -> Bson {
    match value {
        Bson::Array(items) => Bson::Array(items.iter().map(lowercase).collect()),
        other => lowercase(other),
    }
}

/// Splits a string on whitespace and commas, or collects an array of strings.
fn tokens(value: &Bson) -> Vec<&str> {
    match value {
        Bson::String(s) => s
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
            .collect(),
        Bson::Array(items) => items
            .iter()
            .filter_map(|i| match i {
                Bson::String(s) => Some(s.as_str()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Resolves a dotted field path. Arrays are indexed by position, or fanned
/// out over their document elements.
pub(crate) fn lookup<'a>(doc: &'a Document, path: &str) -> Vec<&'a Bson> {
    let parts: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    collect_doc(doc, &parts, &mut out);
    out
}

fn collect_doc<'a>(doc: &'a Document, parts: &[&str], out: &mut Vec<&'a Bson>) {
    if let Some((head, rest)) = parts.split_first() {
        if let Some(value) = doc.get(*head) {
            collect_value(value, rest, out);
        }
    }
}

fn collect_value<'a>(value: &'a Bson, parts: &[&str], out: &mut Vec<&'a Bson>) {
    if parts.is_empty() {
        out.push(value);
        return;
    }
    match value {
        Bson::Document(doc) => collect_doc(doc, parts, out),
        Bson::Array(items) => {
            if let Ok(pos) = parts[0].parse::<usize>() {
                if let Some(item) = items.get(pos) {
                    collect_value(item, &parts[1..], out);
                }
            } else {
                for item in items {
                    if let Bson::Document(doc) = item {
                        collect_doc(doc, parts, out);
                    }
                }
            }
        }
        _ => {}
    }
}

pub(crate) fn number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

/// Equality with numeric types unified.
pub(crate) fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (number(a), number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Sort order for `$orderby`: missing values first, then numbers, then
/// strings, then everything else.
pub(crate) fn compare(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    fn rank(v: Option<&Bson>) -> u8 {
        match v {
            None | Some(Bson::Null) => 0,
            Some(v) if number(v).is_some() => 1,
            Some(Bson::String(_)) => 2,
            Some(_) => 3,
        }
    }
    match (a, b) {
        (Some(Bson::String(x)), Some(Bson::String(y))) => x.cmp(y),
        (Some(x), Some(y)) => match (number(x), number(y)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => rank(a).cmp(&rank(b)),
        },
        _ => rank(a).cmp(&rank(b)),
    }
}
