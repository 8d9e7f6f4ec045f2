//! Update operators embedded in query documents.

use super::matcher::{number, values_equal};
use bson::{Bson, Document};
use ejdb_sys::{JBEQERROR, JBEQINOPNOTARRAY};
use std::ffi::c_int;

#[derive(Debug, Clone, Default)]
pub(crate) struct Update {
    set: Option<Document>,
    pub(crate) upsert: Option<Document>,
    inc: Option<Document>,
    pub(crate) dropall: bool,
    add_to_set: Option<Document>,
    add_to_set_all: Option<Document>,
    pull: Option<Document>,
    pull_all: Option<Document>,
}

impl Update {
    /// Records `key` if it is an update operator. Returns false for any
    /// other control key.
    pub(crate) fn parse(&mut self, key: &str, value: &Bson) -> Result<bool, c_int> {
        let slot = match key {
            "$dropall" => {
                self.dropall = !matches!(value, Bson::Boolean(false));
                return Ok(true);
            }
            "$set" => &mut self.set,
            "$upsert" => &mut self.upsert,
            "$inc" => &mut self.inc,
            "$addToSet" => &mut self.add_to_set,
            "$addToSetAll" => &mut self.add_to_set_all,
            "$pull" => &mut self.pull,
            "$pullAll" => &mut self.pull_all,
            _ => return Ok(false),
        };
        let Bson::Document(fields) = value else {
            return Err(JBEQERROR);
        };
        match key {
            "$inc" if fields.values().any(|v| number(v).is_none()) => return Err(JBEQERROR),
            "$addToSetAll" | "$pullAll" if fields.values().any(|v| !matches!(v, Bson::Array(_))) => {
                return Err(JBEQINOPNOTARRAY)
            }
            _ => {}
        }
        *slot = Some(fields.clone());
        Ok(true)
    }

    pub(crate) fn is_empty(&self) -> bool {
        !self.dropall
            && self.set.is_none()
            && self.upsert.is_none()
            && self.inc.is_none()
            && self.add_to_set.is_none()
            && self.add_to_set_all.is_none()
            && self.pull.is_none()
            && self.pull_all.is_none()
    }

    /// Applies every field-level operator to `doc`. `$dropall` is handled
    /// by the caller.
    pub(crate) fn apply(&self, doc: &mut Document) {
        for fields in [&self.set, &self.upsert].into_iter().flatten() {
            for (path, value) in fields {
                set_path(doc, path, value.clone());
            }
        }
        if let Some(fields) = &self.inc {
            for (path, delta) in fields {
                let current = get_path_mut(doc, path);
                let next = match current.as_deref() {
                    Some(Bson::Int32(n)) => match delta {
                        Bson::Int32(d) => Bson::Int32(n.wrapping_add(*d)),
                        Bson::Int64(d) => Bson::Int64(i64::from(*n).wrapping_add(*d)),
                        _ => Bson::Double(f64::from(*n) + number(delta).unwrap_or(0.0)),
                    },
                    Some(Bson::Int64(n)) => match delta {
                        Bson::Int32(d) => Bson::Int64(n.wrapping_add(i64::from(*d))),
                        Bson::Int64(d) => Bson::Int64(n.wrapping_add(*d)),
                        _ => Bson::Double(*n as f64 + number(delta).unwrap_or(0.0)),
                    },
                    Some(Bson::Double(n)) => Bson::Double(n + number(delta).unwrap_or(0.0)),
                    Some(_) => continue,
                    None => delta.clone(),
                };
                set_path(doc, path, next);
            }
        }
        if let Some(fields) = &self.add_to_set {
            for (path, value) in fields {
                add_to_set(doc, path, std::slice::from_ref(value));
            }
        }
        if let Some(fields) = &self.add_to_set_all {
            for (path, values) in fields {
                if let Bson::Array(values) = values {
                    add_to_set(doc, path, values);
                }
            }
        }
        if let Some(fields) = &self.pull {
            for (path, value) in fields {
                pull(doc, path, std::slice::from_ref(value));
            }
        }
        if let Some(fields) = &self.pull_all {
            for (path, values) in fields {
                if let Bson::Array(values) = values {
                    pull(doc, path, values);
                }
            }
        }
    }
}

fn add_to_set(doc: &mut Document, path: &str, values: &[Bson]) {
    match get_path_mut(doc, path) {
        Some(Bson::Array(items)) => {
            for value in values {
                if !items.iter().any(|i| values_equal(i, value)) {
                    items.push(value.clone());
                }
            }
        }
        Some(_) => {}
        None => {
            let mut items: Vec<Bson> = Vec::new();
            for value in values {
                if !items.iter().any(|i| values_equal(i, value)) {
                    items.push(value.clone());
                }
            }
            set_path(doc, path, Bson::Array(items));
        }
    }
}

fn pull(doc: &mut Document, path: &str, values: &[Bson]) {
    if let Some(Bson::Array(items)) = get_path_mut(doc, path) {
        items.retain(|i| !values.iter().any(|v| values_equal(i, v)));
    }
}

fn get_path_mut<'a>(doc: &'a mut Document, path: &str) -> Option<&'a mut Bson> {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    let value = doc.get_mut(head)?;
    match rest {
        None => Some(value),
        Some(rest) => match value {
            Bson::Document(inner) => get_path_mut(inner, rest),
            _ => None,
        },
    }
}

/// Sets a dotted path, creating intermediate documents as needed.
fn set_path(doc: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(doc.get(head), Some(Bson::Document(_))) {
                doc.insert(head, Document::new());
            }
            if let Some(Bson::Document(inner)) = doc.get_mut(head) {
                set_path(inner, rest, value);
            }
        }
    }
}
