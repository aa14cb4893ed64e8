//! Dotted-path field extraction and the total order over `Bson` values,
//! duplicated from `laura-engine::value` since this crate has no
//! dependency on `laura-engine` (the query grammar is a standalone data
//! model shared between the planner and the façade, both downstream of
//! this crate). Kept in lockstep by construction: both copies implement
//! the same ordering rules.

use std::cmp::Ordering;

use bson::{Bson, Document};

pub fn extract<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = doc.get(first)?;
    for seg in segments {
        match current {
            Bson::Document(d) => current = d.get(seg)?,
            _ => return None,
        }
    }
    Some(current)
}

fn type_rank(v: &Bson) -> u8 {
    match v {
        Bson::Null => 0,
        Bson::Boolean(_) => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => 2,
        Bson::String(_) => 3,
        Bson::DateTime(_) => 4,
        Bson::Array(_) => 5,
        _ => 6,
    }
}

fn as_f64(v: &Bson) -> Option<f64> {
    match v {
        Bson::Int32(n) => Some(*n as f64),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

pub fn compare_values(a: &Bson, b: &Bson) -> Ordering {
    let (ra, rb) = (type_rank(a), type_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    match (a, b) {
        (Bson::Null, Bson::Null) => Ordering::Equal,
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.timestamp_millis().cmp(&y.timestamp_millis()),
        (Bson::Array(x), Bson::Array(y)) => compare_arrays(x, y),
        _ => {
            let (fa, fb) = (as_f64(a).unwrap_or(f64::NAN), as_f64(b).unwrap_or(f64::NAN));
            compare_f64_nan_eq(fa, fb)
        }
    }
}

fn compare_arrays(a: &[Bson], b: &[Bson]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        let ord = compare_values(x, y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

fn compare_f64_nan_eq(a: f64, b: f64) -> Ordering {
    if a.is_nan() && b.is_nan() {
        return Ordering::Equal;
    }
    if a.is_nan() {
        return Ordering::Greater;
    }
    if b.is_nan() {
        return Ordering::Less;
    }
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

pub fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_width_numbers_compare_numerically() {
        assert_eq!(compare_values(&Bson::Int32(20), &Bson::Double(20.0)), Ordering::Equal);
    }

    #[test]
    fn values_equal_numeric_normalization() {
        assert!(values_equal(&Bson::Int32(20), &Bson::Double(20.0)));
    }
}
