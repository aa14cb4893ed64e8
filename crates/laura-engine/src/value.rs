//! Field extraction and the total order over index keys.
//!
//! Documents are represented with `bson::Document`/`bson::Bson` — a tagged
//! variant that already matches the data model's null/bool/i64/f64/string/
//! time/array/document shape and preserves field insertion order, so it
//! doubles as both the in-memory document representation and the wire
//! format for the document store (see `crate::codec`).

use std::cmp::Ordering;

use bson::{Bson, Document};

/// Extract a field's value by dotted path (`"address.city"`). Returns
/// `None` if any segment is absent or not traversable (e.g. reaching a
/// scalar before the path is exhausted).
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

/// Ordering rank for top-level value kinds:
/// null < bool < number < string < time < array (documents sort last —
/// not reachable as an index key in practice, since indexes key on
/// scalar/array field values, but given a total order for completeness).
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

/// Total order over `Bson` values used as index keys.
///
/// Numbers of mixed width compare as floats; per the documented quirk,
/// NaN is treated as equal to NaN for index placement (so a NaN key has
/// one stable slot rather than being unreachable or duplicated).
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

/// Newtype giving `Bson` the total order above, so it can key a sorted
/// container such as a `BTreeMap`.
#[derive(Debug, Clone)]
pub struct IndexKey(pub Bson);

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        compare_values(&self.0, &other.0) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_values(&self.0, &other.0)
    }
}

/// Equality used by update-operator array semantics: scalars
/// compare by normalized numeric value when both sides are numeric (so
/// `20` equals `20.0`), strings compare by bytes, other values compare
/// structurally.
pub fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn extract_top_level() {
        let d = doc! { "name": "alice", "age": 30 };
        assert_eq!(extract(&d, "name"), Some(&Bson::String("alice".into())));
    }

    #[test]
    fn extract_dotted_path() {
        let d = doc! { "address": { "city": "nyc" } };
        assert_eq!(extract(&d, "address.city"), Some(&Bson::String("nyc".into())));
    }

    #[test]
    fn extract_missing_segment() {
        let d = doc! { "address": { "city": "nyc" } };
        assert_eq!(extract(&d, "address.zip"), None);
    }

    #[test]
    fn extract_through_scalar_fails() {
        let d = doc! { "age": 30 };
        assert_eq!(extract(&d, "age.sub"), None);
    }

    #[test]
    fn type_ordering_follows_total_order() {
        assert!(compare_values(&Bson::Null, &Bson::Boolean(false)) == Ordering::Less);
        assert!(compare_values(&Bson::Boolean(true), &Bson::Int32(0)) == Ordering::Less);
        assert!(compare_values(&Bson::Int32(100), &Bson::String("a".into())) == Ordering::Less);
        assert!(
            compare_values(
                &Bson::String("z".into()),
                &Bson::DateTime(bson::DateTime::from_millis(0))
            ) == Ordering::Less
        );
    }

    #[test]
    fn mixed_width_numbers_compare_numerically() {
        assert_eq!(compare_values(&Bson::Int32(20), &Bson::Double(20.0)), Ordering::Equal);
        assert_eq!(compare_values(&Bson::Int64(5), &Bson::Double(6.0)), Ordering::Less);
    }

    #[test]
    fn nan_equals_nan_for_index_placement() {
        let nan = Bson::Double(f64::NAN);
        assert_eq!(compare_values(&nan, &nan), Ordering::Equal);
    }

    #[test]
    fn values_equal_numeric_normalization() {
        assert!(values_equal(&Bson::Int32(20), &Bson::Double(20.0)));
        assert!(!values_equal(&Bson::String("20".into()), &Bson::Int32(20)));
    }
}
