use std::fmt;
use std::slice::Iter;

use ordered_float::OrderedFloat;

use crate::SharedString;

/// The declared type of a label value.
///
/// Grouped metrics carry a schema that fixes, per label name, which of these
/// types the value must have.  The schema is checked on every cell access.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum LabelKind {
    /// A string value.
    String,
    /// A signed 64-bit integer value.
    Int,
    /// A boolean value.
    Bool,
    /// A 64-bit floating point value.
    Float,
}

impl LabelKind {
    /// Human-readable name of this kind, as used in log output.
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelKind::String => "string",
            LabelKind::Int => "int",
            LabelKind::Bool => "bool",
            LabelKind::Float => "float",
        }
    }
}

/// A label value.
///
/// Label values are drawn from a closed set of types.  Floats are wrapped in
/// [`OrderedFloat`] so that label sets have total equality, ordering, and
/// hashing, which lets them serve as map keys.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum LabelValue {
    /// A string value.
    Str(SharedString),
    /// A signed 64-bit integer value.
    Int(i64),
    /// A boolean value.
    Bool(bool),
    /// A 64-bit floating point value.
    Float(OrderedFloat<f64>),
}

impl LabelValue {
    /// The [`LabelKind`] this value satisfies.
    pub fn kind(&self) -> LabelKind {
        match self {
            LabelValue::Str(_) => LabelKind::String,
            LabelValue::Int(_) => LabelKind::Int,
            LabelValue::Bool(_) => LabelKind::Bool,
            LabelValue::Float(_) => LabelKind::Float,
        }
    }
}

impl fmt::Display for LabelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelValue::Str(v) => f.write_str(v),
            LabelValue::Int(v) => write!(f, "{}", v),
            LabelValue::Bool(v) => write!(f, "{}", v),
            LabelValue::Float(v) => write!(f, "{:?}", v.into_inner()),
        }
    }
}

impl From<&'static str> for LabelValue {
    fn from(v: &'static str) -> LabelValue {
        LabelValue::Str(SharedString::from(v))
    }
}

impl From<String> for LabelValue {
    fn from(v: String) -> LabelValue {
        LabelValue::Str(SharedString::from(v))
    }
}

impl From<i64> for LabelValue {
    fn from(v: i64) -> LabelValue {
        LabelValue::Int(v)
    }
}

impl From<i32> for LabelValue {
    fn from(v: i32) -> LabelValue {
        LabelValue::Int(i64::from(v))
    }
}

impl From<bool> for LabelValue {
    fn from(v: bool) -> LabelValue {
        LabelValue::Bool(v)
    }
}

impl From<f64> for LabelValue {
    fn from(v: f64) -> LabelValue {
        LabelValue::Float(OrderedFloat(v))
    }
}

/// A label: a key/value pair attached to a cell.
///
/// Labels differentiate the context a measurement was taken in.  In a web
/// service, for example, a request counter might be labeled with the request
/// path being processed, or the response code that was returned.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Label(pub(crate) SharedString, pub(crate) LabelValue);

impl Label {
    /// Creates a [`Label`] from a key and value.
    pub fn new<K, V>(key: K, value: V) -> Self
    where
        K: Into<SharedString>,
        V: Into<LabelValue>,
    {
        Label(key.into(), value.into())
    }

    /// Key of this label.
    pub fn key(&self) -> &str {
        self.0.as_ref()
    }

    /// Value of this label.
    pub fn value(&self) -> &LabelValue {
        &self.1
    }
}

/// A set of labels, canonically ordered by label key.
///
/// Keys are unique within a set; when duplicate keys are supplied, the last
/// value given wins.  Equality is structural, and the canonical ordering makes
/// formatted output deterministic.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct LabelSet {
    labels: Vec<Label>,
}

impl LabelSet {
    /// Creates an empty [`LabelSet`].
    pub fn empty() -> LabelSet {
        LabelSet { labels: Vec::new() }
    }

    /// Creates a [`LabelSet`] from key/value pairs.
    ///
    /// The pairs are sorted into canonical key order, and duplicate keys are
    /// collapsed down to the last value supplied.
    pub fn from_pairs<I, K, V>(pairs: I) -> LabelSet
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<SharedString>,
        V: Into<LabelValue>,
    {
        let mut labels: Vec<Label> =
            pairs.into_iter().map(|(k, v)| Label(k.into(), v.into())).collect();
        labels.sort_by(|a, b| a.0.cmp(&b.0));
        labels.dedup_by(|duplicate, kept| {
            if duplicate.0 == kept.0 {
                kept.1 = duplicate.1.clone();
                true
            } else {
                false
            }
        });
        LabelSet { labels }
    }

    /// Number of labels in this set.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether this set has no labels.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Iterates the labels in canonical key order.
    pub fn iter(&self) -> Iter<'_, Label> {
        self.labels.iter()
    }

    /// Looks up the value for a label key.
    pub fn get(&self, key: &str) -> Option<&LabelValue> {
        self.labels.iter().find(|label| label.key() == key).map(Label::value)
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for label in &self.labels {
            if first {
                first = false;
            } else {
                f.write_str(",")?;
            }
            write!(f, "{}={}", label.key(), label.value())?;
        }
        Ok(())
    }
}

/// A value that can be converted into a [`LabelSet`].
pub trait IntoLabels {
    /// Consumes this value, turning it into a [`LabelSet`].
    fn into_labels(self) -> LabelSet;
}

impl IntoLabels for LabelSet {
    fn into_labels(self) -> LabelSet {
        self
    }
}

impl IntoLabels for &LabelSet {
    fn into_labels(self) -> LabelSet {
        self.clone()
    }
}

impl IntoLabels for () {
    fn into_labels(self) -> LabelSet {
        LabelSet::empty()
    }
}

impl<K, V, const N: usize> IntoLabels for [(K, V); N]
where
    K: Into<SharedString>,
    V: Into<LabelValue>,
{
    fn into_labels(self) -> LabelSet {
        LabelSet::from_pairs(self)
    }
}

impl<K, V> IntoLabels for Vec<(K, V)>
where
    K: Into<SharedString>,
    V: Into<LabelValue>,
{
    fn into_labels(self) -> LabelSet {
        LabelSet::from_pairs(self)
    }
}

/// Constructs a [`LabelSet`] from `key => value` pairs.
///
/// ```
/// # use tally::labels;
/// let labels = labels! { "action" => "get", "response_code" => 404 };
/// assert_eq!(labels.len(), 2);
/// ```
#[macro_export]
macro_rules! labels {
    () => { $crate::LabelSet::empty() };
    ($($key:expr => $value:expr),+ $(,)?) => {
        $crate::LabelSet::from_pairs([
            $(($crate::SharedString::from($key), $crate::LabelValue::from($value))),+
        ])
    };
}

/// The label schema of a grouped metric.
///
/// Declares the exact set of label names a cell access must supply, and the
/// value type each one must carry.  Entries are held in canonical key order.
#[derive(Clone, Debug)]
pub struct LabelSchema {
    entries: Vec<(SharedString, LabelKind)>,
}

impl LabelSchema {
    /// Creates a [`LabelSchema`] from `(name, kind)` entries.
    pub fn from_entries<I, K>(entries: I) -> LabelSchema
    where
        I: IntoIterator<Item = (K, LabelKind)>,
        K: Into<SharedString>,
    {
        let mut entries: Vec<(SharedString, LabelKind)> =
            entries.into_iter().map(|(name, kind)| (name.into(), kind)).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.dedup_by(|duplicate, kept| duplicate.0 == kept.0);
        LabelSchema { entries }
    }

    /// Iterates the declared label names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_ref())
    }

    /// Checks a label assignment against this schema.
    ///
    /// The assignment must supply exactly the declared names, and each value
    /// must satisfy its declared kind.  Both sides are in canonical key order,
    /// so a single merge walk covers every mismatch case.
    pub(crate) fn validate(&self, labels: &LabelSet) -> Result<(), SchemaMismatch> {
        let mut declared = self.entries.iter().peekable();
        let mut supplied = labels.iter().peekable();

        loop {
            match (declared.peek(), supplied.peek()) {
                (None, None) => return Ok(()),
                (Some((name, _)), None) => {
                    return Err(SchemaMismatch::Missing { name: name.clone() })
                }
                (None, Some(label)) => {
                    return Err(SchemaMismatch::Unexpected { name: label.0.clone() })
                }
                (Some((name, kind)), Some(label)) => match name.as_ref().cmp(label.key()) {
                    std::cmp::Ordering::Less => {
                        return Err(SchemaMismatch::Missing { name: name.clone() })
                    }
                    std::cmp::Ordering::Greater => {
                        return Err(SchemaMismatch::Unexpected { name: label.0.clone() })
                    }
                    std::cmp::Ordering::Equal => {
                        if label.value().kind() != *kind {
                            return Err(SchemaMismatch::WrongKind {
                                name: name.clone(),
                                expected: *kind,
                                found: label.value().kind(),
                            });
                        }
                        declared.next();
                        supplied.next();
                    }
                },
            }
        }
    }
}

/// Why a label assignment failed schema validation.
#[derive(Clone, Debug)]
pub(crate) enum SchemaMismatch {
    Missing { name: SharedString },
    Unexpected { name: SharedString },
    WrongKind { name: SharedString, expected: LabelKind, found: LabelKind },
}

impl fmt::Display for SchemaMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaMismatch::Missing { name } => {
                write!(f, "required label `{}` was not supplied", name)
            }
            SchemaMismatch::Unexpected { name } => {
                write!(f, "label `{}` is not declared by the metric", name)
            }
            SchemaMismatch::WrongKind { name, expected, found } => write!(
                f,
                "label `{}` has kind {} but the metric declares {}",
                name,
                found.as_str(),
                expected.as_str()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LabelKind, LabelSchema, LabelSet, LabelValue, SchemaMismatch};

    #[test]
    fn test_canonical_order() {
        let labels = labels! { "zone" => "us-east", "action" => "get", "code" => 503 };
        let keys: Vec<&str> = labels.iter().map(|l| l.key()).collect();
        assert_eq!(keys, vec!["action", "code", "zone"]);
    }

    #[test]
    fn test_duplicate_keys_last_wins() {
        let labels = LabelSet::from_pairs([("action", "get"), ("action", "put")]);
        assert_eq!(labels.len(), 1);
        assert_eq!(labels.get("action"), Some(&LabelValue::from("put")));
    }

    #[test]
    fn test_structural_equality() {
        let a = labels! { "action" => "get", "code" => 404 };
        let b = LabelSet::from_pairs(vec![
            ("code".to_string(), LabelValue::from(404)),
            ("action".to_string(), LabelValue::from("get")),
        ]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_schema_accepts_exact_match() {
        let schema = LabelSchema::from_entries([
            ("action", LabelKind::String),
            ("response_code", LabelKind::Int),
        ]);
        let labels = labels! { "action" => "get", "response_code" => 404 };
        assert!(schema.validate(&labels).is_ok());
    }

    #[test]
    fn test_schema_rejects_missing_label() {
        let schema = LabelSchema::from_entries([("action", LabelKind::String)]);
        let result = schema.validate(&LabelSet::empty());
        assert!(matches!(result, Err(SchemaMismatch::Missing { .. })));
    }

    #[test]
    fn test_schema_rejects_extra_label() {
        let schema = LabelSchema::from_entries([("action", LabelKind::String)]);
        let labels = labels! { "action" => "get", "unknown" => "x" };
        assert!(matches!(schema.validate(&labels), Err(SchemaMismatch::Unexpected { .. })));
    }

    #[test]
    fn test_schema_rejects_wrong_kind() {
        let schema = LabelSchema::from_entries([("response_code", LabelKind::Int)]);
        let labels = labels! { "response_code" => "404" };
        assert!(matches!(schema.validate(&labels), Err(SchemaMismatch::WrongKind { .. })));
    }

    #[test]
    fn test_label_value_display() {
        assert_eq!(LabelValue::from("get").to_string(), "get");
        assert_eq!(LabelValue::from(404).to_string(), "404");
        assert_eq!(LabelValue::from(true).to_string(), "true");
        assert_eq!(LabelValue::from(2.5).to_string(), "2.5");
        assert_eq!(LabelValue::from(1.0).to_string(), "1.0");
    }
}
