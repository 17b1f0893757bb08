use std::cmp::Ordering;

use serde_json::Value;

use super::{CollectionPath, Document};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq { field: String, value: Value },
    ArrayContains { field: String, value: Value },
}

impl Filter {
    fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::Eq { field, value } => doc.data.get(field) == Some(value),
            Filter::ArrayContains { field, value } => doc
                .data
                .get(field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Window {
    First(usize),
    Last(usize),
}

/// A filtered, optionally ordered and windowed read of one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    collection: CollectionPath,
    filters: Vec<Filter>,
    order_by: Option<(String, Direction)>,
    window: Option<Window>,
}

impl Query {
    pub fn new(collection: CollectionPath) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order_by: None,
            window: None,
        }
    }

    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq {
            field: field.to_owned(),
            value: value.into(),
        });
        self
    }

    pub fn array_contains(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::ArrayContains {
            field: field.to_owned(),
            value: value.into(),
        });
        self
    }

    /// Documents without `field` drop out of an ordered query.
    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_owned(), direction));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.window = Some(Window::First(n));
        self
    }

    /// Keeps the last `n` documents of the ordered result.
    pub fn limit_to_last(mut self, n: usize) -> Self {
        self.window = Some(Window::Last(n));
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        doc.path.collection == self.collection && self.filters.iter().all(|f| f.matches(doc))
    }

    /// Runs the query over every document of the collection.
    pub fn apply(&self, docs: impl IntoIterator<Item = Document>) -> Vec<Document> {
        let mut docs: Vec<Document> = docs.into_iter().filter(|doc| self.matches(doc)).collect();

        match &self.order_by {
            Some((field, direction)) => {
                docs.retain(|doc| doc.data.contains_key(field));
                docs.sort_by(|a, b| {
                    let ord = compare(&a.data[field], &b.data[field]).then_with(|| a.id().cmp(b.id()));
                    match direction {
                        Direction::Ascending => ord,
                        Direction::Descending => ord.reverse(),
                    }
                });
            }
            None => docs.sort_by(|a, b| a.id().cmp(b.id())),
        }

        match self.window {
            Some(Window::First(n)) => docs.truncate(n),
            Some(Window::Last(n)) => {
                let skip = docs.len().saturating_sub(n);
                docs.drain(..skip);
            }
            None => {}
        }
        docs
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => a
            .iter()
            .zip(b)
            .map(|(a, b)| compare(a, b))
            .find(|ord| ord.is_ne())
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        _ => rank(a).cmp(&rank(b)),
    }
}
