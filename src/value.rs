// The typed-record data model every pipeline stage produces and consumes.

use std::fmt;

/// A dynamically typed value flowing through a pipeline.
///
/// `Null` exists only as a transient JSON-decode intermediate: object
/// members decoding to null become absence of the enclosing key, so a
/// record never holds a `Null` value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Record(Record),
}

impl Value {
    /// Decode a JSON value. Integral in-range numbers become `Int`;
    /// fractional, exponent-carrying or out-of-range numbers become
    /// `Float`. Object members that are null are dropped.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Record(Record::from_json_object(map)),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Record(rec) => rec.to_json(),
        }
    }

    /// JSON with record keys recursively sorted; the identity `uniq` and
    /// `group` compare by.
    pub fn canonical(&self) -> String {
        self.canonical_json().to_string()
    }

    fn canonical_json(&self) -> serde_json::Value {
        match self {
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::canonical_json).collect())
            }
            Value::Record(rec) => {
                let mut pairs: Vec<_> = rec.iter().collect();
                pairs.sort_by_key(|(k, _)| *k);
                let mut map = serde_json::Map::new();
                for (k, v) in pairs {
                    map.insert(k.to_string(), v.canonical_json());
                }
                serde_json::Value::Object(map)
            }
            other => other.to_json(),
        }
    }

    /// The string rendering used by templates, `grep`, `where` and the
    /// table renderer: booleans as `True`/`False`, numbers in decimal,
    /// lists and records as compact JSON.
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::List(_) | Value::Record(_) => self.to_json().to_string(),
        }
    }

    /// Numeric coercion shared by `sort`, `where`, `sum`, `min` and `max`:
    /// ints and floats directly, booleans as 1/0, strings via parse.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// An insertion-ordered mapping from string keys to [`Value`]s.
///
/// Keys never contain dots; the template engine reserves `.` as its path
/// separator. Inserting an existing key replaces the value in place.
#[derive(Debug, Clone, Default)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Record {
        Record { fields: Vec::new() }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Resolve a dotted path, descending through nested records. Any
    /// non-record intermediate makes the whole path miss.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.get(parts.next()?)?;
        for part in parts {
            match current {
                Value::Record(nested) => current = nested.get(part)?,
                _ => return None,
            }
        }
        Some(current)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Build a record from a JSON object, dropping null members.
    pub fn from_json_object(map: &serde_json::Map<String, serde_json::Value>) -> Record {
        let mut record = Record::new();
        for (key, value) in map {
            if value.is_null() {
                continue;
            }
            record.insert(key.clone(), Value::from_json(value));
        }
        record
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (key, value) in &self.fields {
            map.insert(key.clone(), value.to_json());
        }
        serde_json::Value::Object(map)
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Record {
        let mut record = Record::new();
        for (key, value) in iter {
            record.insert(key, value);
        }
        record
    }
}

// Records compare by key set and per-key value; insertion order is
// preserved for iteration but ignored for equality.
impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}
