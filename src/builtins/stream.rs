// Built-ins that operate on the stream as a whole: originating records,
// counting, slicing, ordering and rendering.

use std::cmp::Ordering;
use std::collections::HashSet;

use super::{argv, input, wrap, wrap_all};
use crate::error::ShellError;
use crate::render;
use crate::value::{Record, Value};

pub fn echo(params: &Record) -> Result<Vec<Record>, ShellError> {
    let records = input(params);
    if !records.is_empty() {
        return Ok(wrap_all(records));
    }
    let mut record = Record::new();
    for arg in argv(params) {
        match arg.split_once('=') {
            Some((key, value)) => record.insert(key, Value::String(value.to_string())),
            None => record.insert(arg, Value::Bool(true)),
        }
    }
    Ok(vec![wrap(record)])
}

pub fn count(params: &Record) -> Result<Vec<Record>, ShellError> {
    let mut record = Record::new();
    record.insert("count", Value::Int(input(params).len() as i64));
    Ok(vec![record])
}

fn take_limit(params: &Record) -> Result<usize, ShellError> {
    match argv(params).first() {
        None => Ok(10),
        Some(arg) => arg
            .parse()
            .map_err(|_| ShellError::invalid_parameter(arg.clone())),
    }
}

pub fn head(params: &Record) -> Result<Vec<Record>, ShellError> {
    let n = take_limit(params)?;
    let mut records = input(params);
    records.truncate(n);
    Ok(wrap_all(records))
}

pub fn tail(params: &Record) -> Result<Vec<Record>, ShellError> {
    let n = take_limit(params)?;
    let mut records = input(params);
    let tail = records.split_off(records.len().saturating_sub(n));
    Ok(wrap_all(tail))
}

pub fn uniq(params: &Record) -> Result<Vec<Record>, ShellError> {
    let fields = argv(params);
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for record in input(params) {
        let identity = if fields.is_empty() {
            Value::Record(record.clone()).canonical()
        } else {
            // Tuple of the projected fields; missing projects to null.
            let projected: Vec<serde_json::Value> = fields
                .iter()
                .map(|field| {
                    record
                        .get_path(field)
                        .map(|v| serde_json::Value::String(v.canonical()))
                        .unwrap_or(serde_json::Value::Null)
                })
                .collect();
            serde_json::Value::Array(projected).to_string()
        };
        if seen.insert(identity) {
            out.push(record);
        }
    }
    Ok(wrap_all(out))
}

pub fn reverse(params: &Record) -> Result<Vec<Record>, ShellError> {
    let mut records = input(params);
    records.reverse();
    Ok(wrap_all(records))
}

pub fn enumerate(params: &Record) -> Result<Vec<Record>, ShellError> {
    let out = input(params)
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            let mut indexed = Record::new();
            indexed.insert("index", Value::Int(index as i64));
            for (key, value) in record.iter() {
                indexed.insert(key, value.clone());
            }
            indexed
        })
        .collect();
    Ok(wrap_all(out))
}

pub fn sort(params: &Record) -> Result<Vec<Record>, ShellError> {
    let keys: Vec<(String, bool)> = argv(params)
        .into_iter()
        .map(|arg| match arg.strip_prefix('-') {
            Some(field) => (field.to_string(), true),
            None => (arg, false),
        })
        .collect();

    let mut records = input(params);
    records.sort_by(|a, b| {
        for (field, descending) in &keys {
            let ordering = compare_values(a.get_path(field), b.get_path(field));
            let ordering = if *descending {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    Ok(wrap_all(records))
}

// Numeric when both sides coerce, string renderings otherwise; a
// missing value orders after any present one.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => match (x.as_number(), y.as_number()) {
            (Some(nx), Some(ny)) => nx.partial_cmp(&ny).unwrap_or(Ordering::Equal),
            _ => x.render().cmp(&y.render()),
        },
    }
}

pub fn print(params: &Record) -> Result<Vec<Record>, ShellError> {
    let records = input(params);
    let rendered = render::pretty(&records);
    if !rendered.is_empty() {
        println!("{rendered}");
    }
    Ok(wrap_all(records))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(args: &[&str], records: &[&str]) -> Record {
        let mut params = Record::new();
        params.insert(
            "args",
            Value::List(args.iter().map(|a| Value::String(a.to_string())).collect()),
        );
        params.insert(
            "input",
            Value::List(
                records
                    .iter()
                    .map(|json| Value::from_json(&serde_json::from_str(json).unwrap()))
                    .collect(),
            ),
        );
        params
    }

    fn unwrapped(replies: Vec<Record>) -> Vec<Record> {
        replies
            .into_iter()
            .filter_map(crate::service::unwrap_reply)
            .collect()
    }

    #[test]
    fn echo_builds_record_from_args() {
        let replies = echo(&params(&["name=alice", "verbose"], &[])).unwrap();
        let records = unwrapped(replies);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("name"), Some(&Value::String("alice".into())));
        assert_eq!(records[0].get("verbose"), Some(&Value::Bool(true)));
    }

    #[test]
    fn echo_passes_input_through_ignoring_args() {
        let replies = echo(&params(&["x=1"], &[r#"{"a": 1}"#, r#"{"b": 2}"#])).unwrap();
        let records = unwrapped(replies);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("a"), Some(&Value::Int(1)));
        assert!(!records[0].contains_key("x"));
    }

    #[test]
    fn count_reports_stream_length() {
        let replies = count(&params(&[], &[r#"{"a": 1}"#, r#"{"a": 2}"#])).unwrap();
        assert_eq!(replies[0].get("count"), Some(&Value::Int(2)));
        let empty = count(&Record::new()).unwrap();
        assert_eq!(empty[0].get("count"), Some(&Value::Int(0)));
    }

    #[test]
    fn head_and_tail_slice_the_stream() {
        let input: Vec<String> = (0..5).map(|n| format!(r#"{{"n": {n}}}"#)).collect();
        let input: Vec<&str> = input.iter().map(String::as_str).collect();

        let first = unwrapped(head(&params(&["2"], &input)).unwrap());
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].get("n"), Some(&Value::Int(0)));

        let last = unwrapped(tail(&params(&["2"], &input)).unwrap());
        assert_eq!(last.len(), 2);
        assert_eq!(last[0].get("n"), Some(&Value::Int(3)));
    }

    #[test]
    fn head_zero_emits_nothing() {
        assert!(head(&params(&["0"], &[r#"{"a": 1}"#])).unwrap().is_empty());
        assert!(tail(&params(&["0"], &[r#"{"a": 1}"#])).unwrap().is_empty());
    }

    #[test]
    fn head_rejects_malformed_count() {
        for bad in ["x", "-1"] {
            let err = head(&params(&[bad], &[])).unwrap_err();
            assert_eq!(err, ShellError::invalid_parameter(bad));
        }
    }

    #[test]
    fn uniq_keeps_first_occurrence() {
        let records = unwrapped(
            uniq(&params(
                &[],
                &[r#"{"a": 1, "b": 1}"#, r#"{"b": 1, "a": 1}"#, r#"{"a": 2}"#],
            ))
            .unwrap(),
        );
        // Key order does not matter for identity.
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("a"), Some(&Value::Int(2)));
    }

    #[test]
    fn uniq_by_fields_projects_the_tuple() {
        let records = unwrapped(
            uniq(&params(
                &["t"],
                &[r#"{"t": "a", "n": 1}"#, r#"{"t": "a", "n": 2}"#, r#"{"t": "b"}"#],
            ))
            .unwrap(),
        );
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("n"), Some(&Value::Int(1)));
    }

    #[test]
    fn reverse_reverses() {
        let records = unwrapped(reverse(&params(&[], &[r#"{"n": 1}"#, r#"{"n": 2}"#])).unwrap());
        assert_eq!(records[0].get("n"), Some(&Value::Int(2)));
    }

    #[test]
    fn enumerate_prepends_index() {
        let records = unwrapped(enumerate(&params(&[], &[r#"{"a": "x"}"#])).unwrap());
        let keys: Vec<&str> = records[0].keys().collect();
        assert_eq!(keys, ["index", "a"]);
        assert_eq!(records[0].get("index"), Some(&Value::Int(0)));
    }

    #[test]
    fn sort_is_numeric_when_both_sides_parse() {
        let records = unwrapped(
            sort(&params(
                &["n"],
                &[r#"{"n": "10"}"#, r#"{"n": 2}"#, r#"{"n": 1}"#],
            ))
            .unwrap(),
        );
        let values: Vec<String> = records.iter().map(|r| r.get("n").unwrap().render()).collect();
        assert_eq!(values, ["1", "2", "10"]);
    }

    #[test]
    fn sort_descending_with_minus_prefix() {
        let records = unwrapped(
            sort(&params(&["-n"], &[r#"{"n": 1}"#, r#"{"n": 3}"#, r#"{"n": 2}"#])).unwrap(),
        );
        let values: Vec<i64> = records
            .iter()
            .map(|r| match r.get("n") {
                Some(Value::Int(n)) => *n,
                _ => panic!("expected int"),
            })
            .collect();
        assert_eq!(values, [3, 2, 1]);
    }

    #[test]
    fn sort_missing_values_sort_last() {
        let records = unwrapped(
            sort(&params(&["n"], &[r#"{"x": 1}"#, r#"{"n": 5}"#])).unwrap(),
        );
        assert_eq!(records[0].get("n"), Some(&Value::Int(5)));
        assert!(records[1].get("n").is_none());
    }

    #[test]
    fn sort_multi_key_is_stable() {
        let records = unwrapped(
            sort(&params(
                &["a", "b"],
                &[
                    r#"{"a": 1, "b": 2, "tag": "x"}"#,
                    r#"{"a": 1, "b": 1, "tag": "y"}"#,
                    r#"{"a": 1, "b": 1, "tag": "z"}"#,
                ],
            ))
            .unwrap(),
        );
        let tags: Vec<String> = records
            .iter()
            .map(|r| r.get("tag").unwrap().render())
            .collect();
        assert_eq!(tags, ["y", "z", "x"]);
    }
}
