// Built-ins that reach outside the shell: directory listing and
// subprocess JSON ingestion.

use std::fs;
use std::process::Command;

use super::{argv, wrap_all};
use crate::error::ShellError;
use crate::value::{Record, Value};

pub fn ls(params: &Record) -> Result<Vec<Record>, ShellError> {
    let args = argv(params);
    let path = args.first().map(String::as_str).unwrap_or(".");

    let entries =
        fs::read_dir(path).map_err(|_| ShellError::invalid_parameter(path.to_string()))?;
    let mut rows: Vec<(String, &'static str, i64)> = Vec::new();
    for entry in entries.flatten() {
        // Entries whose metadata cannot be read are skipped.
        let Ok(metadata) = fs::symlink_metadata(entry.path()) else {
            continue;
        };
        let file_type = if metadata.file_type().is_symlink() {
            "link"
        } else if metadata.is_dir() {
            "dir"
        } else {
            "file"
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        rows.push((name, file_type, metadata.len() as i64));
    }
    rows.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(rows
        .into_iter()
        .map(|(name, file_type, size)| {
            let mut record = Record::new();
            record.insert("name", Value::String(name));
            record.insert("type", Value::String(file_type.to_string()));
            record.insert("size", Value::Int(size));
            record
        })
        .collect())
}

pub fn jsexec(params: &Record) -> Result<Vec<Record>, ShellError> {
    let args = argv(params);
    let Some(command) = args.first() else {
        return Err(ShellError::invalid_parameter("args"));
    };

    tracing::debug!(%command, "jsexec spawn");
    let output = Command::new(command)
        .args(&args[1..])
        .output()
        .map_err(|err| ShellError::ExecFailed {
            command: command.clone(),
            exitcode: -1,
            message: err.to_string(),
        })?;

    if !output.status.success() {
        return Err(ShellError::ExecFailed {
            command: command.clone(),
            exitcode: output.status.code().unwrap_or(-1),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let document: serde_json::Value = serde_json::from_slice(&output.stdout)
        .map_err(|err| ShellError::InvalidJson {
            message: err.to_string(),
        })?;

    Ok(wrap_all(unpack(document)))
}

// One JSON document becomes a stream: lists element-wise (including a
// single-key object wrapping a list), other objects as one record,
// primitives wrapped under a value key.
fn unpack(document: serde_json::Value) -> Vec<Record> {
    let document = match document {
        serde_json::Value::Object(map) if map.len() == 1 => {
            let (key, value) = map.into_iter().next().expect("one entry");
            match value {
                serde_json::Value::Array(items) => serde_json::Value::Array(items),
                other => {
                    let mut map = serde_json::Map::new();
                    map.insert(key, other);
                    serde_json::Value::Object(map)
                }
            }
        }
        other => other,
    };

    let items = match document {
        serde_json::Value::Array(items) => items,
        other => vec![other],
    };

    items
        .into_iter()
        .map(|item| match Value::from_json(&item) {
            Value::Record(record) => record,
            Value::Null => Record::new(),
            primitive => {
                let mut record = Record::new();
                record.insert("value", primitive);
                record
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(args: &[&str]) -> Record {
        let mut params = Record::new();
        params.insert(
            "args",
            Value::List(args.iter().map(|a| Value::String(a.to_string())).collect()),
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
    fn ls_lists_sorted_entries_with_metadata() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "hi").unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let records = ls(&params(&[dir.path().to_str().unwrap()])).unwrap();
        let names: Vec<String> = records
            .iter()
            .map(|r| r.get("name").unwrap().render())
            .collect();
        assert_eq!(names, ["a.txt", "b.txt", "sub"]);
        assert_eq!(records[0].get("size"), Some(&Value::Int(5)));
        assert_eq!(records[0].get("type"), Some(&Value::String("file".into())));
        assert_eq!(records[2].get("type"), Some(&Value::String("dir".into())));
    }

    #[cfg(unix)]
    #[test]
    fn ls_reports_symlinks_as_links() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("target"), "x").unwrap();
        std::os::unix::fs::symlink("target", dir.path().join("alias")).unwrap();

        let records = ls(&params(&[dir.path().to_str().unwrap()])).unwrap();
        assert_eq!(records[0].get("name"), Some(&Value::String("alias".into())));
        assert_eq!(records[0].get("type"), Some(&Value::String("link".into())));
    }

    #[test]
    fn ls_rejects_unreadable_paths() {
        let err = ls(&params(&["/definitely/not/there"])).unwrap_err();
        assert!(matches!(err, ShellError::InvalidParameter { .. }));
    }

    #[test]
    fn jsexec_requires_a_command() {
        let err = jsexec(&params(&[])).unwrap_err();
        assert_eq!(err, ShellError::invalid_parameter("args"));
    }

    #[test]
    fn jsexec_reports_nonzero_exit_with_stderr() {
        let err = jsexec(&params(&["sh", "-c", "echo oops >&2; exit 3"])).unwrap_err();
        assert_eq!(
            err,
            ShellError::ExecFailed {
                command: "sh".into(),
                exitcode: 3,
                message: "oops".into(),
            }
        );
    }

    #[test]
    fn jsexec_rejects_unparseable_output() {
        let err = jsexec(&params(&["printf", "not json"])).unwrap_err();
        assert!(matches!(err, ShellError::InvalidJson { .. }));
    }

    #[test]
    fn unpack_spreads_lists() {
        let records = unwrapped(wrap_all(unpack(
            serde_json::from_str(r#"[{"x": 1}, {"x": 2}]"#).unwrap(),
        )));
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("x"), Some(&Value::Int(2)));
    }

    #[test]
    fn unpack_unwraps_single_key_list_objects() {
        let records = unpack(serde_json::from_str(r#"{"items": [{"n": 1}, {"n": 2}]}"#).unwrap());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("n"), Some(&Value::Int(1)));
    }

    #[test]
    fn unpack_keeps_multi_key_objects_whole() {
        let records = unpack(serde_json::from_str(r#"{"a": [1], "b": 2}"#).unwrap());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("b"), Some(&Value::Int(2)));
    }

    #[test]
    fn unpack_wraps_primitive_elements() {
        let records = unpack(serde_json::from_str(r#"[1, "two"]"#).unwrap());
        assert_eq!(records[0].get("value"), Some(&Value::Int(1)));
        assert_eq!(records[1].get("value"), Some(&Value::String("two".into())));
    }
}
