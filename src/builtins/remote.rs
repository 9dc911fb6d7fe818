// The varlink built-in: introspect a remote service or invoke one of
// its methods as a pipeline stage.

use super::{argv, input, wrap_all};
use crate::client::{coerce, Connection};
use crate::error::ShellError;
use crate::value::{Record, Value};

const SERVICE_INTERFACE: &str = "org.varlink.service";

pub fn varlink(params: &Record) -> Result<Vec<Record>, ShellError> {
    let args = argv(params);
    let Some(address) = args.first() else {
        return Err(ShellError::invalid_parameter("args"));
    };

    // First bare argument is the method, everything else is key=value.
    let mut method_arg: Option<&str> = None;
    let mut kv_args: Vec<&str> = Vec::new();
    for arg in &args[1..] {
        if arg.contains('=') {
            kv_args.push(arg);
        } else if method_arg.is_none() {
            method_arg = Some(arg);
        } else {
            kv_args.push(arg);
        }
    }

    // One socket per stage, dropped on every exit path.
    let mut connection = Connection::connect(address)?;

    let Some(method_arg) = method_arg else {
        return list_methods(&mut connection);
    };

    let (interface, method) = match method_arg.rsplit_once('.') {
        Some((interface, method)) => (interface.to_string(), method.to_string()),
        None => (
            resolve_interface(&mut connection, method_arg, address)?,
            method_arg.to_string(),
        ),
    };
    let qualified = format!("{interface}.{method}");

    let piped = input(params);
    let records = if !kv_args.is_empty() || piped.is_empty() {
        let mut parameters = Record::new();
        for arg in kv_args {
            let (key, value) = arg.split_once('=').expect("checked above");
            parameters.insert(key, coerce(value));
        }
        let parameters = (!parameters.is_empty()).then(|| parameters.to_json());
        connection.call_more(&qualified, parameters)?
    } else {
        // Each piped record becomes one call's parameters.
        let mut records = Vec::new();
        for record in piped {
            records.extend(connection.call_more(&qualified, Some(record.to_json()))?);
        }
        records
    };

    Ok(wrap_all(records))
}

// Introspection listing: one record per remote method.
fn list_methods(connection: &mut Connection) -> Result<Vec<Record>, ShellError> {
    let mut out = Vec::new();
    for name in connection.interfaces()? {
        if name == SERVICE_INTERFACE {
            continue;
        }
        let interface = connection.describe(&name)?;
        for method in interface.methods() {
            let mut record = Record::new();
            record.insert("interface", Value::String(name.clone()));
            record.insert("method", Value::String(method.name.clone()));
            record.insert("signature", Value::String(method.signature()));
            out.push(record);
        }
    }
    Ok(wrap_all(out))
}

// Find the unique interface defining an unqualified method name.
fn resolve_interface(
    connection: &mut Connection,
    method: &str,
    address: &str,
) -> Result<String, ShellError> {
    let mut candidates = Vec::new();
    for name in connection.interfaces()? {
        if name == SERVICE_INTERFACE {
            continue;
        }
        let interface = connection.describe(&name)?;
        if interface.method(method).is_some() {
            candidates.push(name);
        }
    }
    match candidates.len() {
        1 => Ok(candidates.remove(0)),
        _ => Err(ShellError::VarlinkMethodNotFound {
            method: method.to_string(),
            address: address.to_string(),
        }),
    }
}
