// The help built-in: command discovery backed by the interface
// definition's doc comments.

use crate::error::ShellError;
use crate::pipeline::{command_name, method_name};
use crate::value::{Record, Value};

pub fn help(params: &Record) -> Result<Vec<Record>, ShellError> {
    let interface = super::service().interface();

    if let Some(command) = params.get("command") {
        let command = command.render();
        let method = method_name(&command);
        let Some(definition) = interface.method(&method) else {
            return Err(ShellError::MethodNotFound { method });
        };
        let mut record = Record::new();
        record.insert("command", Value::String(command));
        record.insert("description", Value::String(definition.doc.clone()));
        return Ok(vec![record]);
    }

    Ok(interface
        .methods()
        .map(|method| {
            let first_line = method.doc.lines().next().unwrap_or_default();
            let mut record = Record::new();
            record.insert("command", Value::String(command_name(&method.name)));
            record.insert("description", Value::String(first_line.to_string()));
            record
        })
        .collect())
}
