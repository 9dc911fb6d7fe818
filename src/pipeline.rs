// Pipeline parsing and the synchronous stage executor.

use crate::builtins;
use crate::error::ShellError;
use crate::service::{unwrap_reply, Call};
use crate::value::{Record, Value};

/// One stage of a pipeline: a command token and its already-unquoted
/// arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub command: String,
    pub argv: Vec<String>,
}

/// Split a line into stages on unquoted `|`. Arguments split on
/// whitespace with single and double quoting honoured; inside double
/// quotes a backslash escapes `"` and `\`.
pub fn parse(line: &str) -> Result<Vec<Stage>, ShellError> {
    let mut stages: Vec<Vec<String>> = Vec::new();
    let mut tokens: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut has_token = false;
    let mut saw_pipe = false;

    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\'' => {
                has_token = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err(ShellError::invalid_parameter("unterminated quote")),
                    }
                }
            }
            '"' => {
                has_token = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\')) => current.push(c),
                            Some(c) => {
                                current.push('\\');
                                current.push(c);
                            }
                            None => {
                                return Err(ShellError::invalid_parameter("unterminated quote"))
                            }
                        },
                        Some(c) => current.push(c),
                        None => return Err(ShellError::invalid_parameter("unterminated quote")),
                    }
                }
            }
            '|' => {
                if has_token {
                    tokens.push(std::mem::take(&mut current));
                    has_token = false;
                }
                if tokens.is_empty() {
                    return Err(ShellError::invalid_parameter("empty pipeline stage"));
                }
                stages.push(std::mem::take(&mut tokens));
                saw_pipe = true;
            }
            c if c.is_whitespace() => {
                if has_token {
                    tokens.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                has_token = true;
                current.push(c);
            }
        }
    }
    if has_token {
        tokens.push(current);
    }
    if tokens.is_empty() {
        if saw_pipe {
            return Err(ShellError::invalid_parameter("empty pipeline stage"));
        }
        return Ok(Vec::new());
    }
    stages.push(tokens);

    Ok(stages
        .into_iter()
        .map(|mut tokens| {
            let command = tokens.remove(0);
            Stage {
                command,
                argv: tokens,
            }
        })
        .collect())
}

/// Command names map to interface methods by capitalising the first
/// letter: `ls` becomes `Ls`, `filter_map` becomes `Filter_map`.
pub fn method_name(command: &str) -> String {
    let mut chars = command.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// The inverse mapping, used by the help listing.
pub fn command_name(method: &str) -> String {
    let mut chars = method.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Parse and run a pipeline, returning the final stage's stream.
pub fn execute(line: &str) -> Result<Vec<Record>, ShellError> {
    run(&parse(line)?)
}

/// Run parsed stages left to right, materialising each stage's stream
/// before the next begins. Any stage error aborts the pipeline.
pub fn run(stages: &[Stage]) -> Result<Vec<Record>, ShellError> {
    let service = builtins::service();
    let mut stream: Option<Vec<Record>> = None;

    for stage in stages {
        let method = method_name(&stage.command);
        let definition = service.method(&method)?;

        let mut params = Record::new();
        if definition.input.field("args").is_some() {
            params.insert(
                "args",
                Value::List(
                    stage
                        .argv
                        .iter()
                        .map(|arg| Value::String(arg.clone()))
                        .collect(),
                ),
            );
        } else {
            // Positional arguments map onto the declared input fields.
            let positional: Vec<&str> = definition
                .input
                .fields
                .iter()
                .map(|field| field.name.as_str())
                .filter(|name| *name != "input")
                .collect();
            for (name, arg) in positional.into_iter().zip(&stage.argv) {
                params.insert(name, Value::String(arg.clone()));
            }
        }

        if let Some(field) = definition.input.field("input") {
            if let Some(records) = &stream {
                if !records.is_empty() || !field.ty.optional {
                    params.insert(
                        "input",
                        Value::List(records.iter().cloned().map(Value::Record).collect()),
                    );
                }
            }
        }

        let replies = service.call(&Call {
            method: format!("{}.{}", service.interface().name, method),
            parameters: Some(params),
            more: true,
        })?;
        stream = Some(
            replies
                .into_iter()
                .filter_map(|reply| unwrap_reply(reply.parameters))
                .collect(),
        );
    }

    Ok(stream.unwrap_or_default())
}
