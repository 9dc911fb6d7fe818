// This file is part of the vsh package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

//! The shell's built-in commands, registered as methods on the
//! `sh.builtin` interface. The doc comments in [`INTERFACE`] are the
//! authoritative source for `help`.

mod exec;
mod fields;
mod help;
mod remote;
mod stream;

use std::sync::OnceLock;

use crate::idl;
use crate::service::{Registration, Service};
use crate::value::{Record, Value};

/// The interface definition every pipeline stage dispatches against.
pub const INTERFACE: &str = r#"
# Interface to the shell's built-in commands. Every pipeline stage is a
# call against one of these methods; record streams travel as object
# replies tagged with a continues flag.
interface sh.builtin

# Emit one record built from the arguments, or pass records through.
#
# Each key=value argument becomes a string field and each bare word a
# boolean true field. With piped input the records pass through
# unchanged and the arguments are ignored.
method Echo(args: ?[]string, input: ?[]object) -> (object: object)

# List a directory as records with name, type and size fields.
#
# Entries are sorted by name; entries whose metadata cannot be read are
# skipped. The type field is "file", "dir" or "link".
method Ls(args: ?[]string) -> (name: string, type: string, size: int)

# Keep records whose fields contain the given substrings.
#
# Each argument is field=pattern; a record passes when every pattern
# occurs in the string rendering of the referenced field. Dotted paths
# reach into nested records. Records missing a field are dropped.
method Grep(args: ?[]string, input: ?[]object) -> (object: object)

# Count the records in the input stream.
method Count(input: ?[]object) -> (count: int)

# Describe the built-in commands.
#
# Without an argument, one record per command with the first line of
# its description. With a command name, the full description.
method Help(command: ?string) -> (command: string, description: string)

# Run a subprocess and parse its standard output as one JSON document.
#
# A JSON list, or an object whose only key holds a list, emits one
# record per element; any other object emits a single record.
# Primitive elements are wrapped as value fields.
method Jsexec(args: ?[]string) -> (object: object)

# Project each record through field templates.
#
# A bare name or dotted path selects that field, preserving its type;
# key=template renders the template around literal text. Output keys
# follow argument order; a template whose reference is missing omits
# its key.
method Map(args: ?[]string, input: ?[]object) -> (object: object)

# Project records through templates, dropping incomplete ones.
#
# Like map, but a record missing any referenced field is dropped
# instead of losing keys.
method Filter_map(args: ?[]string, input: ?[]object) -> (object: object)

# Run a pipeline per record, substituting field references.
#
# Substituted values are shell-quoted; missing references substitute
# the empty string. Emits everything the inner pipelines produce.
method Foreach(args: ?[]string, input: ?[]object) -> (object: object)

# Stable multi-key sort.
#
# A leading - sorts that key descending. Values that both parse as
# numbers compare numerically, otherwise their string renderings
# compare lexicographically; missing values sort last.
method Sort(args: ?[]string, input: ?[]object) -> (object: object)

# Take the first n records (default 10).
method Head(args: ?[]string, input: ?[]object) -> (object: object)

# Take the last n records (default 10).
method Tail(args: ?[]string, input: ?[]object) -> (object: object)

# Drop duplicate records, keeping first occurrences.
#
# With field arguments, record identity is the tuple of those fields'
# values; without, the whole record.
method Uniq(args: ?[]string, input: ?[]object) -> (object: object)

# Emit the input in reverse order.
method Reverse(input: ?[]object) -> (object: object)

# Sum a numeric field across the input.
#
# Missing or non-numeric values count as zero. The sum is an int when
# every contribution was integral, otherwise a float.
method Sum(args: ?[]string, input: ?[]object) -> (object: object)

# Emit the record whose field is numerically smallest.
#
# Numeric values order before strings; ties keep the earliest record.
method Min(args: ?[]string, input: ?[]object) -> (object: object)

# Emit the record whose field is numerically largest.
#
# Numeric values order before strings; ties keep the earliest record.
method Max(args: ?[]string, input: ?[]object) -> (object: object)

# Keep records matching every condition.
#
# Conditions are path OP value with OP one of = != > < >= <= ~.
# Equality compares string renderings; the ordered operators compare
# numerically when both sides parse as numbers; ~ matches the field's
# rendering against a regular expression.
method Where(args: ?[]string, input: ?[]object) -> (object: object)

# Count records per distinct value of a field.
#
# Emits one record per value with the grouping value and a count, in
# first-appearance order.
method Group(args: ?[]string, input: ?[]object) -> (object: object)

# Prepend a zero-based index field to each record.
method Enumerate(input: ?[]object) -> (object: object)

# Force table rendering of the stream, passing records through.
method Print(input: ?[]object) -> (object: object)

# Call a method on a remote varlink service.
#
# With only an address, list every remote interface's methods. A
# method may be fully qualified or resolved by introspection.
# Parameters come from key=value arguments or, without them, from
# each piped record. Replies stream back as records.
method Varlink(args: ?[]string, input: ?[]object) -> (object: object)

error ExecFailed (command: string, exitcode: int, message: string)
error InvalidJson (message: string)
error VarlinkConnectionFailed (address: string, message: string)
error VarlinkCallFailed (method: string, error: string, parameters: object)
error VarlinkMethodNotFound (method: string, address: string)
"#;

const REGISTRATIONS: &[Registration] = &[
    Registration { method: "Echo", streaming: true, handler: stream::echo },
    Registration { method: "Ls", streaming: true, handler: exec::ls },
    Registration { method: "Grep", streaming: true, handler: fields::grep },
    Registration { method: "Count", streaming: true, handler: stream::count },
    Registration { method: "Help", streaming: true, handler: help::help },
    Registration { method: "Jsexec", streaming: true, handler: exec::jsexec },
    Registration { method: "Map", streaming: true, handler: fields::map },
    Registration { method: "Filter_map", streaming: true, handler: fields::filter_map },
    Registration { method: "Foreach", streaming: true, handler: fields::foreach },
    Registration { method: "Sort", streaming: true, handler: stream::sort },
    Registration { method: "Head", streaming: true, handler: stream::head },
    Registration { method: "Tail", streaming: true, handler: stream::tail },
    Registration { method: "Uniq", streaming: true, handler: stream::uniq },
    Registration { method: "Reverse", streaming: true, handler: stream::reverse },
    Registration { method: "Sum", streaming: true, handler: fields::sum },
    Registration { method: "Min", streaming: true, handler: fields::min },
    Registration { method: "Max", streaming: true, handler: fields::max },
    Registration { method: "Where", streaming: true, handler: fields::where_ },
    Registration { method: "Group", streaming: true, handler: fields::group },
    Registration { method: "Enumerate", streaming: true, handler: stream::enumerate },
    Registration { method: "Print", streaming: true, handler: stream::print },
    Registration { method: "Varlink", streaming: true, handler: remote::varlink },
];

/// The process-wide built-in service, built once at first use.
pub fn service() -> &'static Service {
    static SERVICE: OnceLock<Service> = OnceLock::new();
    SERVICE.get_or_init(|| {
        let interface = idl::parse(INTERFACE).expect("built-in interface definition parses");
        Service::new(interface, REGISTRATIONS)
    })
}

// Shared parameter accessors for the handlers.

pub(crate) fn argv(params: &Record) -> Vec<String> {
    match params.get("args") {
        Some(Value::List(items)) => items.iter().map(Value::render).collect(),
        _ => Vec::new(),
    }
}

pub(crate) fn input(params: &Record) -> Vec<Record> {
    match params.get("input") {
        Some(Value::List(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::Record(record) => Some(record.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Wrap a stream record into the `{object: …}` reply shape.
pub(crate) fn wrap(record: Record) -> Record {
    let mut reply = Record::new();
    reply.insert("object", Value::Record(record));
    reply
}

pub(crate) fn wrap_all(records: Vec<Record>) -> Vec<Record> {
    records.into_iter().map(wrap).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idl::Member;
    use crate::pipeline::method_name;

    #[test]
    fn every_method_is_registered_and_vice_versa() {
        let interface = service().interface();
        let declared: Vec<&str> = interface.methods().map(|m| m.name.as_str()).collect();
        let registered: Vec<&str> = REGISTRATIONS.iter().map(|r| r.method).collect();
        assert_eq!(declared, registered);
    }

    #[test]
    fn every_method_has_a_doc_string() {
        for method in service().interface().methods() {
            assert!(!method.doc.is_empty(), "{} is undocumented", method.name);
        }
    }

    #[test]
    fn method_names_round_trip_through_command_mapping() {
        use crate::pipeline::command_name;
        for method in service().interface().methods() {
            assert_eq!(method_name(&command_name(&method.name)), method.name);
        }
    }

    #[test]
    fn declared_errors_match_the_taxonomy() {
        let errors: Vec<&str> = service()
            .interface()
            .members
            .iter()
            .filter_map(|member| match member {
                Member::Error(e) => Some(e.name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(
            errors,
            [
                "ExecFailed",
                "InvalidJson",
                "VarlinkConnectionFailed",
                "VarlinkCallFailed",
                "VarlinkMethodNotFound"
            ]
        );
    }
}
