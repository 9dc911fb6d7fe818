// This file is part of the vsh package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

//! In-process dispatch of varlink method calls against a registered
//! interface. The message shapes are the remote varlink ones; delivery
//! is a direct call.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ShellError;
use crate::idl::{Interface, Method};
use crate::value::{Record, Value};

/// A call frame: `method` is fully qualified, `more` requests streaming
/// replies. This struct doubles as the JSON wire form used by the
/// external client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireCall {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub more: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oneway: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade: Option<bool>,
}

impl WireCall {
    pub fn new(method: impl Into<String>, parameters: Option<serde_json::Value>) -> WireCall {
        WireCall {
            method: method.into(),
            parameters,
            more: None,
            oneway: None,
            upgrade: None,
        }
    }

    pub fn with_more(mut self) -> WireCall {
        self.more = Some(true);
        self
    }
}

/// A reply frame; `continues` is present (true) on every reply except
/// the last one of a streaming call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continues: Option<bool>,
}

/// A typed call, decoded from (or never leaving) the process.
#[derive(Debug, Clone)]
pub struct Call {
    pub method: String,
    pub parameters: Option<Record>,
    pub more: bool,
}

/// One reply of a streaming method.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub parameters: Record,
    pub continues: bool,
}

/// A handler consumes the call parameters record and returns the reply
/// parameter records in emission order.
pub type Handler = fn(&Record) -> Result<Vec<Record>, ShellError>;

pub struct Registration {
    pub method: &'static str,
    pub streaming: bool,
    pub handler: Handler,
}

/// An interface definition plus its handler registry.
pub struct Service {
    interface: Interface,
    handlers: HashMap<&'static str, (bool, Handler)>,
}

impl Service {
    pub fn new(interface: Interface, registrations: &[Registration]) -> Service {
        let handlers = registrations
            .iter()
            .map(|reg| (reg.method, (reg.streaming, reg.handler)))
            .collect();
        Service {
            interface,
            handlers,
        }
    }

    pub fn interface(&self) -> &Interface {
        &self.interface
    }

    /// Look up a method definition by bare name.
    pub fn method(&self, name: &str) -> Result<&Method, ShellError> {
        self.interface.method(name).ok_or(ShellError::MethodNotFound {
            method: name.to_string(),
        })
    }

    /// Dispatch a call, enforcing the service contracts: the method must
    /// be registered, the parameters must only use declared keys, and a
    /// streaming method requires `more`.
    pub fn call(&self, call: &Call) -> Result<Vec<Reply>, ShellError> {
        let not_found = || ShellError::MethodNotFound {
            method: call.method.clone(),
        };
        let (iface, name) = call.method.rsplit_once('.').ok_or_else(not_found)?;
        if iface != self.interface.name {
            return Err(not_found());
        }
        let definition = self.interface.method(name).ok_or_else(not_found)?;
        let (streaming, handler) = *self.handlers.get(name).ok_or_else(not_found)?;

        let params = call.parameters.clone().unwrap_or_default();
        for key in params.keys() {
            if definition.input.field(key).is_none() {
                return Err(ShellError::invalid_parameter(key));
            }
        }
        if streaming && !call.more {
            return Err(ShellError::ExpectedMore {
                method: call.method.clone(),
            });
        }

        tracing::debug!(method = %call.method, more = call.more, "dispatch");
        let records = handler(&params)?;
        let count = records.len();
        Ok(records
            .into_iter()
            .enumerate()
            .map(|(i, parameters)| Reply {
                parameters,
                continues: i + 1 < count,
            })
            .collect())
    }

    /// Wire-format entry point: one encoded call frame in, encoded reply
    /// frames out. Errors become a single error reply, as on a socket.
    pub fn handle(&self, frame: &[u8]) -> Vec<Vec<u8>> {
        let replies = self.handle_wire(frame);
        replies
            .iter()
            .map(|reply| serde_json::to_vec(reply).unwrap_or_else(|_| b"{}".to_vec()))
            .collect()
    }

    fn handle_wire(&self, frame: &[u8]) -> Vec<WireReply> {
        let call: WireCall = match serde_json::from_slice(frame) {
            Ok(call) => call,
            Err(err) => return vec![error_reply(&ShellError::invalid_parameter(err.to_string()))],
        };
        let parameters = match call.parameters {
            None => None,
            Some(serde_json::Value::Object(ref map)) => Some(Record::from_json_object(map)),
            Some(_) => return vec![error_reply(&ShellError::invalid_parameter("parameters"))],
        };
        let call = Call {
            method: call.method,
            parameters,
            more: call.more.unwrap_or(false),
        };
        match self.call(&call) {
            Ok(replies) => replies
                .into_iter()
                .map(|reply| WireReply {
                    parameters: Some(reply.parameters.to_json()),
                    error: None,
                    continues: reply.continues.then_some(true),
                })
                .collect(),
            Err(err) => vec![error_reply(&err)],
        }
    }
}

fn error_reply(err: &ShellError) -> WireReply {
    WireReply {
        parameters: Some(err.parameters()),
        error: Some(err.name().to_string()),
        continues: None,
    }
}

/// Unwrap a reply parameters record: streaming record methods reply
/// `{object: …}`, which the executor flattens back into the stream.
pub fn unwrap_reply(parameters: Record) -> Option<Record> {
    if parameters.is_empty() {
        return None;
    }
    if parameters.len() == 1 {
        if let Some(Value::Record(inner)) = parameters.get("object") {
            return Some(inner.clone());
        }
    }
    Some(parameters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idl;

    const TEST_IDL: &str = "\
interface org.example.test
method Emit(count: int) -> (n: int)
method Single(text: ?string) -> (text: string)
";

    fn emit(params: &Record) -> Result<Vec<Record>, ShellError> {
        let count = match params.get("count") {
            Some(Value::Int(n)) => *n,
            _ => 0,
        };
        Ok((0..count)
            .map(|n| {
                let mut rec = Record::new();
                rec.insert("n", Value::Int(n));
                rec
            })
            .collect())
    }

    fn single(params: &Record) -> Result<Vec<Record>, ShellError> {
        let mut rec = Record::new();
        let text = params
            .get("text")
            .map(Value::render)
            .unwrap_or_else(|| "default".to_string());
        rec.insert("text", Value::String(text));
        Ok(vec![rec])
    }

    fn service() -> Service {
        Service::new(
            idl::parse(TEST_IDL).unwrap(),
            &[
                Registration {
                    method: "Emit",
                    streaming: true,
                    handler: emit,
                },
                Registration {
                    method: "Single",
                    streaming: false,
                    handler: single,
                },
            ],
        )
    }

    fn call(method: &str, parameters: Option<Record>, more: bool) -> Call {
        Call {
            method: method.to_string(),
            parameters,
            more,
        }
    }

    #[test]
    fn streaming_replies_tag_continues() {
        let mut params = Record::new();
        params.insert("count", Value::Int(3));
        let replies = service()
            .call(&call("org.example.test.Emit", Some(params), true))
            .unwrap();
        assert_eq!(replies.len(), 3);
        assert!(replies[0].continues);
        assert!(replies[1].continues);
        assert!(!replies[2].continues);
    }

    #[test]
    fn unknown_method_is_method_not_found() {
        let err = service()
            .call(&call("org.example.test.Nope", None, true))
            .unwrap_err();
        assert_eq!(
            err,
            ShellError::MethodNotFound {
                method: "org.example.test.Nope".to_string()
            }
        );
    }

    #[test]
    fn wrong_interface_is_method_not_found() {
        let err = service()
            .call(&call("org.other.iface.Emit", None, true))
            .unwrap_err();
        assert!(matches!(err, ShellError::MethodNotFound { .. }));
    }

    #[test]
    fn undeclared_parameter_is_rejected() {
        let mut params = Record::new();
        params.insert("bogus", Value::Int(1));
        let err = service()
            .call(&call("org.example.test.Emit", Some(params), true))
            .unwrap_err();
        assert_eq!(err, ShellError::invalid_parameter("bogus"));
    }

    #[test]
    fn streaming_method_without_more_is_expected_more() {
        let err = service()
            .call(&call("org.example.test.Emit", None, false))
            .unwrap_err();
        assert!(matches!(err, ShellError::ExpectedMore { .. }));
    }

    #[test]
    fn non_streaming_method_accepts_plain_call() {
        let replies = service()
            .call(&call("org.example.test.Single", None, false))
            .unwrap();
        assert_eq!(replies.len(), 1);
        assert!(!replies[0].continues);
    }

    #[test]
    fn wire_frames_round_trip() {
        let frames = service().handle(
            br#"{"method": "org.example.test.Emit", "parameters": {"count": 2}, "more": true}"#,
        );
        assert_eq!(frames.len(), 2);
        let first: WireReply = serde_json::from_slice(&frames[0]).unwrap();
        assert_eq!(first.continues, Some(true));
        assert_eq!(first.parameters, Some(serde_json::json!({"n": 0})));
        let last: WireReply = serde_json::from_slice(&frames[1]).unwrap();
        assert_eq!(last.continues, None);
    }

    #[test]
    fn wire_errors_are_error_replies() {
        let frames = service().handle(br#"{"method": "org.example.test.Missing"}"#);
        assert_eq!(frames.len(), 1);
        let reply: WireReply = serde_json::from_slice(&frames[0]).unwrap();
        assert_eq!(
            reply.error.as_deref(),
            Some("org.varlink.service.MethodNotFound")
        );
    }

    #[test]
    fn unwrap_reply_flattens_object_payloads() {
        let mut inner = Record::new();
        inner.insert("a", Value::Int(1));
        let mut outer = Record::new();
        outer.insert("object", Value::Record(inner.clone()));
        assert_eq!(unwrap_reply(outer), Some(inner));

        let mut direct = Record::new();
        direct.insert("count", Value::Int(2));
        assert_eq!(unwrap_reply(direct.clone()), Some(direct));
        assert_eq!(unwrap_reply(Record::new()), None);
    }
}
