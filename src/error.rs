// Error taxonomy shared by the embedded service, the built-ins and the
// varlink client.

use serde_json::json;
use thiserror::Error;

/// Errors raised by pipeline stages.
///
/// Every variant is a tagged value: a fully-qualified varlink error name
/// plus a parameters object, available through [`ShellError::name`] and
/// [`ShellError::parameters`]. The read loop reports them to stderr as
/// `error: <name>: <parameters as JSON>`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShellError {
    #[error("invalid parameter '{parameter}'")]
    InvalidParameter { parameter: String },

    #[error("method '{method}' not found")]
    MethodNotFound { method: String },

    #[error("method '{method}' streams replies and must be called with more")]
    ExpectedMore { method: String },

    #[error("'{command}' exited with code {exitcode}: {message}")]
    ExecFailed {
        command: String,
        exitcode: i32,
        message: String,
    },

    #[error("subprocess output was not valid JSON: {message}")]
    InvalidJson { message: String },

    #[error("could not reach {address}: {message}")]
    VarlinkConnectionFailed { address: String, message: String },

    #[error("call to {method} failed with {error}")]
    VarlinkCallFailed {
        method: String,
        error: String,
        parameters: serde_json::Value,
    },

    #[error("method '{method}' not offered by any interface at {address}")]
    VarlinkMethodNotFound { method: String, address: String },
}

impl ShellError {
    pub fn invalid_parameter(parameter: impl Into<String>) -> Self {
        ShellError::InvalidParameter {
            parameter: parameter.into(),
        }
    }

    /// The fully-qualified varlink error name.
    pub fn name(&self) -> &'static str {
        match self {
            ShellError::InvalidParameter { .. } => "org.varlink.service.InvalidParameter",
            ShellError::MethodNotFound { .. } => "org.varlink.service.MethodNotFound",
            ShellError::ExpectedMore { .. } => "org.varlink.service.ExpectedMore",
            ShellError::ExecFailed { .. } => "sh.builtin.ExecFailed",
            ShellError::InvalidJson { .. } => "sh.builtin.InvalidJson",
            ShellError::VarlinkConnectionFailed { .. } => "sh.builtin.VarlinkConnectionFailed",
            ShellError::VarlinkCallFailed { .. } => "sh.builtin.VarlinkCallFailed",
            ShellError::VarlinkMethodNotFound { .. } => "sh.builtin.VarlinkMethodNotFound",
        }
    }

    /// The parameters object carried next to the error name on the wire.
    pub fn parameters(&self) -> serde_json::Value {
        match self {
            ShellError::InvalidParameter { parameter } => json!({ "parameter": parameter }),
            ShellError::MethodNotFound { method } => json!({ "method": method }),
            ShellError::ExpectedMore { method } => json!({ "method": method }),
            ShellError::ExecFailed {
                command,
                exitcode,
                message,
            } => json!({ "command": command, "exitcode": exitcode, "message": message }),
            ShellError::InvalidJson { message } => json!({ "message": message }),
            ShellError::VarlinkConnectionFailed { address, message } => {
                json!({ "address": address, "message": message })
            }
            ShellError::VarlinkCallFailed {
                method,
                error,
                parameters,
            } => json!({ "method": method, "error": error, "parameters": parameters }),
            ShellError::VarlinkMethodNotFound { method, address } => {
                json!({ "method": method, "address": address })
            }
        }
    }

    /// The `error: <name>: <parameters>` line the read loop prints.
    pub fn report(&self) -> String {
        format!("error: {}: {}", self.name(), self.parameters())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_has_name_and_parameters() {
        let err = ShellError::ExecFailed {
            command: "false".into(),
            exitcode: 1,
            message: "boom".into(),
        };
        assert_eq!(
            err.report(),
            r#"error: sh.builtin.ExecFailed: {"command":"false","exitcode":1,"message":"boom"}"#
        );
    }

    #[test]
    fn invalid_parameter_uses_service_namespace() {
        let err = ShellError::invalid_parameter("foo");
        assert_eq!(err.name(), "org.varlink.service.InvalidParameter");
        assert_eq!(err.parameters(), json!({ "parameter": "foo" }));
    }
}
