// This file is part of the vsh package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

//! Client side of the varlink wire protocol: address parsing, NUL-framed
//! JSON messages, service introspection and parameter coercion.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
#[cfg(unix)]
use std::os::unix::net::UnixStream;

use crate::error::ShellError;
use crate::idl::{self, Interface};
use crate::service::{WireCall, WireReply};
use crate::value::{Record, Value};

/// A parsed varlink endpoint address.
#[derive(Debug, Clone, PartialEq)]
pub enum Address {
    /// `unix:/absolute/path[;mode=NNNN]`
    Unix { path: String, mode: Option<u32> },
    /// `unix:@name` in the Linux abstract namespace.
    UnixAbstract { name: String },
    /// `tcp:host:port` or `tcp:[v6-literal]:port`
    Tcp { host: String, port: u16 },
}

impl Address {
    pub fn parse(address: &str) -> Result<Address, ShellError> {
        let fail = |message: &str| ShellError::VarlinkConnectionFailed {
            address: address.to_string(),
            message: message.to_string(),
        };

        if let Some(rest) = address.strip_prefix("unix:") {
            if let Some(name) = rest.strip_prefix('@') {
                if name.is_empty() {
                    return Err(fail("empty abstract socket name"));
                }
                return Ok(Address::UnixAbstract {
                    name: name.to_string(),
                });
            }
            let mut parts = rest.split(';');
            let path = parts.next().unwrap_or_default();
            if !path.starts_with('/') {
                return Err(fail("unix socket path must be absolute"));
            }
            let mut mode = None;
            for parameter in parts {
                match parameter.split_once('=') {
                    Some(("mode", value)) => {
                        mode = Some(
                            u32::from_str_radix(value, 8)
                                .map_err(|_| fail("invalid mode parameter"))?,
                        );
                    }
                    _ => return Err(fail("unknown address parameter")),
                }
            }
            return Ok(Address::Unix {
                path: path.to_string(),
                mode,
            });
        }

        if let Some(rest) = address.strip_prefix("tcp:") {
            let (host, port) = if let Some(literal) = rest.strip_prefix('[') {
                let (host, rest) = literal
                    .split_once(']')
                    .ok_or_else(|| fail("unterminated IPv6 literal"))?;
                let port = rest
                    .strip_prefix(':')
                    .ok_or_else(|| fail("missing port"))?;
                (host, port)
            } else {
                rest.rsplit_once(':').ok_or_else(|| fail("missing port"))?
            };
            if host.is_empty() {
                return Err(fail("missing host"));
            }
            let port = port.parse().map_err(|_| fail("invalid port"))?;
            return Ok(Address::Tcp {
                host: host.to_string(),
                port,
            });
        }

        Err(fail("unsupported address"))
    }
}

#[derive(Debug)]
enum Transport {
    #[cfg(unix)]
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Transport {
    fn try_clone(&self) -> std::io::Result<Transport> {
        match self {
            #[cfg(unix)]
            Transport::Unix(stream) => stream.try_clone().map(Transport::Unix),
            Transport::Tcp(stream) => stream.try_clone().map(Transport::Tcp),
        }
    }
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            #[cfg(unix)]
            Transport::Unix(stream) => stream.read(buf),
            Transport::Tcp(stream) => stream.read(buf),
        }
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            #[cfg(unix)]
            Transport::Unix(stream) => stream.write(buf),
            Transport::Tcp(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            #[cfg(unix)]
            Transport::Unix(stream) => stream.flush(),
            Transport::Tcp(stream) => stream.flush(),
        }
    }
}

/// One connection to a remote service. The socket is held for the
/// lifetime of the value and released on drop, whatever the outcome.
#[derive(Debug)]
pub struct Connection {
    address: String,
    writer: Transport,
    reader: BufReader<Transport>,
}

impl Connection {
    pub fn connect(address: &str) -> Result<Connection, ShellError> {
        let failed = |message: String| ShellError::VarlinkConnectionFailed {
            address: address.to_string(),
            message,
        };
        let writer = match Address::parse(address)? {
            #[cfg(unix)]
            Address::Unix { path, .. } => UnixStream::connect(&path)
                .map(Transport::Unix)
                .map_err(|e| failed(e.to_string()))?,
            #[cfg(not(unix))]
            Address::Unix { .. } => {
                return Err(failed("unix sockets unsupported on this platform".into()))
            }
            Address::UnixAbstract { name } => {
                connect_abstract(&name).map_err(|message| failed(message))?
            }
            Address::Tcp { host, port } => TcpStream::connect((host.as_str(), port))
                .map(Transport::Tcp)
                .map_err(|e| failed(e.to_string()))?,
        };
        let reader = writer.try_clone().map_err(|e| failed(e.to_string()))?;
        tracing::debug!(%address, "varlink connected");
        Ok(Connection {
            address: address.to_string(),
            writer,
            reader: BufReader::new(reader),
        })
    }

    fn failed(&self, message: impl Into<String>) -> ShellError {
        ShellError::VarlinkConnectionFailed {
            address: self.address.clone(),
            message: message.into(),
        }
    }

    fn send(&mut self, call: &WireCall) -> Result<(), ShellError> {
        let mut frame =
            serde_json::to_vec(call).map_err(|e| self.failed(e.to_string()))?;
        frame.push(0);
        self.writer
            .write_all(&frame)
            .and_then(|_| self.writer.flush())
            .map_err(|e| self.failed(e.to_string()))
    }

    fn recv(&mut self) -> Result<WireReply, ShellError> {
        let mut frame = Vec::new();
        let read = self
            .reader
            .read_until(0, &mut frame)
            .map_err(|e| self.failed(e.to_string()))?;
        if read == 0 || frame.pop() != Some(0) {
            return Err(self.failed("connection closed"));
        }
        serde_json::from_slice(&frame).map_err(|e| self.failed(format!("bad reply frame: {e}")))
    }

    fn reply_record(reply: &WireReply) -> Record {
        match &reply.parameters {
            Some(serde_json::Value::Object(map)) => Record::from_json_object(map),
            _ => Record::new(),
        }
    }

    fn call_error(&self, method: &str, reply: WireReply) -> ShellError {
        ShellError::VarlinkCallFailed {
            method: method.to_string(),
            error: reply.error.unwrap_or_default(),
            parameters: reply
                .parameters
                .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new())),
        }
    }

    /// A plain request–reply call.
    pub fn call(
        &mut self,
        method: &str,
        parameters: Option<serde_json::Value>,
    ) -> Result<Record, ShellError> {
        self.send(&WireCall::new(method, parameters))?;
        let reply = self.recv()?;
        if reply.error.is_some() {
            return Err(self.call_error(method, reply));
        }
        Ok(Self::reply_record(&reply))
    }

    /// A streaming call: issued with `more`, consuming replies until one
    /// arrives without `continues`. A service that rejects `more` with
    /// ExpectedMore is retried as a plain call.
    pub fn call_more(
        &mut self,
        method: &str,
        parameters: Option<serde_json::Value>,
    ) -> Result<Vec<Record>, ShellError> {
        self.send(&WireCall::new(method, parameters.clone()).with_more())?;
        let mut records = Vec::new();
        loop {
            let reply = self.recv()?;
            if let Some(error) = reply.error.as_deref() {
                if error == "org.varlink.service.ExpectedMore" && records.is_empty() {
                    return Ok(vec![self.call(method, parameters)?]);
                }
                return Err(self.call_error(method, reply));
            }
            let continues = reply.continues.unwrap_or(false);
            records.push(Self::reply_record(&reply));
            if !continues {
                return Ok(records);
            }
        }
    }

    /// Interfaces offered by the remote service, from GetInfo.
    pub fn interfaces(&mut self) -> Result<Vec<String>, ShellError> {
        let info = self.call("org.varlink.service.GetInfo", None)?;
        match info.get("interfaces") {
            Some(Value::List(items)) => Ok(items.iter().map(Value::render).collect()),
            _ => Err(self.failed("GetInfo reply carried no interfaces")),
        }
    }

    /// Fetch and parse one interface description.
    pub fn describe(&mut self, interface: &str) -> Result<Interface, ShellError> {
        let reply = self.call(
            "org.varlink.service.GetInterfaceDescription",
            Some(serde_json::json!({ "interface": interface })),
        )?;
        let Some(Value::String(description)) = reply.get("description") else {
            return Err(self.failed("GetInterfaceDescription reply carried no description"));
        };
        idl::parse(description).map_err(|e| self.failed(format!("bad interface description: {e}")))
    }
}

#[cfg(all(unix, target_os = "linux"))]
fn connect_abstract(name: &str) -> Result<Transport, String> {
    use std::os::linux::net::SocketAddrExt;
    let address = std::os::unix::net::SocketAddr::from_abstract_name(name.as_bytes())
        .map_err(|e| e.to_string())?;
    UnixStream::connect_addr(&address)
        .map(Transport::Unix)
        .map_err(|e| e.to_string())
}

#[cfg(not(all(unix, target_os = "linux")))]
fn connect_abstract(_name: &str) -> Result<Transport, String> {
    Err("abstract socket namespace requires Linux".to_string())
}

/// Coerce a `key=value` argument into a typed parameter: booleans,
/// integers, floats and JSON documents are recognised, everything else
/// stays a string.
pub fn coerce(text: &str) -> Value {
    match text {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if looks_integral(text) {
        if let Ok(i) = text.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = text.parse::<f64>() {
            return Value::Float(f);
        }
    }
    if let Ok(f) = text.parse::<f64>() {
        return Value::Float(f);
    }
    if text.starts_with('{') || text.starts_with('[') {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(text) {
            return Value::from_json(&json);
        }
    }
    Value::String(text.to_string())
}

fn looks_integral(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}
