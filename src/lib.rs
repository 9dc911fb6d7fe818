// vsh - an interactive object shell
//
// Commands produce and consume streams of typed records connected by
// `|` pipelines. Every built-in is a method on an embedded varlink
// service; remote services join a pipeline through the varlink command.

pub mod builtins;
pub mod client;
pub mod error;
pub mod idl;
pub mod pipeline;
pub mod render;
pub mod service;
pub mod template;
pub mod value;
