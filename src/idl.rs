// Parser for the varlink interface definition format: interfaces with
// doc-commented methods, type aliases and errors.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("interface definition line {line}: {message}")]
pub struct IdlError {
    pub line: usize,
    pub message: String,
}

/// A parsed interface: dotted name, doc string and ordered members.
#[derive(Debug, Clone, PartialEq)]
pub struct Interface {
    pub name: String,
    pub doc: String,
    pub members: Vec<Member>,
}

impl Interface {
    pub fn methods(&self) -> impl Iterator<Item = &Method> {
        self.members.iter().filter_map(|member| match member {
            Member::Method(method) => Some(method),
            _ => None,
        })
    }

    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods().find(|method| method.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    Method(Method),
    Alias(TypeDef),
    Error(ErrorDef),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub name: String,
    pub doc: String,
    pub input: StructType,
    pub output: StructType,
}

impl Method {
    /// `(in...) -> (out...)`, as shown by varlink introspection listings.
    pub fn signature(&self) -> String {
        format!("{} -> {}", self.input, self.output)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    pub name: String,
    pub doc: String,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorDef {
    pub name: String,
    pub doc: String,
    pub parameters: StructType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructType {
    pub fields: Vec<Field>,
}

impl StructType {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeRef {
    pub optional: bool,
    pub kind: TypeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Bool,
    Int,
    Float,
    String,
    Object,
    Array(Box<TypeRef>),
    Map(Box<TypeRef>),
    Named(String),
    Struct(StructType),
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.optional {
            write!(f, "?")?;
        }
        match &self.kind {
            TypeKind::Bool => write!(f, "bool"),
            TypeKind::Int => write!(f, "int"),
            TypeKind::Float => write!(f, "float"),
            TypeKind::String => write!(f, "string"),
            TypeKind::Object => write!(f, "object"),
            TypeKind::Array(inner) => write!(f, "[]{inner}"),
            TypeKind::Map(inner) => write!(f, "[string]{inner}"),
            TypeKind::Named(name) => write!(f, "{name}"),
            TypeKind::Struct(fields) => write!(f, "{fields}"),
        }
    }
}

impl fmt::Display for StructType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", field.name, field.ty)?;
        }
        write!(f, ")")
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Name(String),
    Comment(String),
    LParen,
    RParen,
    Comma,
    Colon,
    Arrow,
    Array,
    StringMap,
    Question,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Name(name) => write!(f, "'{name}'"),
            Token::Comment(_) => write!(f, "comment"),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
            Token::Comma => write!(f, "','"),
            Token::Colon => write!(f, "':'"),
            Token::Arrow => write!(f, "'->'"),
            Token::Array => write!(f, "'[]'"),
            Token::StringMap => write!(f, "'[string]'"),
            Token::Question => write!(f, "'?'"),
        }
    }
}

fn lex(text: &str) -> Result<Vec<(usize, Token)>, IdlError> {
    let mut tokens = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw.trim_start();
        if let Some(comment) = trimmed.strip_prefix('#') {
            let comment = comment.strip_prefix(' ').unwrap_or(comment);
            tokens.push((line, Token::Comment(comment.trim_end().to_string())));
            continue;
        }

        let mut chars = trimmed.char_indices().peekable();
        while let Some((at, ch)) = chars.next() {
            match ch {
                c if c.is_whitespace() => {}
                '(' => tokens.push((line, Token::LParen)),
                ')' => tokens.push((line, Token::RParen)),
                ',' => tokens.push((line, Token::Comma)),
                ':' => tokens.push((line, Token::Colon)),
                '?' => tokens.push((line, Token::Question)),
                '-' => match chars.next() {
                    Some((_, '>')) => tokens.push((line, Token::Arrow)),
                    _ => {
                        return Err(IdlError {
                            line,
                            message: "expected '->'".to_string(),
                        })
                    }
                },
                '[' => {
                    let rest = &trimmed[at..];
                    if rest.starts_with("[]") {
                        chars.next();
                        tokens.push((line, Token::Array));
                    } else if rest.starts_with("[string]") {
                        for _ in 0.."string]".len() {
                            chars.next();
                        }
                        tokens.push((line, Token::StringMap));
                    } else {
                        return Err(IdlError {
                            line,
                            message: "expected '[]' or '[string]'".to_string(),
                        });
                    }
                }
                c if c.is_ascii_alphabetic() || c == '_' => {
                    let mut name = String::new();
                    name.push(c);
                    while let Some((_, next)) = chars.peek() {
                        if next.is_ascii_alphanumeric() || *next == '_' || *next == '.' {
                            name.push(*next);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    tokens.push((line, Token::Name(name)));
                }
                other => {
                    return Err(IdlError {
                        line,
                        message: format!("unexpected character '{other}'"),
                    })
                }
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    pending_doc: Vec<String>,
    last_line: usize,
}

impl Parser {
    // Next non-comment token; comments accumulate for the next member.
    fn next(&mut self) -> Option<(usize, Token)> {
        while let Some((line, token)) = self.tokens.get(self.pos).cloned() {
            self.pos += 1;
            self.last_line = line;
            match token {
                Token::Comment(text) => self.pending_doc.push(text),
                other => return Some((line, other)),
            }
        }
        None
    }

    fn peek(&mut self) -> Option<&Token> {
        let mut ahead = self.pos;
        while let Some((_, token)) = self.tokens.get(ahead) {
            if let Token::Comment(text) = token {
                self.pending_doc.push(text.clone());
                self.pos = ahead + 1;
                ahead += 1;
            } else {
                self.pos = ahead;
                return self.tokens.get(ahead).map(|(_, t)| t);
            }
        }
        self.pos = ahead;
        None
    }

    fn take_doc(&mut self) -> String {
        std::mem::take(&mut self.pending_doc).join("\n")
    }

    fn error(&self, message: impl Into<String>) -> IdlError {
        IdlError {
            line: self.last_line.max(1),
            message: message.into(),
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), IdlError> {
        match self.next() {
            Some((_, token)) if token == expected => Ok(()),
            Some((line, token)) => Err(IdlError {
                line,
                message: format!("expected {expected}, found {token}"),
            }),
            None => Err(self.error(format!("expected {expected}, found end of input"))),
        }
    }

    fn expect_name(&mut self) -> Result<String, IdlError> {
        match self.next() {
            Some((_, Token::Name(name))) => Ok(name),
            Some((line, token)) => Err(IdlError {
                line,
                message: format!("expected a name, found {token}"),
            }),
            None => Err(self.error("expected a name, found end of input")),
        }
    }

    fn parse_interface(&mut self) -> Result<Interface, IdlError> {
        // Comments ahead of the interface keyword document the interface.
        self.peek();
        let doc = match self.next() {
            Some((_, Token::Name(kw))) if kw == "interface" => self.take_doc(),
            _ => return Err(self.error("expected 'interface'")),
        };
        let name = self.expect_name()?;
        validate_interface_name(&name).map_err(|message| self.error(message))?;

        let mut members = Vec::new();
        loop {
            if self.peek().is_none() {
                break;
            }
            let keyword = self.expect_name()?;
            let doc = self.take_doc();
            match keyword.as_str() {
                "method" => {
                    let name = self.expect_name()?;
                    let input = self.parse_struct()?;
                    self.expect(Token::Arrow)?;
                    let output = self.parse_struct()?;
                    members.push(Member::Method(Method {
                        name,
                        doc,
                        input,
                        output,
                    }));
                }
                "type" => {
                    let name = self.expect_name()?;
                    let ty = self.parse_type()?;
                    members.push(Member::Alias(TypeDef { name, doc, ty }));
                }
                "error" => {
                    let name = self.expect_name()?;
                    let parameters = self.parse_struct()?;
                    members.push(Member::Error(ErrorDef {
                        name,
                        doc,
                        parameters,
                    }));
                }
                other => {
                    return Err(self.error(format!(
                        "expected 'method', 'type' or 'error', found '{other}'"
                    )))
                }
            }
        }

        Ok(Interface { name, doc, members })
    }

    fn parse_struct(&mut self) -> Result<StructType, IdlError> {
        self.expect(Token::LParen)?;
        let mut fields = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.next();
            return Ok(StructType { fields });
        }
        loop {
            let name = self.expect_name()?;
            self.expect(Token::Colon)?;
            let ty = self.parse_type()?;
            fields.push(Field { name, ty });
            match self.next() {
                Some((_, Token::Comma)) => {}
                Some((_, Token::RParen)) => break,
                Some((line, token)) => {
                    return Err(IdlError {
                        line,
                        message: format!("expected ',' or ')', found {token}"),
                    })
                }
                None => return Err(self.error("unterminated struct")),
            }
        }
        Ok(StructType { fields })
    }

    fn parse_type(&mut self) -> Result<TypeRef, IdlError> {
        let optional = if self.peek() == Some(&Token::Question) {
            self.next();
            true
        } else {
            false
        };
        let kind = match self.peek() {
            Some(Token::Array) => {
                self.next();
                TypeKind::Array(Box::new(self.parse_type()?))
            }
            Some(Token::StringMap) => {
                self.next();
                TypeKind::Map(Box::new(self.parse_type()?))
            }
            Some(Token::LParen) => TypeKind::Struct(self.parse_struct()?),
            Some(Token::Name(_)) => {
                let name = self.expect_name()?;
                match name.as_str() {
                    "bool" => TypeKind::Bool,
                    "int" => TypeKind::Int,
                    "float" => TypeKind::Float,
                    "string" => TypeKind::String,
                    "object" => TypeKind::Object,
                    _ => TypeKind::Named(name),
                }
            }
            _ => return Err(self.error("expected a type")),
        };
        Ok(TypeRef { optional, kind })
    }
}

fn validate_interface_name(name: &str) -> Result<(), String> {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() < 2 {
        return Err(format!("interface name '{name}' is not dotted"));
    }
    for part in parts {
        let valid = part
            .chars()
            .next()
            .map(|c| c.is_ascii_alphabetic())
            .unwrap_or(false)
            && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(format!("invalid interface name segment '{part}'"));
        }
    }
    Ok(())
}

/// Parse an interface definition document.
pub fn parse(text: &str) -> Result<Interface, IdlError> {
    let tokens = lex(text)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        pending_doc: Vec::new(),
        last_line: 1,
    };
    parser.parse_interface()
}
