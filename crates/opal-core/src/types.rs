//! Type descriptors
//!
//! A descriptor is an immutable structural token naming one native
//! monomorphization. Descriptors are never evaluated; they are parsed,
//! printed, compared and templated.
//!
//! ```text
//! type    := prim | tuple | generic
//! prim    := bool | i32 | i64 | u32 | u64 | f32 | f64 | String
//! tuple   := "(" type ("," type)* ")"
//! generic := Name [ "<" type ("," type)* ">" ]
//! ```

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::{OpalError, OpalResult};

/// Separator between module, operation and descriptors in entry-point names
pub const SYMBOL_SEPARATOR: &str = "__";

/// Structural type descriptor
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Bool,
    I32,
    I64,
    U32,
    U64,
    F32,
    F64,
    String,
    Tuple(Vec<Type>),
    Generic { name: String, args: Vec<Type> },
}

impl Type {
    /// A bare name such as `SymmetricDistance` or a type parameter `T`
    pub fn named(name: impl Into<String>) -> Self {
        Type::Generic {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn generic(name: impl Into<String>, args: Vec<Type>) -> Self {
        Type::Generic {
            name: name.into(),
            args,
        }
    }

    /// `Vec<inner>`
    pub fn vec(inner: Type) -> Self {
        Type::generic("Vec", vec![inner])
    }

    /// Parse a single descriptor
    pub fn parse(text: &str) -> OpalResult<Self> {
        let mut parser = Parser::new(text);
        let ty = parser.ty()?;
        parser.finish()?;
        Ok(ty)
    }

    /// Parse a type-argument blob such as `<SymmetricDistance,L1Sensitivity<f64>>`.
    /// An empty blob yields no arguments.
    pub fn parse_args(text: &str) -> OpalResult<Vec<Self>> {
        let mut parser = Parser::new(text);
        parser.skip_ws();
        if parser.at_end() {
            return Ok(Vec::new());
        }
        parser.expect('<')?;
        let args = parser.list('>')?;
        parser.finish()?;
        Ok(args)
    }

    /// Render a list of descriptors as a type-argument blob
    pub fn args_blob(args: &[Type]) -> String {
        if args.is_empty() {
            return String::new();
        }
        let inner: Vec<String> = args.iter().map(Type::to_string).collect();
        format!("<{}>", inner.join(","))
    }

    /// Replace bare names bound in `bindings`
    pub fn substitute(&self, bindings: &HashMap<String, Type>) -> Type {
        match self {
            Type::Generic { name, args } if args.is_empty() => {
                bindings.get(name).cloned().unwrap_or_else(|| self.clone())
            }
            Type::Generic { name, args } => Type::Generic {
                name: name.clone(),
                args: args.iter().map(|a| a.substitute(bindings)).collect(),
            },
            Type::Tuple(items) => {
                Type::Tuple(items.iter().map(|a| a.substitute(bindings)).collect())
            }
            _ => self.clone(),
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::F32 | Type::F64)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::I32 | Type::I64 | Type::U32 | Type::U64)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_float() || self.is_integer()
    }

    /// Primitive scalars and `String`
    pub fn is_primitive(&self) -> bool {
        self.is_numeric() || matches!(self, Type::Bool | Type::String)
    }

    /// Element type of `Vec<T>`
    pub fn element(&self) -> Option<&Type> {
        match self {
            Type::Generic { name, args } if name == "Vec" && args.len() == 1 => Some(&args[0]),
            _ => None,
        }
    }

    /// Name and arguments of a generic descriptor
    pub fn as_generic(&self) -> Option<(&str, &[Type])> {
        match self {
            Type::Generic { name, args } => Some((name.as_str(), args.as_slice())),
            _ => None,
        }
    }

    fn primitive(name: &str) -> Option<Type> {
        Some(match name {
            "bool" => Type::Bool,
            "i32" => Type::I32,
            "i64" => Type::I64,
            "u32" => Type::U32,
            "u64" => Type::U64,
            "f32" => Type::F32,
            "f64" => Type::F64,
            "String" => Type::String,
            _ => return None,
        })
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => f.write_str("bool"),
            Type::I32 => f.write_str("i32"),
            Type::I64 => f.write_str("i64"),
            Type::U32 => f.write_str("u32"),
            Type::U64 => f.write_str("u64"),
            Type::F32 => f.write_str("f32"),
            Type::F64 => f.write_str("f64"),
            Type::String => f.write_str("String"),
            Type::Tuple(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str(")")
            }
            Type::Generic { name, args } => {
                f.write_str(name)?;
                if !args.is_empty() {
                    f.write_str("<")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            f.write_str(",")?;
                        }
                        write!(f, "{}", arg)?;
                    }
                    f.write_str(">")?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for Type {
    type Err = OpalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Type::parse(s)
    }
}

/// Canonical entry-point name for an instantiation
pub fn symbol_name(module: &str, operation: &str, descriptors: &[Type]) -> String {
    let mut symbol = format!("{}{}{}", module, SYMBOL_SEPARATOR, operation);
    for descriptor in descriptors {
        symbol.push_str(SYMBOL_SEPARATOR);
        symbol.push_str(&descriptor.to_string());
    }
    symbol
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Parser { src, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> OpalResult<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", expected)))
        }
    }

    fn finish(&mut self) -> OpalResult<()> {
        self.skip_ws();
        if self.at_end() {
            Ok(())
        } else {
            Err(self.error("trailing characters"))
        }
    }

    fn ident(&mut self) -> OpalResult<&'a str> {
        self.skip_ws();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !(c.is_alphanumeric() || c == '_' || c == ':') {
                break;
            }
            self.pos += c.len_utf8();
        }
        if start == self.pos {
            return Err(self.error("expected a type name"));
        }
        Ok(&self.src[start..self.pos])
    }

    fn ty(&mut self) -> OpalResult<Type> {
        if self.eat('(') {
            return Ok(Type::Tuple(self.list(')')?));
        }
        let name = self.ident()?;
        if let Some(prim) = Type::primitive(name) {
            self.skip_ws();
            if self.peek() == Some('<') {
                return Err(self.error(&format!("primitive {} takes no arguments", name)));
            }
            return Ok(prim);
        }
        let args = if self.eat('<') {
            let args = self.list('>')?;
            if args.is_empty() {
                return Err(self.error("empty argument list"));
            }
            args
        } else {
            Vec::new()
        };
        Ok(Type::Generic {
            name: name.to_string(),
            args,
        })
    }

    /// Comma separated types up to and including `close`
    fn list(&mut self, close: char) -> OpalResult<Vec<Type>> {
        let mut items = Vec::new();
        if self.eat(close) {
            return Ok(items);
        }
        loop {
            items.push(self.ty()?);
            if self.eat(',') {
                continue;
            }
            self.expect(close)?;
            return Ok(items);
        }
    }

    fn error(&self, what: &str) -> OpalError {
        OpalError::TypeParse(format!("{} at offset {} in {:?}", what, self.pos, self.src))
    }
}
