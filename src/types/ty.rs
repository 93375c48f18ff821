//! Go types as seen by the checker, and their textual rendering.

use std::fmt::{self, Write};
use std::sync::Arc;

use crate::types::symbol::Symbol;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    /// Predeclared basic type such as `int` or `string`.
    Basic(String),
    /// A declared type, referenced by name.
    Named(NamedType),
    Pointer(Box<Type>),
    Slice(Box<Type>),
    Array(String, Box<Type>),
    Map(Box<Type>, Box<Type>),
    Chan(ChanDir, Box<Type>),
    Func(Box<Signature>),
    Struct(Vec<Field>),
    Interface(Vec<InterfaceElem>),
    /// Multiple results of a call.
    Tuple(Vec<Type>),
    /// A type expression outside the modelled subset, kept as written.
    Raw(String),
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamedType {
    /// Import path of the declaring package; empty for the universe.
    pub package: String,
    pub package_name: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChanDir {
    Both,
    Send,
    Recv,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Signature {
    pub params: Vec<Param>,
    pub results: Vec<Param>,
    /// The last parameter is `...T`; its type is stored as `[]T`.
    pub variadic: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: Option<String>,
    pub ty: Type,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    pub embedded: bool,
    pub symbol: Option<Arc<Symbol>>,
}

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.ty == other.ty && self.embedded == other.embedded
    }
}

impl Eq for Field {}

#[derive(Debug, Clone)]
pub enum InterfaceElem {
    Method {
        name: String,
        signature: Signature,
        symbol: Option<Arc<Symbol>>,
    },
    Embedded(Type),
}

impl PartialEq for InterfaceElem {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                InterfaceElem::Method {
                    name: a,
                    signature: sa,
                    ..
                },
                InterfaceElem::Method {
                    name: b,
                    signature: sb,
                    ..
                },
            ) => a == b && sa == sb,
            (InterfaceElem::Embedded(a), InterfaceElem::Embedded(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for InterfaceElem {}

impl Type {
    pub fn basic(name: &str) -> Self {
        Type::Basic(name.to_string())
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Type::Invalid)
    }

    /// Strips one level of pointer indirection.
    pub fn deref(&self) -> &Type {
        match self {
            Type::Pointer(inner) => inner,
            other => other,
        }
    }

    /// Renders the type as seen from the package at import path `context`:
    /// names declared there are unqualified, everything else is qualified by
    /// its package name.
    pub fn render(&self, context: &str) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = write_type(&mut out, self, context);
        out
    }
}

impl Signature {
    /// `(a int, b ...string) (n int, err error)`
    pub fn render(&self, context: &str) -> String {
        let mut out = String::new();
        let _ = write_signature(&mut out, self, context);
        out
    }

    pub fn result_type(&self) -> Type {
        match self.results.as_slice() {
            [] => Type::Tuple(Vec::new()),
            [single] => single.ty.clone(),
            many => Type::Tuple(many.iter().map(|param| param.ty.clone()).collect()),
        }
    }
}

impl Param {
    pub fn render(&self, context: &str) -> String {
        match &self.name {
            Some(name) => format!("{} {}", name, self.ty.render(context)),
            None => self.ty.render(context),
        }
    }
}

/// Multi-line expansion of a struct literal type, one field per line.
pub fn render_struct_block(fields: &[Field], context: &str) -> String {
    if fields.is_empty() {
        return "struct{}".to_string();
    }
    let mut out = String::from("struct {\n");
    for field in fields {
        if field.embedded {
            let _ = writeln!(out, "    {}", field.ty.render(context));
        } else {
            let _ = writeln!(out, "    {} {}", field.name, field.ty.render(context));
        }
    }
    out.push('}');
    out
}

/// Multi-line expansion of an interface literal type, one element per line.
pub fn render_interface_block(elems: &[InterfaceElem], context: &str) -> String {
    if elems.is_empty() {
        return "interface{}".to_string();
    }
    let mut out = String::from("interface {\n");
    for elem in elems {
        let _ = writeln!(out, "    {}", render_interface_elem(elem, context));
    }
    out.push('}');
    out
}

fn render_interface_elem(elem: &InterfaceElem, context: &str) -> String {
    match elem {
        InterfaceElem::Method {
            name, signature, ..
        } => format!("{}{}", name, signature.render(context)),
        InterfaceElem::Embedded(ty) => ty.render(context),
    }
}

fn write_type(out: &mut String, ty: &Type, context: &str) -> fmt::Result {
    match ty {
        Type::Basic(name) => out.write_str(name),
        Type::Named(named) => {
            if named.package.is_empty() || named.package == context {
                out.write_str(&named.name)
            } else {
                write!(out, "{}.{}", named.package_name, named.name)
            }
        }
        Type::Pointer(inner) => {
            out.write_char('*')?;
            write_type(out, inner, context)
        }
        Type::Slice(elem) => {
            out.write_str("[]")?;
            write_type(out, elem, context)
        }
        Type::Array(len, elem) => {
            write!(out, "[{}]", len)?;
            write_type(out, elem, context)
        }
        Type::Map(key, value) => {
            out.write_str("map[")?;
            write_type(out, key, context)?;
            out.write_char(']')?;
            write_type(out, value, context)
        }
        Type::Chan(dir, elem) => {
            out.write_str(match dir {
                ChanDir::Both => "chan ",
                ChanDir::Send => "chan<- ",
                ChanDir::Recv => "<-chan ",
            })?;
            write_type(out, elem, context)
        }
        Type::Func(signature) => {
            out.write_str("func")?;
            write_signature(out, signature, context)
        }
        Type::Struct(fields) => {
            if fields.is_empty() {
                return out.write_str("struct{}");
            }
            out.write_str("struct{")?;
            for (i, field) in fields.iter().enumerate() {
                if i > 0 {
                    out.write_str("; ")?;
                }
                if !field.embedded {
                    write!(out, "{} ", field.name)?;
                }
                write_type(out, &field.ty, context)?;
            }
            out.write_char('}')
        }
        Type::Interface(elems) => {
            if elems.is_empty() {
                return out.write_str("interface{}");
            }
            out.write_str("interface{")?;
            for (i, elem) in elems.iter().enumerate() {
                if i > 0 {
                    out.write_str("; ")?;
                }
                out.write_str(&render_interface_elem(elem, context))?;
            }
            out.write_char('}')
        }
        Type::Tuple(types) => {
            out.write_char('(')?;
            for (i, ty) in types.iter().enumerate() {
                if i > 0 {
                    out.write_str(", ")?;
                }
                write_type(out, ty, context)?;
            }
            out.write_char(')')
        }
        Type::Raw(text) => out.write_str(text),
        Type::Invalid => out.write_str("invalid type"),
    }
}

fn write_signature(out: &mut String, signature: &Signature, context: &str) -> fmt::Result {
    out.write_char('(')?;
    let last = signature.params.len().saturating_sub(1);
    for (i, param) in signature.params.iter().enumerate() {
        if i > 0 {
            out.write_str(", ")?;
        }
        if let Some(name) = &param.name {
            write!(out, "{} ", name)?;
        }
        match &param.ty {
            Type::Slice(elem) if signature.variadic && i == last => {
                out.write_str("...")?;
                write_type(out, elem, context)?;
            }
            ty => write_type(out, ty, context)?,
        }
    }
    out.write_char(')')?;

    match signature.results.as_slice() {
        [] => Ok(()),
        [single] if single.name.is_none() => {
            out.write_char(' ')?;
            write_type(out, &single.ty, context)
        }
        results => {
            out.write_str(" (")?;
            for (i, result) in results.iter().enumerate() {
                if i > 0 {
                    out.write_str(", ")?;
                }
                out.write_str(&result.render(context))?;
            }
            out.write_char(')')
        }
    }
}
