//! Predeclared identifiers.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::types::symbol::{Symbol, SymbolId, SymbolKind};
use crate::types::ty::{InterfaceElem, NamedType, Param, Signature, Type};

const BASIC_TYPES: &[&str] = &[
    "bool",
    "byte",
    "complex64",
    "complex128",
    "float32",
    "float64",
    "int",
    "int8",
    "int16",
    "int32",
    "int64",
    "rune",
    "string",
    "uint",
    "uint8",
    "uint16",
    "uint32",
    "uint64",
    "uintptr",
    "any",
    "comparable",
];

const BUILTIN_FUNCS: &[&str] = &[
    "append", "cap", "clear", "close", "complex", "copy", "delete", "imag", "len", "make", "max",
    "min", "new", "panic", "print", "println", "real", "recover",
];

fn symbol(name: &str, kind: SymbolKind) -> Arc<Symbol> {
    Arc::new(Symbol {
        id: SymbolId {
            package: String::new(),
            name: name.to_string(),
            file: None,
            offset: 0,
        },
        package_name: String::new(),
        kind,
        doc: None,
        location: None,
    })
}

fn error_type() -> Type {
    Type::Named(NamedType {
        package: String::new(),
        package_name: String::new(),
        name: "error".to_string(),
    })
}

fn universe() -> &'static HashMap<&'static str, Arc<Symbol>> {
    static UNIVERSE: OnceLock<HashMap<&'static str, Arc<Symbol>>> = OnceLock::new();
    UNIVERSE.get_or_init(|| {
        let mut scope = HashMap::new();
        for name in BASIC_TYPES {
            let underlying = match *name {
                "any" => Type::Interface(Vec::new()),
                other => Type::basic(other),
            };
            scope.insert(
                *name,
                symbol(
                    name,
                    SymbolKind::TypeName {
                        named: Type::basic(name),
                        underlying,
                        alias: *name == "any" || *name == "byte" || *name == "rune",
                    },
                ),
            );
        }

        let error_method = symbol(
            "Error",
            SymbolKind::Func {
                receiver: Some(Param {
                    name: None,
                    ty: error_type(),
                }),
                signature: Signature {
                    params: Vec::new(),
                    results: vec![Param {
                        name: None,
                        ty: Type::basic("string"),
                    }],
                    variadic: false,
                },
            },
        );
        scope.insert(
            "error",
            symbol(
                "error",
                SymbolKind::TypeName {
                    named: error_type(),
                    underlying: Type::Interface(vec![InterfaceElem::Method {
                        name: "Error".to_string(),
                        signature: Signature {
                            params: Vec::new(),
                            results: vec![Param {
                                name: None,
                                ty: Type::basic("string"),
                            }],
                            variadic: false,
                        },
                        symbol: Some(error_method),
                    }]),
                    alias: false,
                },
            ),
        );

        for (name, ty) in [("true", "bool"), ("false", "bool"), ("iota", "int")] {
            scope.insert(
                name,
                symbol(
                    name,
                    SymbolKind::Const {
                        ty: Type::basic(ty),
                        value: None,
                    },
                ),
            );
        }

        for name in BUILTIN_FUNCS {
            scope.insert(*name, symbol(name, SymbolKind::Builtin));
        }
        scope
    })
}

pub fn lookup(name: &str) -> Option<Arc<Symbol>> {
    universe().get(name).cloned()
}

pub fn is_builtin_func(name: &str) -> bool {
    BUILTIN_FUNCS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_predeclared_types_and_builtins() {
        let int = lookup("int").unwrap();
        assert!(int.is_type_name());
        assert_eq!(int.value_type(), Type::basic("int"));

        let len = lookup("len").unwrap();
        assert_eq!(len.kind, SymbolKind::Builtin);
        assert!(is_builtin_func("len"));

        assert!(lookup("Println").is_none());
    }
}
