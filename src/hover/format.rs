//! One rendering rule per symbol kind.

use crate::hover::HoverFragment;
use crate::types::ty::{render_interface_block, render_struct_block};
use crate::types::{Symbol, SymbolKind, Type};

/// Signature fragments followed by the rendered doc comment, if any.
pub fn describe(symbol: &Symbol) -> Vec<HoverFragment> {
    let mut fragments = signature(symbol);
    if let Some(doc) = symbol.doc.as_deref().map(render_doc) {
        if !doc.is_empty() {
            fragments.push(HoverFragment::Text(doc));
        }
    }
    fragments
}

/// Rendered relative to the declaring package, so the text never depends on
/// where the hover happens.
pub fn signature(symbol: &Symbol) -> Vec<HoverFragment> {
    let context = symbol.package();
    let name = symbol.name();

    let code = match &symbol.kind {
        SymbolKind::Func {
            receiver: None,
            signature,
        } => format!("func {}{}", name, signature.render(context)),
        SymbolKind::Func {
            receiver: Some(receiver),
            signature,
        } => format!(
            "func ({}) {}{}",
            receiver.render(context),
            name,
            signature.render(context)
        ),
        SymbolKind::Var { ty } => format!("var {} {}", name, ty.render(context)),
        SymbolKind::Const { ty, value: Some(value) } => {
            format!("const {} {} = {}", name, ty.render(context), value)
        }
        SymbolKind::Const { ty, value: None } => {
            format!("const {} {}", name, ty.render(context))
        }
        SymbolKind::Field { ty, .. } => format!("struct field {} {}", name, ty.render(context)),
        SymbolKind::Package { .. } => format!("package {}", name),
        SymbolKind::Builtin => format!("builtin {}", name),
        SymbolKind::TypeName {
            named,
            underlying,
            alias,
        } => return type_name(symbol, named, underlying, *alias),
    };
    vec![HoverFragment::Code(code)]
}

fn type_name(symbol: &Symbol, named: &Type, underlying: &Type, alias: bool) -> Vec<HoverFragment> {
    let context = symbol.package();
    let name = symbol.name();

    if context.is_empty() || matches!(named, Type::Raw(_)) {
        return vec![HoverFragment::Code(format!("type {}", name))];
    }
    if alias {
        return vec![HoverFragment::Code(format!(
            "type {} = {}",
            name,
            underlying.render(context)
        ))];
    }
    match underlying {
        Type::Struct(fields) => vec![
            HoverFragment::Code(format!("type {} struct", name)),
            HoverFragment::Code(render_struct_block(fields, context)),
        ],
        Type::Interface(elems) => vec![
            HoverFragment::Code(format!("type {} interface", name)),
            HoverFragment::Code(render_interface_block(elems, context)),
        ],
        other => vec![HoverFragment::Code(format!(
            "type {} {}",
            name,
            other.render(context)
        ))],
    }
}

/// Reflows a doc comment: lines of a paragraph are each followed by a space
/// and every paragraph ends in a blank line. Indented blocks keep their
/// line structure.
pub fn render_doc(doc: &str) -> String {
    let mut out = String::new();
    let mut paragraph: Vec<&str> = Vec::new();

    for line in doc.lines().chain(std::iter::once("")) {
        if !line.trim().is_empty() {
            paragraph.push(line);
            continue;
        }
        if paragraph.is_empty() {
            continue;
        }
        let preformatted = paragraph
            .iter()
            .all(|line| line.starts_with([' ', '\t']));
        for line in paragraph.drain(..) {
            if preformatted {
                out.push_str(line);
                out.push('\n');
            } else {
                out.push_str(line.trim());
                out.push(' ');
            }
        }
        out.push_str(if preformatted { "\n" } else { "\n\n" });
    }
    out
}
