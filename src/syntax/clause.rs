//! Package clause scanning.
//!
//! Membership resolution only needs the package name of every file in a
//! directory, so this reads just far enough to find it instead of building a
//! full syntax tree.

/// Returns the name declared by the file's `package` clause, if any.
pub fn package_name(source: &str) -> Option<&str> {
    let rest = skip_trivia(source);
    let rest = rest.strip_prefix("package")?;
    if !rest.starts_with(|c: char| c.is_whitespace() || c == '/') {
        return None;
    }
    let rest = skip_trivia(rest);
    let len = rest
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    let name = &rest[..len];
    let starts_like_ident = name
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_');
    starts_like_ident.then_some(name)
}

fn skip_trivia(mut source: &str) -> &str {
    loop {
        source = source.trim_start();
        if let Some(rest) = source.strip_prefix("//") {
            source = rest.find('\n').map(|i| &rest[i..]).unwrap_or("");
        } else if let Some(rest) = source.strip_prefix("/*") {
            source = rest.find("*/").map(|i| &rest[i + 2..]).unwrap_or("");
        } else {
            return source;
        }
    }
}
