//! Definition replay: placeholder substitution and statement splitting.

use crate::core::quote_ident;
use crate::error::Result;

/// Placeholder replaced with the quoted target database.
pub const DATABASE_PLACEHOLDER: &str = "${database}";
/// Placeholder replaced with the quoted target schema.
pub const SCHEMA_PLACEHOLDER: &str = "${schema}";

/// Replace namespace placeholders with quoted target identifiers.
pub fn substitute(ddl: &str, database: &str, schema: &str) -> Result<String> {
    Ok(ddl
        .replace(DATABASE_PLACEHOLDER, &quote_ident(database)?)
        .replace(SCHEMA_PLACEHOLDER, &quote_ident(schema)?))
}

/// Split a definition file into executable statements.
///
/// Splits on `;` outside quotes, drops each statement's leading comment and
/// blank lines, and skips statements left empty.
pub fn statements(ddl: &str) -> Vec<String> {
    split_statements(ddl)
        .into_iter()
        .filter_map(|stmt| {
            let body: Vec<&str> = stmt
                .lines()
                .skip_while(|l| {
                    let t = l.trim();
                    t.is_empty() || t.starts_with("--")
                })
                .collect();
            let body = body.join("\n").trim().to_string();
            (!body.is_empty()).then_some(body)
        })
        .collect()
}

fn split_statements(ddl: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut quote: Option<char> = None;
    let mut in_comment = false;
    let mut start = 0;
    let mut chars = ddl.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if in_comment {
            in_comment = c != '\n';
            continue;
        }
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '-' if matches!(chars.peek(), Some((_, '-'))) => in_comment = true,
                ';' => {
                    out.push(&ddl[start..i]);
                    start = i + 1;
                }
                _ => {}
            },
        }
    }
    out.push(&ddl[start..]);
    out
}
