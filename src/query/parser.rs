/// Query text → columns.
///
/// Hand-rolled single-pass scanner. Columns split on whitespace at bracket
/// depth zero, so `[modelId=a-1, modelId=a-2]` stays one column. Bracket
/// balance is enforced; everything else is lenient — unknown attribute
/// names parse fine and simply match nothing downstream.
use crate::error::{ScoringError, ScoringResult};

/// One attribute occurrence inside `[…]` or `(…)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub name: String,
    /// `None` for the bare truthy form (`(isComplete)`).
    pub value: Option<String>,
}

impl Attr {
    fn parse(text: &str) -> Self {
        let text = text.trim();
        // "#x" is shorthand for id=x.
        if let Some(id) = text.strip_prefix('#') {
            return Self {
                name: "id".to_string(),
                value: Some(id.to_string()),
            };
        }
        match text.split_once('=') {
            Some((name, value)) => Self {
                name: name.trim().to_string(),
                value: Some(value.trim().to_string()),
            },
            None => Self {
                name: text.to_string(),
                value: None,
            },
        }
    }
}

/// The leading selector of a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Primary {
    /// `#id`
    Id(String),
    /// bare type name
    Type(String),
}

/// One parsed column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryColumn {
    pub primary: Option<Primary>,
    /// `[…]` clauses: selects, multiplied into where-objects.
    pub selects: Vec<Vec<Attr>>,
    /// `(…)` clauses, flattened: applied after intersection.
    pub filters: Vec<Attr>,
}

/// Parse a full query into columns. Unbalanced brackets are an error;
/// an all-whitespace query parses to no columns.
pub fn parse_query(query: &str) -> ScoringResult<Vec<QueryColumn>> {
    split_columns(query)?
        .into_iter()
        .map(|column| parse_column(query, &column))
        .collect()
}

/// Split on whitespace outside brackets, verifying balance as we go.
fn split_columns(query: &str) -> ScoringResult<Vec<String>> {
    let mut columns = Vec::new();
    let mut current = String::new();
    let mut depth = 0u32;
    for c in query.chars() {
        match c {
            '[' | '(' => {
                if depth > 0 {
                    return Err(malformed(query, "nested brackets"));
                }
                depth += 1;
                current.push(c);
            }
            ']' | ')' => {
                if depth == 0 {
                    return Err(malformed(query, "unbalanced closing bracket"));
                }
                depth -= 1;
                current.push(c);
            }
            c if c.is_whitespace() && depth == 0 => {
                if !current.is_empty() {
                    columns.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if depth != 0 {
        return Err(malformed(query, "unbalanced opening bracket"));
    }
    if !current.is_empty() {
        columns.push(current);
    }
    Ok(columns)
}

fn parse_column(query: &str, text: &str) -> ScoringResult<QueryColumn> {
    let mut column = QueryColumn::default();
    let mut rest = text;

    // Primary runs to the first clause opener.
    let head_len = rest
        .find(['[', '('])
        .unwrap_or(rest.len());
    let head = &rest[..head_len];
    if !head.is_empty() {
        column.primary = Some(match head.strip_prefix('#') {
            Some(id) => Primary::Id(id.to_string()),
            None => Primary::Type(head.to_string()),
        });
    }
    rest = &rest[head_len..];

    while !rest.is_empty() {
        let (open, close, is_select) = match rest.as_bytes()[0] {
            b'[' => ('[', ']', true),
            b'(' => ('(', ')', false),
            _ => return Err(malformed(query, "attributes must follow the primary")),
        };
        let Some(end) = rest.find(close) else {
            return Err(malformed(query, "unbalanced opening bracket"));
        };
        let inner = &rest[open.len_utf8()..end];
        let attrs: Vec<Attr> = inner
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(Attr::parse)
            .collect();
        if is_select {
            column.selects.push(attrs);
        } else {
            column.filters.extend(attrs);
        }
        rest = &rest[end + close.len_utf8()..];
    }
    Ok(column)
}

fn malformed(query: &str, reason: &str) -> ScoringError {
    ScoringError::MalformedQuery {
        query: query.to_string(),
        reason: reason.to_string(),
    }
}
