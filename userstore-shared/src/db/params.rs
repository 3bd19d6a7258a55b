/// Typed named query parameters
///
/// ClickHouse binds parameters server-side: the query text declares each
/// placeholder with its type (`{ids:Array(UUID)}`) and the HTTP request carries
/// the value as `param_ids=...`. This module renders values into the text form
/// the server expects for each declared type.
///
/// # Example
///
/// ```
/// use userstore_shared::db::params::QueryParams;
/// use uuid::Uuid;
///
/// let id = Uuid::nil();
/// let params = QueryParams::new()
///     .uuid_array("user_ids", vec![id])
///     .string_array("aliases", vec!["ext-42".to_string()]);
///
/// assert_eq!(params.len(), 2);
/// ```

use uuid::Uuid;

/// A single typed parameter value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryParam {
    /// `UUID`
    Uuid(Uuid),

    /// `String`
    String(String),

    /// `Array(UUID)`
    UuidArray(Vec<Uuid>),

    /// `Array(String)`
    StringArray(Vec<String>),
}

impl QueryParam {
    /// Renders the value for a `param_<name>` HTTP argument
    ///
    /// Scalars use the escaped (TSV) text form; arrays use literal syntax with
    /// single-quoted elements.
    pub fn to_http_value(&self) -> String {
        match self {
            QueryParam::Uuid(id) => id.to_string(),
            QueryParam::String(s) => escape_scalar(s),
            QueryParam::UuidArray(ids) => {
                render_array(ids.iter().map(|id| id.to_string()))
            }
            QueryParam::StringArray(values) => render_array(values.iter().cloned()),
        }
    }
}

/// Ordered set of named parameters for one query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    entries: Vec<(String, QueryParam)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a parameter
    pub fn with(mut self, name: &str, value: QueryParam) -> Self {
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| n == name) {
            slot.1 = value;
        } else {
            self.entries.push((name.to_string(), value));
        }
        self
    }

    pub fn uuid(self, name: &str, value: Uuid) -> Self {
        self.with(name, QueryParam::Uuid(value))
    }

    pub fn string(self, name: &str, value: impl Into<String>) -> Self {
        self.with(name, QueryParam::String(value.into()))
    }

    pub fn uuid_array(self, name: &str, values: Vec<Uuid>) -> Self {
        self.with(name, QueryParam::UuidArray(values))
    }

    pub fn string_array(self, name: &str, values: Vec<String>) -> Self {
        self.with(name, QueryParam::StringArray(values))
    }

    pub fn get(&self, name: &str) -> Option<&QueryParam> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(param_<name>, value)` pairs ready for the request query string
    pub fn to_http_pairs(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|(name, value)| (format!("param_{}", name), value.to_http_value()))
            .collect()
    }
}

fn escape_scalar(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn render_array<I>(values: I) -> String
where
    I: Iterator<Item = String>,
{
    let items: Vec<String> = values.map(|v| quote_literal(&v)).collect();
    format!("[{}]", items.join(","))
}
