//! Parameter values and their wire preparation.
//!
//! # Design
//! Parameters are a closed tagged union so every consumer (preparation, field
//! expansion, form encoding, multipart splitting) pattern-matches instead of
//! guessing at runtime types. `Params` is a `BTreeMap`, which keeps every
//! encoding deterministic.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{GraphError, Result};
use crate::fields::encode_fields;

/// Parameter mapping sent with a request.
pub type Params = BTreeMap<String, ParamValue>;

/// A single parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    /// Raw bytes that must decode as UTF-8 before they reach the wire.
    Bytes(Vec<u8>),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<ParamValue>),
    Map(Params),
    /// File contents uploaded as a multipart part.
    File(FileSource),
}

impl ParamValue {
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            ParamValue::Text(_)
                | ParamValue::Bytes(_)
                | ParamValue::Int(_)
                | ParamValue::Float(_)
                | ParamValue::Bool(_)
        )
    }

    /// String form of a scalar. `None` for lists, maps and files.
    pub fn scalar_text(&self) -> Option<String> {
        match self {
            ParamValue::Text(s) => Some(s.clone()),
            ParamValue::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            ParamValue::Int(n) => Some(n.to_string()),
            ParamValue::Float(n) => Some(n.to_string()),
            ParamValue::Bool(b) => Some(b.to_string()),
            ParamValue::List(_) | ParamValue::Map(_) | ParamValue::File(_) => None,
        }
    }

    /// Files carried by this value, if it is a file or a non-empty list of files.
    fn file_parts(&self) -> Option<Vec<&FileSource>> {
        match self {
            ParamValue::File(file) => Some(vec![file]),
            ParamValue::List(items) if !items.is_empty() => items
                .iter()
                .map(|item| match item {
                    ParamValue::File(file) => Some(file),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }

    /// JSON rendering used for `object` and for structured values on the wire.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        use serde_json::Value;

        Ok(match self {
            ParamValue::Text(s) => Value::String(s.clone()),
            ParamValue::Bytes(b) => Value::String(utf8(b)?),
            ParamValue::Int(n) => Value::from(*n),
            ParamValue::Float(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .ok_or_else(|| GraphError::InvalidParameter(format!("{n} is not a JSON number")))?,
            ParamValue::Bool(b) => Value::Bool(*b),
            ParamValue::List(items) => Value::Array(items.iter().map(ParamValue::to_json).collect::<Result<_>>()?),
            ParamValue::Map(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| Ok((key.clone(), value.to_json()?)))
                    .collect::<Result<_>>()?,
            ),
            ParamValue::File(file) => {
                return Err(GraphError::InvalidParameter(format!(
                    "file `{}` cannot be embedded in a structured value",
                    file.file_name
                )))
            }
        })
    }
}

/// In-memory file contents for an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSource {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl FileSource {
    pub fn new(file_name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            data,
        }
    }

    /// Read a file from disk, naming the part after the file.
    pub fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self::new(file_name, data))
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn content_type(&self) -> &str {
        self.content_type.as_deref().unwrap_or("application/octet-stream")
    }
}

/// Normalize parameters for the wire.
///
/// Byte strings become text, `permissions` lists are comma-joined, `source`
/// is wrapped in a list, `fields` goes through field expansion and an
/// `object` map is serialized to JSON.
pub fn prepare(params: &Params) -> Result<Params> {
    params
        .iter()
        .map(|(key, value)| Ok((key.clone(), prepare_value(key, value)?)))
        .collect()
}

fn prepare_value(key: &str, value: &ParamValue) -> Result<ParamValue> {
    let value = normalize_text(key, value)?;
    Ok(match (key, value) {
        ("permissions", ParamValue::List(items)) => {
            let scopes = items
                .iter()
                .map(|item| {
                    item.scalar_text().ok_or_else(|| {
                        GraphError::InvalidParameter("`permissions` entries must be scalars".to_string())
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            ParamValue::Text(scopes.join(","))
        }
        ("source", value @ ParamValue::List(_)) => value,
        ("source", value) => ParamValue::List(vec![value]),
        ("fields", value) => ParamValue::Text(encode_fields(&value)),
        ("object", value @ ParamValue::Map(_)) => ParamValue::Text(serde_json::to_string(&value.to_json()?)?),
        (_, value) => value,
    })
}

fn normalize_text(key: &str, value: &ParamValue) -> Result<ParamValue> {
    Ok(match value {
        ParamValue::Bytes(bytes) => ParamValue::Text(
            String::from_utf8(bytes.clone())
                .map_err(|_| GraphError::InvalidParameter(format!("`{key}` is not valid UTF-8")))?,
        ),
        ParamValue::List(items) => {
            ParamValue::List(items.iter().map(|item| normalize_text(key, item)).collect::<Result<_>>()?)
        }
        ParamValue::Map(map) => ParamValue::Map(
            map.iter()
                .map(|(inner, item)| Ok((inner.clone(), normalize_text(inner, item)?)))
                .collect::<Result<_>>()?,
        ),
        other => other.clone(),
    })
}

fn utf8(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| GraphError::InvalidParameter("value is not valid UTF-8".to_string()))
}

/// Split prepared parameters into text pairs and file parts.
///
/// Lists and maps left after preparation are sent as JSON.
pub fn partition(params: &Params) -> Result<(Vec<(String, String)>, Vec<(String, FileSource)>)> {
    let mut pairs = Vec::new();
    let mut files = Vec::new();
    for (key, value) in params {
        if let Some(parts) = value.file_parts() {
            files.extend(parts.into_iter().map(|file| (key.clone(), file.clone())));
            continue;
        }
        let text = match value {
            ParamValue::Bytes(bytes) => utf8(bytes)?,
            ParamValue::List(_) | ParamValue::Map(_) => serde_json::to_string(&value.to_json()?)?,
            scalar => scalar.scalar_text().unwrap_or_default(),
        };
        pairs.push((key.clone(), text));
    }
    Ok((pairs, files))
}

/// Text pairs of prepared parameters; file parts are dropped.
pub fn to_pairs(params: &Params) -> Result<Vec<(String, String)>> {
    partition(params).map(|(pairs, _)| pairs)
}

/// True if any parameter carries file contents.
pub fn has_file(params: &Params) -> bool {
    params.values().any(|value| value.file_parts().is_some())
}

/// Prepare and form-encode parameters into a single
/// `application/x-www-form-urlencoded` string.
pub fn encode_form(params: &Params) -> Result<String> {
    let pairs = to_pairs(&prepare(params)?)?;
    Ok(url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish())
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<&String> for ParamValue {
    fn from(value: &String) -> Self {
        ParamValue::Text(value.clone())
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(i64::from(value))
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Int(i64::from(value))
    }
}

impl From<u64> for ParamValue {
    fn from(value: u64) -> Self {
        i64::try_from(value).map_or_else(|_| ParamValue::Text(value.to_string()), ParamValue::Int)
    }
}

impl From<usize> for ParamValue {
    fn from(value: usize) -> Self {
        i64::try_from(value).map_or_else(|_| ParamValue::Text(value.to_string()), ParamValue::Int)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<FileSource> for ParamValue {
    fn from(value: FileSource) -> Self {
        ParamValue::File(value)
    }
}

impl From<Params> for ParamValue {
    fn from(value: Params) -> Self {
        ParamValue::Map(value)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(value: Vec<T>) -> Self {
        ParamValue::List(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ParamValue>, const N: usize> From<[T; N]> for ParamValue {
    fn from(value: [T; N]) -> Self {
        ParamValue::List(value.into_iter().map(Into::into).collect())
    }
}

impl From<serde_json::Value> for ParamValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => ParamValue::Text(String::new()),
            Value::Bool(b) => ParamValue::Bool(b),
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => ParamValue::Int(i),
                (None, Some(f)) if n.is_f64() => ParamValue::Float(f),
                _ => ParamValue::Text(n.to_string()),
            },
            Value::String(s) => ParamValue::Text(s),
            Value::Array(items) => ParamValue::List(items.into_iter().map(ParamValue::from).collect()),
            Value::Object(map) => {
                ParamValue::Map(map.into_iter().map(|(key, value)| (key, ParamValue::from(value))).collect())
            }
        }
    }
}

/// Build a `Params` map from `key => value` pairs.
///
/// ```
/// let params = graph_core::params! { "fields" => "id,name", "limit" => 25 };
/// assert_eq!(params.len(), 2);
/// ```
#[macro_export]
macro_rules! params {
    () => { $crate::Params::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut params = $crate::Params::new();
        $( params.insert(::std::string::String::from($key), $crate::ParamValue::from($value)); )+
        params
    }};
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::params;

    #[test]
    fn permissions_list_is_comma_joined() {
        let prepared = prepare(&params! { "permissions" => vec!["email", "user_posts"] }).unwrap();
        assert_eq!(prepared["permissions"], ParamValue::Text("email,user_posts".to_string()));
    }

    #[test]
    fn permissions_scalar_passes_through() {
        let prepared = prepare(&params! { "permissions" => "email" }).unwrap();
        assert_eq!(prepared["permissions"], ParamValue::Text("email".to_string()));
    }

    #[test]
    fn source_is_wrapped_in_a_list() {
        let file = FileSource::new("a.jpg", vec![1, 2, 3]);
        let prepared = prepare(&params! { "source" => file.clone() }).unwrap();
        assert_eq!(prepared["source"], ParamValue::List(vec![ParamValue::File(file)]));
    }

    #[test]
    fn source_list_is_left_alone() {
        let file = FileSource::new("a.jpg", vec![1]);
        let prepared = prepare(&params! { "source" => vec![file.clone()] }).unwrap();
        assert_eq!(prepared["source"], ParamValue::List(vec![ParamValue::File(file)]));
    }

    #[test]
    fn fields_are_expanded() {
        let fields = ParamValue::from(json!(["id", {"friends": {"name": 1, "id": 1}}]));
        let prepared = prepare(&params! { "fields" => fields }).unwrap();
        assert_eq!(prepared["fields"], ParamValue::Text("id,friends(id,name)".to_string()));
    }

    #[test]
    fn object_map_is_serialized_to_json() {
        let object = ParamValue::from(json!({"title": "Hello", "rating": 5}));
        let prepared = prepare(&params! { "object" => object, "other" => json!({"x": 1}) }).unwrap();
        assert_eq!(prepared["object"], ParamValue::Text(r#"{"rating":5,"title":"Hello"}"#.to_string()));
        assert!(matches!(prepared["other"], ParamValue::Map(_)));
    }

    #[test]
    fn bytes_become_text_recursively() {
        let nested = ParamValue::List(vec![ParamValue::Bytes(b"caf\xc3\xa9".to_vec())]);
        let prepared = prepare(&params! { "tags" => nested }).unwrap();
        assert_eq!(prepared["tags"], ParamValue::List(vec![ParamValue::Text("café".to_string())]));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let err = prepare(&params! { "message" => ParamValue::Bytes(vec![0xff, 0xfe]) }).unwrap_err();
        assert!(matches!(err, GraphError::InvalidParameter(_)));
    }

    #[test]
    fn pairs_render_scalars_and_json() {
        let params = params! {
            "limit" => 25,
            "published" => false,
            "ids" => vec!["1", "2"],
            "targeting" => json!({"countries": ["NO"]}),
        };
        let pairs = to_pairs(&params).unwrap();
        assert_eq!(
            pairs,
            vec![
                ("ids".to_string(), r#"["1","2"]"#.to_string()),
                ("limit".to_string(), "25".to_string()),
                ("published".to_string(), "false".to_string()),
                ("targeting".to_string(), r#"{"countries":["NO"]}"#.to_string()),
            ]
        );
    }

    #[test]
    fn partition_separates_files() {
        let prepared = prepare(&params! {
            "message" => "hi",
            "source" => FileSource::new("v.mp4", vec![0]),
        })
        .unwrap();
        assert!(has_file(&prepared));
        let (pairs, files) = partition(&prepared).unwrap();
        assert_eq!(pairs, vec![("message".to_string(), "hi".to_string())]);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].0, "source");
    }

    #[test]
    fn file_inside_a_map_is_rejected() {
        let mut inner = Params::new();
        inner.insert("f".to_string(), ParamValue::File(FileSource::new("a", vec![])));
        let err = to_pairs(&params! { "attachment" => inner }).unwrap_err();
        assert!(matches!(err, GraphError::InvalidParameter(_)));
    }

    #[test]
    fn encode_form_escapes_values() {
        let body = encode_form(&params! { "message" => "hello world & more", "fields" => vec!["id", "name"] }).unwrap();
        assert_eq!(body, "fields=id%2Cname&message=hello+world+%26+more");
    }
}
