//! HTTP request and response descriptions for the CI server API.
//!
//! # Design
//! A `RequestDescriptor` is plain data: method, endpoint path, query map,
//! payload and response dialect. `RequestDispatcher` turns it into a wire
//! request and hands back a `ResponseEnvelope`, which is also plain data and
//! owned by the caller. Nothing here touches the network.
//!
//! The remote server speaks two dialects on the same endpoints. The
//! structured dialect is selected by appending `api/json` to the path; the
//! raw-document dialect (configuration XML, console text) uses the bare path.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

/// Suffix that switches an endpoint to the structured (JSON) dialect.
pub const STRUCTURED_SUFFIX: &str = "api/json";

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// Which response format an endpoint is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentDialect {
    Structured,
    RawDocument,
}

/// Request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    None,
    Raw {
        content_type: String,
        bytes: Vec<u8>,
    },
    /// Multipart upload: one `file` part per path, then `fields` as plain
    /// form fields.
    Files {
        files: Vec<PathBuf>,
        fields: BTreeMap<String, String>,
    },
}

/// A request against the remote API described as plain data.
///
/// Query values are sent as given. Free-form text must be passed through
/// [`escape`] by the caller before it is added.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: HttpMethod,
    pub path: String,
    pub query: HashMap<String, String>,
    pub payload: Payload,
    pub dialect: ContentDialect,
}

impl RequestDescriptor {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: HashMap::new(),
            payload: Payload::None,
            dialect: ContentDialect::RawDocument,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    /// Ask for the structured dialect.
    pub fn structured(mut self) -> Self {
        self.dialect = ContentDialect::Structured;
        self
    }

    /// Add a query parameter. A repeated key replaces the earlier value.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn queries<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in pairs {
            self.query.insert(key.into(), value.into());
        }
        self
    }

    pub fn xml(self, body: impl Into<String>) -> Self {
        self.raw("application/xml", body.into().into_bytes())
    }

    pub fn raw(mut self, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.payload = Payload::Raw {
            content_type: content_type.into(),
            bytes,
        };
        self
    }

    pub fn files(mut self, files: Vec<PathBuf>, fields: BTreeMap<String, String>) -> Self {
        self.payload = Payload::Files { files, fields };
        self
    }

    /// Full URL for this request against `base`.
    pub fn url(&self, base: &str) -> String {
        let mut url = format!("{base}{}", self.path);
        if !url.ends_with('/') {
            url.push('/');
        }
        if self.dialect == ContentDialect::Structured {
            url.push_str(STRUCTURED_SUFFIX);
        }
        url.push_str(&encode_query(&self.query));
        url
    }
}

/// Serialize a query map as `?k=v&k=v` in iteration order. Empty maps give
/// an empty string.
pub fn encode_query(query: &HashMap<String, String>) -> String {
    let mut output = String::new();
    let mut delimiter = '?';
    for (key, value) in query {
        output.push(delimiter);
        output.push_str(key);
        output.push('=');
        output.push_str(value);
        delimiter = '&';
    }
    output
}

/// Form-urlencode a free-form value before it goes into a query string.
pub fn escape(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Bytes that cannot appear verbatim inside one path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Percent-encode an item, view or agent name for use as one path segment.
pub fn path_segment(name: &str) -> String {
    utf8_percent_encode(name, PATH_SEGMENT).to_string()
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The remote server answered.
    Remote,
    /// Built locally after a transport failure.
    Synthesized,
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEnvelope {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub origin: Origin,
}

impl ResponseEnvelope {
    /// The legacy stand-in for a transport failure: 404, no headers, empty
    /// body.
    pub fn synthesized_not_found() -> Self {
        Self {
            status: 404,
            headers: Vec::new(),
            body: Vec::new(),
            origin: Origin::Synthesized,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 2xx, or 400 which the server returns for some idempotent calls that
    /// had nothing to do.
    pub fn is_tolerated(&self) -> bool {
        self.is_success() || self.status == 400
    }

    pub fn is_remote(&self) -> bool {
        self.origin == Origin::Remote
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "http://localhost:8080";

    #[test]
    fn structured_request_gets_trailing_slash_and_suffix() {
        let req = RequestDescriptor::get("/job/alpha").structured();
        assert_eq!(req.url(BASE), "http://localhost:8080/job/alpha/api/json");
    }

    #[test]
    fn raw_request_keeps_existing_trailing_slash() {
        let req = RequestDescriptor::delete("/job/alpha/");
        assert_eq!(req.url(BASE), "http://localhost:8080/job/alpha/");
    }

    #[test]
    fn root_path_maps_to_api_root() {
        let req = RequestDescriptor::get("/").structured();
        assert_eq!(req.url(BASE), "http://localhost:8080/api/json");
    }

    #[test]
    fn path_segments_encode_spaces_and_separators() {
        assert_eq!(path_segment("alpha"), "alpha");
        assert_eq!(path_segment("my job"), "my%20job");
        assert_eq!(path_segment("a/b?c#d"), "a%2Fb%3Fc%23d");
        assert_eq!(path_segment("(built-in)"), "(built-in)");
        assert_eq!(path_segment("caf\u{e9}"), "caf%C3%A9");
    }

    #[test]
    fn empty_query_adds_nothing() {
        assert_eq!(encode_query(&HashMap::new()), "");
    }

    #[test]
    fn query_lists_every_key_once() {
        let req = RequestDescriptor::post("/createItem")
            .query("name", "y")
            .query("mode", "copy")
            .query("from", "x");
        let url = req.url(BASE);
        let (_, query) = url.split_once('?').unwrap();
        let mut pairs: Vec<&str> = query.split('&').collect();
        pairs.sort_unstable();
        assert_eq!(pairs, vec!["from=x", "mode=copy", "name=y"]);
    }

    #[test]
    fn repeated_query_key_keeps_last_value() {
        let req = RequestDescriptor::get("/queue").query("depth", "1").query("depth", "2");
        assert_eq!(req.query.len(), 1);
        assert_eq!(req.url(BASE), "http://localhost:8080/queue/?depth=2");
    }

    #[test]
    fn query_values_are_not_escaped() {
        let req = RequestDescriptor::get("/x").query("label", "a b");
        assert!(req.url(BASE).ends_with("?label=a b"));
    }

    #[test]
    fn escape_form_encodes_free_text() {
        assert_eq!(escape("linux && docker"), "linux+%26%26+docker");
        assert_eq!(escape(r#"{"a":1}"#), "%7B%22a%22%3A1%7D");
    }

    #[test]
    fn xml_payload_sets_content_type() {
        let req = RequestDescriptor::post("/createItem").xml("<project/>");
        assert_eq!(
            req.payload,
            Payload::Raw {
                content_type: "application/xml".to_string(),
                bytes: b"<project/>".to_vec(),
            }
        );
    }

    #[test]
    fn synthesized_envelope_is_empty_not_found() {
        let envelope = ResponseEnvelope::synthesized_not_found();
        assert_eq!(envelope.status, 404);
        assert!(envelope.body.is_empty());
        assert!(!envelope.is_remote());
    }

    #[test]
    fn bad_request_is_tolerated_but_not_success() {
        let mut envelope = ResponseEnvelope::synthesized_not_found();
        envelope.status = 400;
        assert!(envelope.is_tolerated());
        assert!(!envelope.is_success());
        envelope.status = 500;
        assert!(!envelope.is_tolerated());
    }

    #[test]
    fn header_lookup_ignores_case() {
        let envelope = ResponseEnvelope {
            status: 200,
            headers: vec![("x-jenkins".to_string(), "2.440".to_string())],
            body: Vec::new(),
            origin: Origin::Remote,
        };
        assert_eq!(envelope.header("X-Jenkins"), Some("2.440"));
        assert_eq!(envelope.header("Location"), None);
    }
}
