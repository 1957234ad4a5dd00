use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize};

/// An HTTP request in the API-Gateway proxy shape a function expects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRequest {
    #[serde(default, deserialize_with = "null_as_default")]
    pub resource: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub path: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub http_method: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub multi_value_headers: BTreeMap<String, Vec<String>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub query_string_parameters: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub multi_value_query_string_parameters: BTreeMap<String, Vec<String>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub path_parameters: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub stage_variables: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub request_context: RequestContext,
    #[serde(default, deserialize_with = "null_as_default")]
    pub body: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_base64_encoded: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    #[serde(default, deserialize_with = "null_as_default")]
    pub account_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub stage: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub request_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub http_method: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub path: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub request_time_epoch: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub identity: RequestIdentity,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestIdentity {
    #[serde(default, deserialize_with = "null_as_default")]
    pub source_ip: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_agent: String,
}

/// The API-Gateway proxy response a function posts back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponse {
    #[serde(default = "default_status_code", deserialize_with = "null_as_status_code")]
    pub status_code: u16,
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub multi_value_headers: BTreeMap<String, Vec<String>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub body: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_base64_encoded: bool,
}

fn default_status_code() -> u16 {
    200
}

// Runtime clients serialize unset maps and strings as `null`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

fn null_as_status_code<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<u16>::deserialize(deserializer).map(|code| code.unwrap_or_else(default_status_code))
}

impl Default for GatewayResponse {
    fn default() -> Self {
        Self {
            status_code: default_status_code(),
            headers: BTreeMap::new(),
            multi_value_headers: BTreeMap::new(),
            body: String::new(),
            is_base64_encoded: false,
        }
    }
}

impl GatewayRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        let http_method = method.into();
        let path = path.into();
        Self {
            request_context: RequestContext {
                http_method: http_method.clone(),
                path: path.clone(),
                ..RequestContext::default()
            },
            http_method,
            path,
            ..Self::default()
        }
    }

    /// Record headers. The first value seen for a name fills the
    /// single-valued map; every value lands in the multi-valued map.
    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in headers {
            let name = name.into();
            let value = value.into();
            self.headers
                .entry(name.clone())
                .or_insert_with(|| value.clone());
            self.multi_value_headers.entry(name).or_default().push(value);
        }
        self
    }

    /// Record query parameters, preserving repeated keys.
    ///
    /// A key seen once maps directly in `queryStringParameters`. A repeated
    /// key is spread over indexed entries (`key[0]`, `key[1]`, ...) instead,
    /// for consumers that only read the single-valued map.
    pub fn with_query<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in pairs {
            self.multi_value_query_string_parameters
                .entry(key.into())
                .or_default()
                .push(value.into());
        }

        self.query_string_parameters.clear();
        for (key, values) in &self.multi_value_query_string_parameters {
            if let [single] = values.as_slice() {
                self.query_string_parameters
                    .insert(key.clone(), single.clone());
                continue;
            }
            for (index, value) in values.iter().enumerate() {
                self.query_string_parameters
                    .insert(format!("{key}[{index}]"), value.clone());
            }
        }
        self
    }

    pub fn with_body(mut self, body: &[u8]) -> Self {
        let (encoded, is_base64) = encode_body(body);
        self.body = encoded;
        self.is_base64_encoded = is_base64;
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_context.request_id = request_id.into();
        self
    }
}

impl GatewayResponse {
    /// The raw body bytes. A body flagged as base64 that fails to decode is
    /// returned as its literal text.
    pub fn body_bytes(&self) -> Vec<u8> {
        if self.is_base64_encoded
            && let Ok(decoded) = STANDARD.decode(self.body.as_bytes())
        {
            return decoded;
        }
        self.body.clone().into_bytes()
    }
}

/// Printable ASCII: space through tilde. Control characters, including tabs
/// and newlines, are not.
pub fn is_ascii_printable(bytes: &[u8]) -> bool {
    bytes.iter().all(|b| (b' '..=b'~').contains(b))
}

/// Encode a body as text when it is printable ASCII, otherwise as base64.
/// Returns the encoded body and whether base64 was used.
pub fn encode_body(bytes: &[u8]) -> (String, bool) {
    if is_ascii_printable(bytes) {
        // Every byte is ASCII, so this never replaces anything.
        (String::from_utf8_lossy(bytes).into_owned(), false)
    } else {
        (STANDARD.encode(bytes), true)
    }
}
