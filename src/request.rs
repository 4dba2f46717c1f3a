use std::fmt::Display;

use bytes::Bytes;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE},
    Method,
};
use serde::{de::DeserializeOwned, Serialize};
use url::Url;

use crate::{multipart::Multipart, CallError, ClientOption, ResilientClient, Result};

/// Header carrying the correlation id of a call, set on every attempt.
pub const LOG_ID_HEADER: &str = "x-log-id";
pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";

/// Fully built request descriptor consumed by [`ResilientClient::send`].
///
/// The body is reference counted so every attempt can resend it.
#[derive(Clone, Debug)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    /// Correlation id. A fresh one is generated per call when absent.
    pub log_id: Option<String>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
            log_id: None,
        }
    }

    /// Sets the raw body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

#[derive(Debug, Default)]
enum Body {
    #[default]
    Empty,
    Json(Bytes),
    Form(Vec<(String, String)>),
    Multipart(Multipart),
}

/// Builder returned by the verb helpers on [`ResilientClient`].
///
/// Encoding problems are remembered and reported by [`RequestBuilder::send`]
/// or [`RequestBuilder::build`], so calls can be chained freely.
#[derive(Debug)]
pub struct RequestBuilder<'a> {
    client: &'a ResilientClient,
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Body,
    overrides: Vec<ClientOption>,
    log_id: Option<String>,
    error: Option<CallError>,
}

impl<'a> RequestBuilder<'a> {
    pub(crate) fn new(client: &'a ResilientClient, method: Method, path: String) -> Self {
        Self {
            client,
            method,
            path,
            query: Vec::new(),
            headers: Vec::new(),
            body: Body::Empty,
            overrides: Vec::new(),
            log_id: None,
            error: None,
        }
    }

    /// Appends query parameters, URL-encoded.
    pub fn query<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Display,
    {
        self.query.extend(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.to_string())),
        );
        self
    }

    /// Appends one header. Repeated names are sent as repeated headers.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers.extend(
            pairs
                .into_iter()
                .map(|(name, value)| (name.into(), value.into())),
        );
        self
    }

    /// Sends `value` as a JSON body.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.body = Body::Json(bytes.into()),
            Err(err) if self.error.is_none() => {
                self.error = Some(CallError::InvalidRequest(format!(
                    "request body could not be encoded as JSON: {err}"
                )));
            }
            Err(_) => {}
        }
        self
    }

    /// Sends `pairs` as an URL-encoded form body. Successive calls append.
    pub fn form<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let pairs = pairs
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()));
        match &mut self.body {
            Body::Form(existing) => existing.extend(pairs),
            body => *body = Body::Form(pairs.collect()),
        }
        self
    }

    /// Adds a file part to a `multipart/form-data` body.
    ///
    /// The field name is also used as the file name. Names containing CR or
    /// LF are rejected when the request is built.
    pub fn file(mut self, field: impl Into<String>, content: impl Into<Bytes>) -> Self {
        let field = field.into();
        if field.contains(['\r', '\n']) {
            if self.error.is_none() {
                self.error = Some(CallError::InvalidRequest(format!(
                    "invalid multipart field name {field:?}"
                )));
            }
            return self;
        }
        if !matches!(self.body, Body::Multipart(_)) {
            self.body = Body::Multipart(Multipart::new());
        }
        if let Body::Multipart(multipart) = &mut self.body {
            multipart.add_file(field, content.into());
        }
        self
    }

    /// Overrides the generated correlation id.
    pub fn log_id(mut self, log_id: impl Into<String>) -> Self {
        self.log_id = Some(log_id.into());
        self
    }

    /// Adds a policy override for this call only.
    pub fn option(mut self, option: ClientOption) -> Self {
        self.overrides.push(option);
        self
    }

    pub fn options<I>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = ClientOption>,
    {
        self.overrides.extend(options);
        self
    }

    /// Assembles the request descriptor without sending it.
    pub fn build(self) -> Result<Request> {
        self.into_parts().map(|(request, _, _)| request)
    }

    /// Sends the request and decodes a 2xx JSON body into `T`.
    pub async fn send<T>(self) -> Result<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (request, overrides, client) = self.into_parts()?;
        client.send(request, &overrides).await
    }

    fn into_parts(self) -> Result<(Request, Vec<ClientOption>, &'a ResilientClient)> {
        if let Some(err) = self.error {
            return Err(err);
        }

        let raw_url = format!("{}{}", self.client.host(), self.path);
        let mut url = Url::parse(&raw_url)
            .map_err(|err| CallError::InvalidRequest(format!("invalid url '{raw_url}': {err}")))?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }

        let mut headers = HeaderMap::with_capacity(self.headers.len() + 1);
        for (name, value) in &self.headers {
            let (name, value) = parse_header(name, value)?;
            headers.append(name, value);
        }

        let body = match self.body {
            Body::Empty => None,
            Body::Json(bytes) => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
                Some(bytes)
            }
            Body::Form(pairs) => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_FORM));
                Some(Bytes::from(encode_form(&pairs)))
            }
            Body::Multipart(multipart) => {
                let (_, value) =
                    parse_header(CONTENT_TYPE.as_str(), multipart.content_type().as_ref())?;
                headers.insert(CONTENT_TYPE, value);
                Some(multipart.into_bytes())
            }
        };

        let request = Request {
            method: self.method,
            url: url.into(),
            headers,
            body,
            log_id: self.log_id,
        };
        Ok((request, self.overrides, self.client))
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|err| CallError::InvalidRequest(format!("invalid header name '{name}': {err}")))?;
    let header_value = HeaderValue::from_str(value).map_err(|err| {
        CallError::InvalidRequest(format!("invalid value for header '{name}': {err}"))
    })?;
    Ok((header_name, header_value))
}

pub(crate) fn encode_form(pairs: &[(String, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}
