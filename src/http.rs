//! Blocking HTTP(S) request layer, everything is based on async reqwest driven by a
//! current-thread Tokio runtime.

use std::future::Future;
use std::time::Duration;

use once_cell::sync::OnceCell;
use reqwest::{header, Client, ClientBuilder, Method};
use serde_json::Value;


/// The user agent to be used on each HTTP request.
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Block on the given future with a Tokio runtime with time and I/O enabled.
pub(crate) fn sync<F: Future>(future: F) -> F::Output {

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .enable_io()
        .build()
        .unwrap();

    rt.block_on(future)

}

/// Get a new client builder for async HTTP(S) requests.
pub fn builder() -> ClientBuilder {
    Client::builder().user_agent(USER_AGENT)
}

/// Return the singleton instance of the HTTP client used for one-shot requests.
pub fn client() -> reqwest::Result<Client> {
    static INSTANCE: OnceCell<Client> = OnceCell::new();
    let inst = INSTANCE.get_or_try_init(|| {
        builder().build()
    })?;
    Ok(inst.clone())
}

/// An HTTP request expecting a JSON response body.
///
/// The HTTP status is returned as-is alongside the decoded document, it's up to the
/// caller to branch on non-2xx statuses. Only transport-level failures and non-JSON
/// response bodies are errors.
#[derive(Debug)]
pub struct JsonRequest<'a> {
    url: &'a str,
    method: Method,
    body: Option<Value>,
    headers: header::HeaderMap,
    ignore_decode_error: bool,
    timeout: Option<Duration>,
}

impl<'a> JsonRequest<'a> {

    pub fn new(method: Method, url: &'a str) -> Self {
        Self {
            url,
            method,
            body: None,
            headers: header::HeaderMap::new(),
            ignore_decode_error: false,
            timeout: None,
        }
    }

    /// Set a JSON document as the request body.
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: header::HeaderName, value: header::HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// When the response body fails to decode as JSON, return an empty document with
    /// the status instead of failing with [`Error::NotJson`].
    pub fn ignore_decode_error(mut self) -> Self {
        self.ignore_decode_error = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Send the request, returning the HTTP status and the decoded response document.
    pub fn send(self) -> Result<(u16, Value), Error> {

        check_scheme(self.url)?;

        sync(async move {

            let client = client().map_err(Error::Socket)?;
            let mut req = client.request(self.method, self.url);

            let mut headers = self.headers;
            if !headers.contains_key(header::ACCEPT) {
                headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
            }
            headers.insert(header::CONNECTION, header::HeaderValue::from_static("close"));
            req = req.headers(headers);

            if let Some(body) = &self.body {
                req = req.json(body);
            }

            if let Some(timeout) = self.timeout {
                req = req.timeout(timeout);
            }

            let res = req.send().await.map_err(Error::Socket)?;
            let status = res.status().as_u16();
            let body = res.bytes().await.map_err(Error::Socket)?;

            match serde_json::from_slice::<Value>(&body) {
                Ok(document) => Ok((status, document)),
                Err(_) if self.ignore_decode_error => Ok((status, Value::Object(Default::default()))),
                Err(_) => Err(Error::NotJson { status }),
            }

        })

    }

}

/// Shortcut for a simple GET request of a JSON document.
pub fn json_get(url: &str) -> Result<(u16, Value), Error> {
    JsonRequest::new(Method::GET, url).send()
}

/// Request a binary resource, fully buffered in memory, returning the HTTP status with
/// the body bytes.
pub fn binary_get(url: &str) -> Result<(u16, Vec<u8>), Error> {

    check_scheme(url)?;

    sync(async move {
        let client = client().map_err(Error::Socket)?;
        let res = client.get(url).send().await.map_err(Error::Socket)?;
        let status = res.status().as_u16();
        let body = res.bytes().await.map_err(Error::Socket)?;
        Ok((status, body.to_vec()))
    })

}

/// Compute the connection-reuse key of a URL, `{0|1}{netloc}`, where the leading digit
/// discriminates the scheme so that http and https to the same authority don't share
/// a connection.
pub fn host_key(url: &str) -> Result<String, Error> {

    let (scheme, rest) = url.split_once("://")
        .ok_or_else(|| Error::InvalidScheme { scheme: String::new() })?;

    let secure = match scheme {
        "http" => false,
        "https" => true,
        _ => return Err(Error::InvalidScheme { scheme: scheme.to_string() }),
    };

    // The authority ends at the path, query or fragment.
    let netloc = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    Ok(format!("{}{netloc}", secure as u8))

}

fn check_scheme(url: &str) -> Result<(), Error> {
    host_key(url).map(|_| ())
}

/// An HTTP transport or decoding error, statuses are never errors at this layer.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The URL scheme is not http or https.
    #[error("invalid url scheme: {scheme}")]
    InvalidScheme {
        scheme: String,
    },
    /// The response body is not a JSON document.
    #[error("response is not json (status {status})")]
    NotJson {
        status: u16,
    },
    /// A socket-level or transport failure.
    #[error("socket: {0}")]
    Socket(#[source] reqwest::Error),
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn host_keys() {
        assert_eq!(host_key("http://example.com/a/b").unwrap(), "0example.com");
        assert_eq!(host_key("https://example.com/a/b").unwrap(), "1example.com");
        assert_eq!(host_key("https://example.com:8443/a").unwrap(), "1example.com:8443");
        assert_eq!(host_key("https://example.com").unwrap(), "1example.com");
        assert!(matches!(host_key("ftp://example.com"), Err(Error::InvalidScheme { .. })));
        assert!(matches!(host_key("example.com"), Err(Error::InvalidScheme { .. })));
    }

}
