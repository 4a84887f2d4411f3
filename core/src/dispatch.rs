//! Request construction and dispatch.
//!
//! # Design
//! A call goes through two steps. `plan*` turns an operation, parameters and
//! an optional JSON body into a finished `HttpRequest`. The tunneling
//! decision is made here, before anything touches the network. `execute`
//! then hands the plan to the `Transport`, retrying connection-level
//! failures with bounded exponential backoff. Non-2xx answers are returned
//! as `Error::Api` on the first attempt; the server has already spoken.
//!
//! Tunneling rewrites a query-only request (GET or DELETE) as
//! `POST` + `X-HTTP-Method-Override`, moving the query string into an
//! `application/x-www-form-urlencoded` body. Requests that already carry a
//! JSON body are never tunneled.

use std::borrow::Cow;

use log::{debug, warn};
use serde_json::{Map, Value};
use url::Url;

use crate::cancel::CancelToken;
use crate::catalog::Operation;
use crate::config::{ClientConfig, TunnelMode};
use crate::error::{Error, Result};
use crate::http::{find_header, HttpMethod, HttpRequest, HttpResponse};
use crate::params::{encode_path_segment, encode_query, ParamValue, Urn};
use crate::transport::{Transport, UreqTransport};

pub const RESTLI_ID_HEADER: &str = "x-restli-id";
pub const METHOD_OVERRIDE_HEADER: &str = "X-HTTP-Method-Override";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Arguments for one catalog operation.
#[derive(Debug, Clone, Default)]
pub struct OperationCall {
    pub id: Option<String>,
    /// Parameter name to JSON value, in the order supplied.
    pub params: Map<String, Value>,
    /// Field projection, passed through as a Rest.li literal.
    pub fields: Option<String>,
}

/// A 2xx response with the created entity key, if any, pulled out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub restli_id: Option<String>,
}

impl ApiResponse {
    fn from_http(response: HttpResponse) -> Self {
        let restli_id = response.header(RESTLI_ID_HEADER).map(str::to_string);
        Self {
            status: response.status,
            headers: response.headers,
            body: response.body,
            restli_id,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// The body parsed as JSON. An empty body is `null`.
    pub fn json(&self) -> Result<Value> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| Error::Response(format!("body is not JSON: {e}")))
    }
}

pub struct Dispatcher<T: Transport = UreqTransport> {
    transport: T,
    config: ClientConfig,
    cancel: CancelToken,
}

impl Dispatcher<UreqTransport> {
    /// Dispatcher over a fresh ureq agent honoring the configured timeout.
    pub fn connect(config: ClientConfig) -> Result<Self> {
        let transport = UreqTransport::new(config.timeout);
        Self::new(transport, config)
    }
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(transport: T, config: ClientConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            transport,
            config,
            cancel: CancelToken::new(),
        })
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Plan a catalog operation.
    ///
    /// Path placeholders are filled first and consume their parameters. The
    /// rest go to the query string for GET and DELETE (operation defaults
    /// first, then caller order, then `fields`) or to the JSON body otherwise.
    pub fn plan_operation(
        &self,
        resource: &str,
        op: &Operation,
        call: &OperationCall,
    ) -> Result<HttpRequest> {
        let mut params = call.params.clone();
        let path = op.render_path(|name| {
            let raw = match name {
                "id" => call.id.clone().or_else(|| self.default_id(resource)),
                "account" => params
                    .remove("account")
                    .and_then(|value| key_text(&value))
                    .or_else(|| self.config.default_ad_account_id.clone())
                    .map(|account| account_key(&account)),
                other => params.remove(other).and_then(|value| key_text(&value)),
            }?;
            Some(encode_path_segment(&raw))
        })?;

        let mut query: Vec<(String, ParamValue)> = op
            .query
            .iter()
            .map(|(name, value)| (name.clone(), ParamValue::string(value.clone())))
            .collect();

        let extra: Vec<(String, String)> =
            op.headers.iter().map(|(name, value)| (name.clone(), value.clone())).collect();

        if !op.method.is_query_only() {
            if let Some(fields) = &call.fields {
                query.push(("fields".to_string(), ParamValue::literal(fields.clone())));
            }
            let body = if params.is_empty() { None } else { Some(Value::Object(params)) };
            return self.plan(op.method, &path, &query, body.as_ref(), &extra);
        }

        for spec in op.params.iter().filter(|spec| spec.required) {
            if !params.contains_key(&spec.name) {
                return Err(Error::Encoding(format!(
                    "{} requires parameter {}",
                    op.name, spec.name
                )));
            }
        }
        for (name, value) in &params {
            let encoded = match op.param(name) {
                Some(spec) => ParamValue::from_json_hinted(value, spec.kind),
                None => ParamValue::from_json(value),
            }
            .map_err(|e| match e {
                Error::Encoding(message) => Error::Encoding(format!("{name}: {message}")),
                other => other,
            })?;
            query.push((name.clone(), encoded));
        }
        if let Some(fields) = &call.fields {
            query.push(("fields".to_string(), ParamValue::literal(fields.clone())));
        }
        self.plan(op.method, &path, &query, None, &extra)
    }

    /// Plan a request against `path` (relative to the base URL, or absolute).
    pub fn plan(
        &self,
        method: HttpMethod,
        path: &str,
        query: &[(String, ParamValue)],
        body: Option<&Value>,
        extra_headers: &[(String, String)],
    ) -> Result<HttpRequest> {
        let body = body
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| Error::Encoding(format!("request body: {e}")))?;
        let url = self.config.endpoint(path);
        Ok(self.assemble(method, url, encode_query(query), body, extra_headers))
    }

    fn assemble(
        &self,
        method: HttpMethod,
        url: String,
        query: String,
        json_body: Option<Vec<u8>>,
        extra_headers: &[(String, String)],
    ) -> HttpRequest {
        let mut headers = self.standard_headers();
        headers.extend(extra_headers.iter().cloned());
        let full_url = if query.is_empty() { url.clone() } else { format!("{url}?{query}") };

        if let Some(bytes) = json_body {
            headers.push(("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string()));
            return HttpRequest {
                method,
                url: full_url,
                headers,
                body: Some(bytes),
                tunneled: false,
            };
        }

        let tunnel = method.is_query_only()
            && match self.config.tunnel_mode {
                TunnelMode::Always => true,
                TunnelMode::Never => false,
                TunnelMode::Auto => full_url.len() > self.config.url_length_threshold,
            };
        if !tunnel {
            return HttpRequest {
                method,
                url: full_url,
                headers,
                body: None,
                tunneled: false,
            };
        }

        debug!(
            "tunneling {method} {url} ({} byte URL, threshold {})",
            full_url.len(),
            self.config.url_length_threshold
        );
        headers.push((METHOD_OVERRIDE_HEADER.to_string(), method.as_str().to_string()));
        headers.push(("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string()));
        HttpRequest {
            method: HttpMethod::Post,
            url,
            headers,
            body: Some(query.into_bytes()),
            tunneled: true,
        }
    }

    fn standard_headers(&self) -> Vec<(String, String)> {
        vec![
            ("Authorization".to_string(), format!("Bearer {}", self.config.access_token)),
            ("LinkedIn-Version".to_string(), self.config.linkedin_version.clone()),
            (
                "X-Restli-Protocol-Version".to_string(),
                self.config.restli_protocol_version.clone(),
            ),
            ("Accept".to_string(), JSON_CONTENT_TYPE.to_string()),
        ]
    }

    fn default_id(&self, resource: &str) -> Option<String> {
        match resource {
            "ad-account" => self.config.default_ad_account_id.clone(),
            "image" | "video" => self.config.default_asset_id.clone(),
            _ => None,
        }
    }

    /// Send a planned request and require a 2xx answer.
    pub fn execute(&self, request: &HttpRequest) -> Result<ApiResponse> {
        self.execute_with(request, &self.cancel)
    }

    pub(crate) fn execute_with(
        &self,
        request: &HttpRequest,
        cancel: &CancelToken,
    ) -> Result<ApiResponse> {
        let response = self.send_with_retry(request, cancel)?;
        if !response.is_success() {
            debug!("{} {} answered {}", request.method, request.url, response.status);
            return Err(Error::Api {
                status: response.status,
                body: response.text().into_owned(),
                headers: response.headers,
            });
        }
        Ok(ApiResponse::from_http(response))
    }

    /// Send with the retry policy. Only retryable transport failures are
    /// retried; backoff sleeps wake early when `cancel` fires.
    pub fn send_with_retry(
        &self,
        request: &HttpRequest,
        cancel: &CancelToken,
    ) -> Result<HttpResponse> {
        let policy = &self.config.retry;
        let mut attempt = 0;
        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            debug!(
                "{} {} (attempt {attempt}/{})",
                request.header(METHOD_OVERRIDE_HEADER).unwrap_or(request.method.as_str()),
                request.url,
                policy.max_attempts
            );
            match self.transport.send(request) {
                Ok(response) => return Ok(response),
                Err(source) if source.retryable && attempt < policy.max_attempts => {
                    let delay = policy.delay_for(attempt);
                    warn!(
                        "{} {} failed ({source}), retrying in {delay:?}",
                        request.method, request.url
                    );
                    cancel.sleep(delay)?;
                }
                Err(source) => return Err(Error::Transport { attempts: attempt, source }),
            }
        }
    }

    /// PUT raw bytes to an upload URL. Upload URLs are absolute and may be
    /// presigned, in which case the bearer token must not be sent.
    pub fn put_bytes(
        &self,
        url: &str,
        bytes: Vec<u8>,
        include_auth: bool,
        cancel: &CancelToken,
    ) -> Result<ApiResponse> {
        let mut headers = vec![(
            "Content-Type".to_string(),
            "application/octet-stream".to_string(),
        )];
        if include_auth {
            let bearer = format!("Bearer {}", self.config.access_token);
            headers.insert(0, ("Authorization".to_string(), bearer));
        }
        let request = HttpRequest {
            method: HttpMethod::Put,
            url: url.to_string(),
            headers,
            body: Some(bytes),
            tunneled: false,
        };
        self.execute_with(&request, cancel)
    }

    /// Follow `paging.links[rel=next]` from `first`, collecting every page's
    /// `elements`. Stops after `max_pages` pages, or once `max_items`
    /// elements are collected. Follow-up pages are plain GETs that keep the
    /// operation's own headers.
    pub fn paginate(
        &self,
        first: HttpRequest,
        max_pages: usize,
        max_items: Option<usize>,
    ) -> Result<Value> {
        let carried = carried_headers(&first);
        let mut elements = Vec::new();
        let mut request = first;
        let mut pages = 0;
        loop {
            let response = self.execute(&request)?;
            pages += 1;
            let page = response.json()?;
            match page.get("elements") {
                Some(Value::Array(items)) => elements.extend(items.iter().cloned()),
                Some(_) => return Err(Error::Response("elements is not an array".to_string())),
                None => {}
            }
            if let Some(limit) = max_items {
                if elements.len() >= limit {
                    elements.truncate(limit);
                    debug!("stopping at {limit} element(s) after {pages} page(s)");
                    break;
                }
            }
            let Some(href) = next_link(&page) else {
                break;
            };
            if pages >= max_pages {
                warn!("stopping after {pages} page(s); more results are available");
                break;
            }
            let next = self.resolve_link(href)?;
            debug!("next page: {next}");
            let (url, query) = match next.split_once('?') {
                Some((url, query)) => (url.to_string(), query.to_string()),
                None => (next.clone(), String::new()),
            };
            request = self.assemble(HttpMethod::Get, url, query, None, &carried);
        }
        Ok(serde_json::json!({ "elements": elements }))
    }

    fn resolve_link(&self, href: &str) -> Result<String> {
        let base = Url::parse(&self.config.base_url)
            .map_err(|e| Error::Configuration(format!("invalid base URL: {e}")))?;
        base.join(href)
            .map(String::from)
            .map_err(|e| Error::Response(format!("invalid paging link {href}: {e}")))
    }
}

/// Headers of `request` that did not come from `assemble` itself.
fn carried_headers(request: &HttpRequest) -> Vec<(String, String)> {
    const OWN: [&str; 6] = [
        "authorization",
        "linkedin-version",
        "x-restli-protocol-version",
        "accept",
        "content-type",
        METHOD_OVERRIDE_HEADER,
    ];
    request
        .headers
        .iter()
        .filter(|(name, _)| !OWN.iter().any(|own| own.eq_ignore_ascii_case(name)))
        .cloned()
        .collect()
}

fn next_link(page: &Value) -> Option<&str> {
    page.pointer("/paging/links")?
        .as_array()?
        .iter()
        .find(|link| link.get("rel").and_then(Value::as_str) == Some("next"))?
        .get("href")?
        .as_str()
}

/// Path segment text for a JSON parameter used as a key.
fn key_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Ad account paths take the numeric id; accept the URN form too.
fn account_key(account: &str) -> String {
    match Urn::parse(account) {
        Ok(urn) if urn.entity_type() == "sponsoredAccount" => urn.id().to_string(),
        _ => account.to_string(),
    }
}
