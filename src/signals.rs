//! Reading signals sent by the browser.
//!
//! Read requests (GET, HEAD) carry the signals as JSON in the `datastar`
//! query parameter. Every other request carries them in the body: either a
//! JSON object, or a form with a `datastar` field holding JSON. A form
//! without that field is taken as a flat record of strings.
use http::request::Parts;
use http::{header, Method, Request};
use http_body_util::{BodyExt, Limited};
use hyper::body::Body;
use serde_json::Value;

use datastar_backend_types::{SignalReadResult, SignalSet};

use crate::defaults::SIGNALS_PARAM;
use crate::Error;

/// Largest request body read for signals, in bytes.
pub const MAX_SIGNALS_BODY_BYTES: usize = 1024 * 1024;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

type BodyDecoder = fn(&[u8]) -> Result<SignalSet, Error>;

/// Body decoders by content type. Anything unlisted is decoded as JSON.
static BODY_DECODERS: &[(&str, BodyDecoder)] = &[
    ("application/json", decode_json),
    ("application/x-www-form-urlencoded", decode_form),
];

/// Read signals from a request, never failing.
pub async fn read_signals<B>(req: Request<B>) -> SignalReadResult
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let result = read_signals_strict(req).await;
    if let Err(ref e) = result {
        debug!("failed reading signals: {}", e);
    }
    result.into()
}

/// Read signals from a request, returning why they could not be read.
pub async fn read_signals_strict<B>(req: Request<B>) -> Result<SignalSet, Error>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let (parts, body) = req.into_parts();
    read_parts(&parts, body).await
}

/// Read signals and lay them over `defaults`.
///
/// Any failure is swallowed and `defaults` returned unchanged. Use
/// [`read_signals`] when the reason matters.
pub async fn read_signals_with_defaults<B>(req: Request<B>, defaults: SignalSet) -> SignalSet
where
    B: Body,
    B::Error: Into<BoxError>,
{
    match read_signals_strict(req).await {
        Ok(signals) => merge(defaults, signals),
        Err(e) => {
            debug!("using default signals: {}", e);
            defaults
        }
    }
}

pub(crate) async fn read_parts<B>(parts: &Parts, body: B) -> Result<SignalSet, Error>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    if is_read_method(&parts.method) {
        return decode_signals(parts, &[]);
    }
    let bytes = Limited::new(body, MAX_SIGNALS_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| Error::Transport(e.to_string()))?
        .to_bytes();
    decode_signals(parts, &bytes)
}

/// Decode signals from request metadata and an already collected body.
pub fn decode_signals(parts: &Parts, body: &[u8]) -> Result<SignalSet, Error> {
    if is_read_method(&parts.method) {
        let query = parts.uri.query().unwrap_or("");
        let param = url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == SIGNALS_PARAM)
            .map(|(_, value)| value)
            .filter(|value| !value.is_empty())
            .ok_or(Error::MissingParameter(SIGNALS_PARAM))?;
        return decode_json(param.as_bytes());
    }

    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase())
        .unwrap_or_default();

    let decoder = BODY_DECODERS
        .iter()
        .find(|(mime, _)| content_type.contains(mime))
        .map(|(_, decoder)| *decoder)
        .unwrap_or(decode_json);
    decoder(body)
}

/// Whether a request was made by the Datastar client.
pub fn is_datastar_request(parts: &Parts) -> bool {
    let header_is = |name: &str, pred: &dyn Fn(&str) -> bool| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map_or(false, |v| pred(v))
    };

    if header_is("datastar-request", &|v: &str| v == "true") {
        return true;
    }
    if header_is(header::ACCEPT.as_str(), &|v: &str| {
        v.contains("text/event-stream")
    }) {
        return true;
    }
    parts.uri.query().map_or(false, |query| {
        url::form_urlencoded::parse(query.as_bytes()).any(|(key, _)| key == SIGNALS_PARAM)
    })
}

fn is_read_method(method: &Method) -> bool {
    method == Method::GET || method == Method::HEAD
}

fn decode_json(body: &[u8]) -> Result<SignalSet, Error> {
    let value: Value = serde_json::from_slice(body)?;
    into_record(value)
}

fn decode_form(body: &[u8]) -> Result<SignalSet, Error> {
    let fields: Vec<(String, String)> = url::form_urlencoded::parse(body).into_owned().collect();

    if let Some((_, json)) = fields.iter().find(|(key, _)| key == SIGNALS_PARAM) {
        return decode_json(json.as_bytes());
    }

    Ok(fields
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect())
}

fn into_record(value: Value) -> Result<SignalSet, Error> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Array(_) => Err(Error::NotARecord("array")),
        Value::String(_) => Err(Error::NotARecord("string")),
        Value::Number(_) => Err(Error::NotARecord("number")),
        Value::Bool(_) => Err(Error::NotARecord("boolean")),
        Value::Null => Err(Error::NotARecord("null")),
    }
}

fn merge(mut defaults: SignalSet, signals: SignalSet) -> SignalSet {
    defaults.extend(signals);
    defaults
}
