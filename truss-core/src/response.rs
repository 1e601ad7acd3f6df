//! Response actions and the sink they write to.
//!
//! A handler never touches the transport. Dispatching a value means picking a
//! [`ResponseAction`] and handing the value to a [`ResponseSink`]. The sink
//! decides which actions it can perform; asking for one it lacks fails with
//! [`Error::ResponseActionNotSupported`].

use crate::{Error, HttpResponse};
use http::StatusCode;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// The closed set of ways a handler's return value can be written out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseAction {
    /// Serialize the value as a JSON body
    #[default]
    Json,
    /// Strings go out as HTML text, everything else as JSON
    Send,
    /// Redirect to the URL held in the value
    Redirect,
    /// Use the value as the status code, with its reason phrase as body
    SendStatus,
    /// Finish the response without a body
    End,
    /// Render a view; needs a sink with a template engine
    Render,
}

impl ResponseAction {
    pub const ALL: [ResponseAction; 6] = [
        ResponseAction::Json,
        ResponseAction::Send,
        ResponseAction::Redirect,
        ResponseAction::SendStatus,
        ResponseAction::End,
        ResponseAction::Render,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseAction::Json => "json",
            ResponseAction::Send => "send",
            ResponseAction::Redirect => "redirect",
            ResponseAction::SendStatus => "send_status",
            ResponseAction::End => "end",
            ResponseAction::Render => "render",
        }
    }
}

impl fmt::Display for ResponseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(ResponseAction::Json),
            "send" => Ok(ResponseAction::Send),
            "redirect" => Ok(ResponseAction::Redirect),
            "send_status" | "sendStatus" => Ok(ResponseAction::SendStatus),
            "end" => Ok(ResponseAction::End),
            "render" => Ok(ResponseAction::Render),
            other => Err(Error::ResponseActionNotSupported(other.to_string())),
        }
    }
}

/// Where dispatched values end up.
pub trait ResponseSink: Send + Sync {
    /// Whether this sink has a function for `action`.
    fn supports(&self, action: ResponseAction) -> bool;

    /// Write `payload` out using `action`. Called at most once per request.
    fn dispatch(&self, action: ResponseAction, payload: Value) -> Result<(), Error>;

    fn set_status(&self, code: u16);

    fn set_header(&self, name: &str, value: &str);

    /// True once a response has been written.
    fn is_sent(&self) -> bool;
}

#[derive(Debug)]
struct ResponseState {
    response: HttpResponse,
    sent: bool,
}

/// In-memory sink that assembles an [`HttpResponse`].
///
/// Supports every action except [`ResponseAction::Render`].
#[derive(Debug)]
pub struct BufferedResponse {
    state: Mutex<ResponseState>,
}

impl BufferedResponse {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ResponseState {
                response: HttpResponse::ok(),
                sent: false,
            }),
        }
    }

    /// Snapshot of the response as written so far.
    pub fn to_response(&self) -> HttpResponse {
        self.state.lock().response.clone()
    }

    fn write(
        &self,
        content_type: Option<&str>,
        body: Vec<u8>,
        status: Option<u16>,
    ) -> Result<(), Error> {
        let mut state = self.state.lock();
        if state.sent {
            return Err(Error::HeadersAlreadySent);
        }
        if let Some(code) = status {
            state.response.status = code;
        }
        if let Some(content_type) = content_type {
            state
                .response
                .headers
                .insert("Content-Type".to_string(), content_type.to_string());
        }
        state.response.body = body;
        state.sent = true;
        Ok(())
    }
}

impl Default for BufferedResponse {
    fn default() -> Self {
        Self::new()
    }
}

fn to_json(payload: &Value) -> Result<Vec<u8>, Error> {
    serde_json::to_vec(payload).map_err(|e| Error::Serialization(e.to_string()))
}

impl ResponseSink for BufferedResponse {
    fn supports(&self, action: ResponseAction) -> bool {
        action != ResponseAction::Render
    }

    fn dispatch(&self, action: ResponseAction, payload: Value) -> Result<(), Error> {
        match action {
            ResponseAction::Json => self.write(Some("application/json"), to_json(&payload)?, None),
            ResponseAction::Send => match payload {
                Value::String(text) => {
                    self.write(Some("text/html; charset=utf-8"), text.into_bytes(), None)
                }
                other => self.write(Some("application/json"), to_json(&other)?, None),
            },
            ResponseAction::Redirect => {
                let location = payload.as_str().ok_or_else(|| {
                    Error::Internal("redirect target must be a string".to_string())
                })?;
                self.set_header("Location", location);
                self.write(None, Vec::new(), Some(StatusCode::FOUND.as_u16()))
            }
            ResponseAction::SendStatus => {
                let code = payload
                    .as_u64()
                    .and_then(|c| u16::try_from(c).ok())
                    .and_then(|c| StatusCode::from_u16(c).ok())
                    .ok_or_else(|| Error::Internal(format!("invalid status code: {}", payload)))?;
                let reason = code.canonical_reason().unwrap_or_default();
                self.write(
                    Some("text/plain; charset=utf-8"),
                    reason.as_bytes().to_vec(),
                    Some(code.as_u16()),
                )
            }
            ResponseAction::End => self.write(None, Vec::new(), None),
            ResponseAction::Render => Err(Error::ResponseActionNotSupported(
                ResponseAction::Render.to_string(),
            )),
        }
    }

    fn set_status(&self, code: u16) {
        self.state.lock().response.status = code;
    }

    fn set_header(&self, name: &str, value: &str) {
        self.state
            .lock()
            .response
            .headers
            .insert(name.to_string(), value.to_string());
    }

    fn is_sent(&self) -> bool {
        self.state.lock().sent
    }
}

/// Live response handle given to handlers.
#[derive(Clone)]
pub struct Response {
    sink: Arc<dyn ResponseSink>,
}

impl Response {
    pub fn new(sink: Arc<dyn ResponseSink>) -> Self {
        Self { sink }
    }

    pub fn supports(&self, action: ResponseAction) -> bool {
        self.sink.supports(action)
    }

    pub fn dispatch(&self, action: ResponseAction, payload: Value) -> Result<(), Error> {
        self.sink.dispatch(action, payload)
    }

    pub fn status(&self, code: u16) -> &Self {
        self.sink.set_status(code);
        self
    }

    pub fn header(&self, name: &str, value: &str) -> &Self {
        self.sink.set_header(name, value);
        self
    }

    pub fn json<T: Serialize>(&self, value: &T) -> Result<(), Error> {
        let payload =
            serde_json::to_value(value).map_err(|e| Error::Serialization(e.to_string()))?;
        self.dispatch(ResponseAction::Json, payload)
    }

    pub fn send(&self, text: impl Into<String>) -> Result<(), Error> {
        self.dispatch(ResponseAction::Send, Value::String(text.into()))
    }

    pub fn redirect(&self, location: impl Into<String>) -> Result<(), Error> {
        self.dispatch(ResponseAction::Redirect, Value::String(location.into()))
    }

    pub fn send_status(&self, code: u16) -> Result<(), Error> {
        self.dispatch(ResponseAction::SendStatus, Value::from(code))
    }

    pub fn end(&self) -> Result<(), Error> {
        self.dispatch(ResponseAction::End, Value::Null)
    }

    pub fn is_sent(&self) -> bool {
        self.sink.is_sent()
    }

    /// The status-setting function of this response, not yet invoked.
    pub fn status_setter(&self) -> Status {
        Status {
            sink: self.sink.clone(),
        }
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("sent", &self.sink.is_sent())
            .finish()
    }
}

/// Deferred status setter bound to one response.
#[derive(Clone)]
pub struct Status {
    sink: Arc<dyn ResponseSink>,
}

impl Status {
    pub fn set(&self, code: u16) {
        self.sink.set_status(code);
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Status")
    }
}
