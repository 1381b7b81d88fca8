//! Response values produced by the pipeline.

use std::time::Duration;

use serde_json::Value;

/// Transport-facing customisation a handler may apply to its response.
///
/// Handlers receive a `&mut Reply` alongside the request; transports read it
/// back when encoding the final answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    status: Option<u16>,
    headers: Vec<(String, String)>,
}

impl Reply {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the success status (transports default to 200).
    pub fn set_status(&mut self, status: u16) -> &mut Self {
        self.status = Some(status);
        self
    }

    /// Appends a response header.
    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }
}

/// Successful pipeline output.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Correlation id of the request that produced this response.
    pub id: String,
    /// Response value after the response hook fold.
    pub body: Value,
    /// Handler-supplied status and headers.
    pub reply: Reply,
    /// Time spent inside the pipeline.
    pub elapsed: Duration,
}

impl Response {
    /// Status a transport should answer with.
    pub fn status(&self) -> u16 {
        self.reply.status().unwrap_or(200)
    }
}
