//! Scripted transport for driving the protocol paths without a server.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use bytes::Bytes;
use reqwest::header::RANGE;
use reqwest::{Method, Request, Response, Url};

use crate::api::{ApiRequester, TransportError};

/// One canned transport outcome.
#[derive(Debug)]
pub(crate) enum Step {
    Respond(Response),
    Fail(String),
}

/// What a scripted transport observed about one request.
#[derive(Debug, Clone)]
pub(crate) struct SeenRequest {
    pub method: Method,
    pub url:    Url,
    pub range:  Option<String>,
}

/// Transport that plays back a fixed script and records every request.
///
/// Clones share the script and the log, so a test can keep a handle while
/// the code under test owns another.
#[derive(Clone, Debug)]
pub(crate) struct ScriptedApi {
    inner: Rc<Inner>,
}

#[derive(Debug)]
struct Inner {
    steps: RefCell<VecDeque<Step>>,
    seen:  RefCell<Vec<SeenRequest>>,
}

impl ScriptedApi {
    pub(crate) fn new(steps: Vec<Step>) -> Self {
        Self {
            inner: Rc::new(Inner {
                steps: RefCell::new(steps.into()),
                seen:  RefCell::new(Vec::new()),
            }),
        }
    }

    pub(crate) fn seen(&self) -> Vec<SeenRequest> {
        self.inner.seen.borrow().clone()
    }
}

impl ApiRequester for ScriptedApi {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        self.inner.seen.borrow_mut().push(SeenRequest {
            method: request.method().clone(),
            url:    request.url().clone(),
            range:  request
                .headers()
                .get(RANGE)
                .and_then(|v| v.to_str().ok())
                .map(String::from),
        });
        match self.inner.steps.borrow_mut().pop_front() {
            Some(Step::Respond(response)) => Ok(response),
            Some(Step::Fail(msg)) => Err(TransportError::Other(msg)),
            None => Err(TransportError::Other("script exhausted".into())),
        }
    }
}

/// Response with a fully buffered body (content length known).
pub(crate) fn response(status: u16, body: impl Into<reqwest::Body>) -> Response {
    Response::from(
        http::Response::builder()
            .status(status)
            .body(body.into())
            .unwrap(),
    )
}

/// Response whose body arrives as a stream: no declared length, and any
/// chunk may fail mid-transfer.
pub(crate) fn streaming_response(status: u16, chunks: Vec<std::io::Result<Bytes>>) -> Response {
    response(
        status,
        reqwest::Body::wrap_stream(futures_util::stream::iter(chunks)),
    )
}
