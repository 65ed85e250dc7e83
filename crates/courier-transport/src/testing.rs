//! Test doubles shared by the unit tests of this crate.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use courier_core::{ApiError, ApiResult, TransportError};

use crate::request::ApiRequest;
use crate::transport::{ApiTransport, RawResponse};

/// One scripted attempt outcome.
pub(crate) enum Scripted {
    Respond(RawResponse),
    Fail(TransportError),
    /// Never completes; only a timeout ends the attempt.
    Hang,
}

/// Replays a fixed script, one step per attempt, and records methods.
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    methods: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    pub(crate) fn new(script: impl IntoIterator<Item = Scripted>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            methods: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn methods(&self) -> Vec<String> {
        self.methods.lock().clone()
    }
}

#[async_trait]
impl ApiTransport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> ApiResult<RawResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.methods.lock().push(request.method().to_string());

        let step = self.script.lock().pop_front();
        match step {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(err)) => Err(err.into()),
            Some(Scripted::Hang) => std::future::pending().await,
            None => Err(ApiError::Other("script exhausted".into())),
        }
    }
}
