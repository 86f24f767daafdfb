//! In-memory [`Transport`] replaying a fixed script of outcomes.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::transport::{FetchRequest, FetchResponse, Transport, TransportError};

pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<FetchResponse, TransportError>>>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl ScriptedTransport {
    pub fn new<I>(script: I) -> Self
    where
        I: IntoIterator<Item = Result<FetchResponse, TransportError>>,
    {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request seen so far, in order.
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, request: &FetchRequest) -> Result<FetchResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Connection("script exhausted".into())))
    }
}
