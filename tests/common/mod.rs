#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use radiology_assistant::error::ModelError;
use radiology_assistant::services::model_client::{
    GenerateRequest, ModelSettings, Part, RemoteModelClient, Transport,
};

type Responder = Box<dyn Fn(usize) -> (Duration, Result<String, ModelError>) + Send + Sync>;

/// Records every request and answers from a per-call script.
pub struct FakeTransport {
    responder: Responder,
    requests: Mutex<Vec<(String, GenerateRequest)>>,
}

impl FakeTransport {
    pub fn new(
        responder: impl Fn(usize) -> (Duration, Result<String, ModelError>) + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn replying(text: &'static str) -> Arc<Self> {
        Self::new(move |_| (Duration::ZERO, Ok(text.to_string())))
    }

    pub fn slow(delay: Duration, text: &'static str) -> Arc<Self> {
        Self::new(move |_| (delay, Ok(text.to_string())))
    }

    pub fn failing() -> Arc<Self> {
        Self::new(|_| {
            (
                Duration::ZERO,
                Err(ModelError::RemoteCall("503 Service Unavailable".to_string())),
            )
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<(String, GenerateRequest)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn generate(&self, model: &str, request: &GenerateRequest) -> Result<String, ModelError> {
        let index = {
            let mut requests = self.requests.lock().unwrap();
            requests.push((model.to_string(), request.clone()));
            requests.len() - 1
        };
        let (delay, result) = (self.responder)(index);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

pub async fn client_with(transport: Arc<FakeTransport>) -> Arc<RemoteModelClient> {
    let client = RemoteModelClient::new(ModelSettings::default());
    client.initialize_with(transport).await;
    Arc::new(client)
}

pub fn uninitialized_client() -> Arc<RemoteModelClient> {
    Arc::new(RemoteModelClient::new(ModelSettings::default()))
}

/// Text of every part, in order, for each content of a request.
pub fn texts(request: &GenerateRequest) -> Vec<(Option<String>, String)> {
    request
        .contents
        .iter()
        .flat_map(|c| {
            c.parts.iter().filter_map(move |p| match p {
                Part::Text(t) => Some((c.role.clone(), t.clone())),
                Part::InlineData(_) => None,
            })
        })
        .collect()
}
