use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use parley_core::errors::GenerationError;
use parley_core::messages::Message;

use crate::provider::GenerationBackend;

/// Scripted backend for deterministic tests without network calls.
/// Responses are consumed in order; every call's history is recorded so
/// tests can assert exactly what the backend was asked.
pub struct MockBackend {
    responses: Mutex<VecDeque<Result<String, GenerationError>>>,
    histories: Mutex<Vec<Vec<Message>>>,
}

impl MockBackend {
    pub fn new(responses: Vec<Result<String, GenerationError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            histories: Mutex::new(Vec::new()),
        }
    }

    /// Convenience: a single successful reply.
    pub fn replying(text: &str) -> Self {
        Self::new(vec![Ok(text.to_string())])
    }

    /// Convenience: a single failure.
    pub fn failing(error: GenerationError) -> Self {
        Self::new(vec![Err(error)])
    }

    pub fn call_count(&self) -> usize {
        self.histories.lock().len()
    }

    /// The history each call received, in call order.
    pub fn histories(&self) -> Vec<Vec<Message>> {
        self.histories.lock().clone()
    }
}

#[async_trait]
impl GenerationBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, history: &[Message]) -> Result<String, GenerationError> {
        self.histories.lock().push(history.to_vec());

        match self.responses.lock().pop_front() {
            Some(response) => response,
            None => Err(GenerationError::Network(
                "mock backend: response script exhausted".into(),
            )),
        }
    }
}
