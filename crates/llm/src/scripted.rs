use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use voyage_core::{PlannerError, PlannerResult};

use crate::{CompletionClient, CompletionRequest, CompletionResponse};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedReply {
    Content(String),
    Upstream(String),
}

#[derive(Clone)]
pub struct ScriptedCompletionClient {
    replies: Arc<Mutex<VecDeque<ScriptedReply>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
    has_credential: bool,
}

impl Default for ScriptedCompletionClient {
    fn default() -> Self {
        Self {
            replies: Arc::default(),
            requests: Arc::default(),
            has_credential: true,
        }
    }
}

impl ScriptedCompletionClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unconfigured() -> Self {
        Self {
            has_credential: false,
            ..Self::default()
        }
    }

    pub fn with_replies<I, T>(replies: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let client = Self::default();
        for reply in replies {
            client.push_content(reply);
        }
        client
    }

    pub fn push_content(&self, content: impl Into<String>) {
        self.replies
            .lock()
            .push_back(ScriptedReply::Content(content.into()));
    }

    pub fn push_failure(&self, message: impl Into<String>) {
        self.replies
            .lock()
            .push_back(ScriptedReply::Upstream(message.into()));
    }

    pub fn has_credential(&self) -> bool {
        self.has_credential
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }
}

impl CompletionClient for ScriptedCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> PlannerResult<CompletionResponse> {
        if !self.has_credential {
            return Err(PlannerError::Configuration(
                "DASHSCOPE_API_KEY is not set".to_string(),
            ));
        }

        self.requests.lock().push(request.clone());

        match self.replies.lock().pop_front() {
            Some(ScriptedReply::Content(content)) => Ok(CompletionResponse::text(content)),
            Some(ScriptedReply::Upstream(message)) => Err(PlannerError::Upstream(message)),
            None => Err(PlannerError::Upstream(
                "no scripted completion left".to_string(),
            )),
        }
    }
}
