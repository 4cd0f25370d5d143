//! `retrieve_content` — fetch corpus passages through the retrieval proxy.

use std::sync::Arc;

use async_trait::async_trait;
use tandem_core::action::{Action, ActionKind, ActionRequest};
use tandem_core::error::ActionError;

use crate::retrieval_proxy::RetrievalProxy;

pub struct RetrieveContentAction {
    proxy: Arc<RetrievalProxy>,
}

impl RetrieveContentAction {
    pub fn new(proxy: Arc<RetrievalProxy>) -> Self {
        Self { proxy }
    }
}

#[async_trait]
impl Action for RetrieveContentAction {
    fn kind(&self) -> ActionKind {
        ActionKind::RetrieveContent
    }

    async fn invoke(&self, request: ActionRequest) -> Result<String, ActionError> {
        let (message, n_results) = match request {
            ActionRequest::RetrieveContent { message, n_results } => (message, n_results),
            other => {
                return Err(ActionError::InvalidArguments {
                    action: ActionKind::RetrieveContent.name().into(),
                    reason: format!("unexpected payload for {}", other.kind()),
                });
            }
        };

        self.proxy
            .retrieve_content(&message, n_results)
            .await
            .map_err(|e| ActionError::ExecutionFailed {
                action: ActionKind::RetrieveContent.name().into(),
                reason: e.to_string(),
            })
    }
}
