use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::{AutomationContext, AutomationError, AutomationInvoker};

/// Posts each dispatch as JSON to `{base_url}/{action}`.
pub struct WebhookInvoker {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl WebhookInvoker {
    pub fn new(
        base_url: String,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AutomationError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
        })
    }

    fn url_for(&self, action: &str) -> String {
        format!("{}/{}", self.base_url, action)
    }
}

#[async_trait]
impl AutomationInvoker for WebhookInvoker {
    async fn invoke(&self, action: &str, ctx: &AutomationContext) -> Result<(), AutomationError> {
        let mut request = self.client.post(self.url_for(action)).json(ctx);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AutomationError::UnknownAction(action.to_string()));
        }
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(AutomationError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        tracing::debug!(action, status = status.as_u16(), "webhook accepted");
        Ok(())
    }
}
