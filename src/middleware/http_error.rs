use async_trait::async_trait;
use http::StatusCode;
use tracing::debug;

use super::DownloaderMiddleware;
use crate::engine::Droppable;
use crate::response::Response;

/// Drops responses whose status is not in the 2xx range.
///
/// Statuses listed through [`allow_status`](Self::allow_status) are passed on
/// to the spider regardless.
#[derive(Debug, Default)]
pub struct HttpErrorMiddleware {
    allowed: Vec<StatusCode>,
}

impl HttpErrorMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_status(mut self, status: StatusCode) -> Self {
        self.allowed.push(status);
        self
    }
}

#[async_trait]
impl DownloaderMiddleware for HttpErrorMiddleware {
    fn name(&self) -> &str {
        "HttpErrorMiddleware"
    }

    async fn process_response(&self, mut response: Response) -> Response {
        let status = response.status;
        if !status.is_success() && !self.allowed.contains(&status) {
            debug!("Ignoring response {} for {}", status, response.request().uri());
            response.mark_dropped(&format!("Unsuccessful HTTP status {}", status.as_u16()));
        }
        response
    }
}
