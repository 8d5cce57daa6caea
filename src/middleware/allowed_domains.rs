use async_trait::async_trait;
use tracing::debug;

use super::DownloaderMiddleware;
use crate::engine::Droppable;
use crate::request::Request;

/// Drops requests to hosts outside an allow list.
///
/// A listed domain also admits its subdomains: `example.com` lets
/// `blog.example.com` through.
#[derive(Debug, Clone)]
pub struct AllowedDomainsMiddleware {
    domains: Vec<String>,
}

impl AllowedDomainsMiddleware {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AllowedDomainsMiddleware {
            domains: domains
                .into_iter()
                .map(|domain| domain.into().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn is_allowed(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.domains.iter().any(|domain| {
            host == *domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

#[async_trait]
impl DownloaderMiddleware for AllowedDomainsMiddleware {
    fn name(&self) -> &str {
        "AllowedDomainsMiddleware"
    }

    async fn process_request(&self, mut request: Request) -> Request {
        let allowed = request
            .url()
            .host_str()
            .is_some_and(|host| self.is_allowed(host));
        if !allowed {
            debug!("Request to {} is outside the allowed domains", request.uri());
            request.mark_dropped("Domain not allowed");
        }
        request
    }
}
