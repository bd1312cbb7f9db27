//! Rate limiting middleware for the lookup HTTP client.

use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use log::debug;
use reqwest_middleware::{Middleware, Next, Result};
use std::num::NonZeroU32;
use std::sync::Arc;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Middleware that holds every request until the shared quota allows it.
#[derive(Clone)]
pub struct RateLimitMiddleware {
    limiter: Arc<DirectLimiter>,
}

impl RateLimitMiddleware {
    /// Create a limiter allowing `max_rps` requests per second, rounded up, at least one.
    pub fn new(max_rps: f64) -> Self {
        let per_second = NonZeroU32::new(max_rps.ceil() as u32).unwrap_or(NonZeroU32::MIN);
        let limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));
        Self { limiter }
    }
}

#[async_trait]
impl Middleware for RateLimitMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> Result<reqwest::Response> {
        if self.limiter.check().is_err() {
            debug!("Lookup rate limit reached, waiting before {}", req.url());
            self.limiter.until_ready().await;
        }
        next.run(req, extensions).await
    }
}
