//! Tower layer that runs the [`Gatekeeper`] in front of every route.
//!
//! # Usage
//!
//! ```rust,ignore
//! let router = Router::new()
//!     .route("/api/v1/me", get(me))
//!     .layer(GatekeeperLayer::new(state.gatekeeper.clone()));
//! ```
//!
//! Bypassed and admitted requests reach the inner service; rejections are
//! answered here and never reach it. Dropping the response future drops any
//! in-flight introspection request with it.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use tower::{Layer, Service};

use crate::auth::{AuthDecision, Gatekeeper};

/// Layer that wraps services with bearer-token authentication.
#[derive(Clone)]
pub struct GatekeeperLayer {
    gatekeeper: Arc<Gatekeeper>,
}

impl GatekeeperLayer {
    pub fn new(gatekeeper: Arc<Gatekeeper>) -> Self {
        Self { gatekeeper }
    }
}

impl<S> Layer<S> for GatekeeperLayer {
    type Service = GatekeeperService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GatekeeperService {
            inner,
            gatekeeper: self.gatekeeper.clone(),
        }
    }
}

/// Authentication service wrapper.
#[derive(Clone)]
pub struct GatekeeperService<S> {
    inner: S,
    gatekeeper: Arc<Gatekeeper>,
}

impl<S> Service<Request<Body>> for GatekeeperService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let gatekeeper = self.gatekeeper.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            match gatekeeper.evaluate(&mut req).await {
                AuthDecision::Bypassed | AuthDecision::Admitted(_) => inner.call(req).await,
                AuthDecision::Rejected(err) => Ok(err.into_response()),
            }
        })
    }
}
