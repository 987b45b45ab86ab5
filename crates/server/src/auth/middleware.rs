use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use tower::{Layer, Service};

use portcullis_core::ControlError;

use crate::error::ApiError;

use super::{AdminAuthProvider, AdminIdentity};

/// Tower layer guarding the admin API with bearer-key authentication.
#[derive(Clone)]
pub struct AuthLayer {
    provider: Option<Arc<AdminAuthProvider>>,
}

impl AuthLayer {
    pub fn new(provider: Option<Arc<AdminAuthProvider>>) -> Self {
        Self { provider }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            provider: self.provider.clone(),
        }
    }
}

/// Tower service that authenticates admin requests.
#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    provider: Option<Arc<AdminAuthProvider>>,
}

impl<S> Service<Request<Body>> for AuthMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let provider = self.provider.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let Some(provider) = provider else {
                // Auth disabled: inject an anonymous admin identity.
                req.extensions_mut().insert(AdminIdentity::anonymous());
                return inner.call(req).await;
            };

            let bearer = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "));
            let api_key = req.headers().get("x-api-key").and_then(|v| v.to_str().ok());

            if let Some(credential) = bearer.or(api_key) {
                if let Some(identity) = provider.authenticate_bearer(credential).await {
                    req.extensions_mut().insert(identity);
                    return inner.call(req).await;
                }
            }

            Ok(ApiError(ControlError::Unauthorized).into_response())
        })
    }
}
