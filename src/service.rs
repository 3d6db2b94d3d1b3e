use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures_util::{future, Future};
use http::Request;
use tower_layer::Layer;
use tower_service::Service;

use crate::{key::Credentials, request::RequestSigner};

/// Boxed error returned by [`SigningService`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Layer applying [`SigningService`] to an HTTP client service.
#[derive(Debug, Clone)]
pub struct SigningLayer {
    signer: RequestSigner,
}

impl SigningLayer {
    /// Create a new [`SigningLayer`] with the provided [`Credentials`].
    pub fn new(credentials: Credentials) -> Self {
        Self {
            signer: RequestSigner::new(credentials),
        }
    }

    /// Create a [`SigningLayer`] from a configured [`RequestSigner`].
    pub fn with_signer(signer: RequestSigner) -> Self {
        Self { signer }
    }
}

impl<S> Layer<S> for SigningLayer {
    type Service = SigningService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SigningService {
            inner,
            signer: self.signer.clone(),
        }
    }
}

/// Middleware signing outgoing write requests before handing them to the
/// inner service.
#[derive(Debug, Clone)]
pub struct SigningService<S> {
    inner: S,
    signer: RequestSigner,
}

impl<S, ReqBody> Service<Request<ReqBody>> for SigningService<S>
where
    S: Service<Request<ReqBody>>,
    S::Response: Send + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, ctx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(ctx).map_err(Into::into)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let (mut parts, body) = req.into_parts();

        if self.signer.config().requires_signature(&parts.method) {
            if let Err(err) = self.signer.sign_request(&mut parts) {
                tracing::error!(err = %err, uri = %parts.uri, "could not sign request");
                return Box::pin(future::ready(Err::<S::Response, BoxError>(err.into())));
            }
        }

        let fut = self.inner.call(Request::from_parts(parts, body));
        Box::pin(async move { fut.await.map_err(Into::<BoxError>::into) })
    }
}
