/// Authorization Middleware
///
/// Runs the token manager for every request in its scope. The subject id is
/// taken from a header set by the upstream session layer; the presented
/// access token comes from the cookie (or a bearer header). On success the
/// `Authorized` result is injected into request extensions and the new
/// access token cookie is attached to the response.
///
/// The subject header is trusted as-is, so whoever can set it can obtain
/// tokens for any subject. It is only honored from `trusted_peers` (loopback
/// by default); the scope must not be reachable other than through the
/// session layer.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage, HttpResponse, ResponseError,
};
use futures::future::LocalBoxFuture;
use std::net::IpAddr;
use std::rc::Rc;

use crate::auth::{CookieTransport, TokenManager};
use crate::error::{AppError, TokenError};

pub struct AuthorizationMiddleware {
    manager: TokenManager,
    transport: CookieTransport,
    subject_header: Rc<str>,
    trusted_peers: Rc<[IpAddr]>,
}

impl AuthorizationMiddleware {
    pub fn new(
        manager: TokenManager,
        transport: CookieTransport,
        subject_header: &str,
        trusted_peers: &[IpAddr],
    ) -> Self {
        Self {
            manager,
            transport,
            subject_header: Rc::from(subject_header),
            trusted_peers: Rc::from(trusted_peers),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthorizationMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthorizationMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(AuthorizationMiddlewareService {
            service: Rc::new(service),
            manager: self.manager.clone(),
            transport: self.transport.clone(),
            subject_header: self.subject_header.clone(),
            trusted_peers: self.trusted_peers.clone(),
        }))
    }
}

pub struct AuthorizationMiddlewareService<S> {
    service: Rc<S>,
    manager: TokenManager,
    transport: CookieTransport,
    subject_header: Rc<str>,
    trusted_peers: Rc<[IpAddr]>,
}

impl<S> AuthorizationMiddlewareService<S> {
    fn is_trusted(&self, req: &ServiceRequest) -> bool {
        if self.trusted_peers.is_empty() {
            return true;
        }
        req.peer_addr()
            .map(|addr| self.trusted_peers.contains(&addr.ip()))
            .unwrap_or(false)
    }
}

impl<S, B> Service<ServiceRequest> for AuthorizationMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if !self.is_trusted(&req) {
            tracing::warn!(peer = ?req.peer_addr(), "Subject header from untrusted peer");
            let response = HttpResponse::Forbidden().json(serde_json::json!({
                "error": "Peer is not allowed to assert a subject",
                "code": "UNTRUSTED_PEER"
            }));
            return Box::pin(async move {
                Err(actix_web::error::InternalError::from_response("Forbidden", response).into())
            });
        }

        let subject_id = req
            .headers()
            .get(&*self.subject_header)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.trim().parse::<i64>().ok());

        let Some(subject_id) = subject_id else {
            tracing::warn!(header = %self.subject_header, "Missing or invalid subject header");
            let response = HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "Missing or invalid subject",
                "code": "MISSING_SUBJECT"
            }));
            return Box::pin(async move {
                Err(actix_web::error::InternalError::from_response("Unauthorized", response).into())
            });
        };

        let presented = self.transport.read(req.request());
        let manager = self.manager.clone();
        let transport = self.transport.clone();
        let service = self.service.clone();

        Box::pin(async move {
            let mut sink = transport.sink();
            let authorized = match manager
                .authorize_and_publish(subject_id, presented.as_deref(), &mut sink)
                .await
            {
                Ok(authorized) => authorized,
                Err(err @ AppError::Token(TokenError::Expired)) => {
                    let mut response = err.error_response();
                    if let Err(e) = response.add_cookie(&transport.clear()) {
                        tracing::warn!(error = %e, "Failed to attach clearing cookie");
                    }
                    return Err(actix_web::error::InternalError::from_response(
                        "Session expired",
                        response,
                    )
                    .into());
                }
                Err(err) => return Err(err.into()),
            };

            tracing::debug!(
                subject_id = subject_id,
                outcome = ?authorized.outcome,
                "Request authorized"
            );
            req.extensions_mut().insert(authorized);

            let mut res = service.call(req).await?;
            if let Some(cookie) = sink.into_cookie() {
                res.response_mut().add_cookie(&cookie)?;
            }
            Ok(res)
        })
    }
}
