//! Authentication and authorization as a middleware chain: authenticate, then authorize,
//! each a plain function over an [`AuthContext`].

use crate::error::AppError;
use crate::extractors::{Format, ACCEPT_HEADER};
use crate::response::reply;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method},
    middleware::Next,
    response::Response,
};
use std::fmt;
use std::sync::Arc;

/// Header read by [`token_authenticator`].
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// What a request is trying to do, handed to each auth stage.
#[derive(Clone, Debug)]
pub struct AuthContext {
    pub method: Method,
    pub path: String,
    /// Resource path segment the route belongs to (e.g. `users`).
    pub resource: String,
    pub headers: HeaderMap,
    /// Set by an authenticate stage once the caller is known.
    pub principal: Option<String>,
}

pub type AuthStage = Arc<dyn Fn(AuthContext) -> Result<AuthContext, AppError> + Send + Sync>;

/// Pluggable authenticate / authorize stages. Absent stages let every request through.
#[derive(Clone, Default)]
pub struct AuthGate {
    authenticate: Option<AuthStage>,
    authorize: Option<AuthStage>,
}

impl fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthGate")
            .field("authenticate", &self.authenticate.is_some())
            .field("authorize", &self.authorize.is_some())
            .finish()
    }
}

impl AuthGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_authenticate<F>(mut self, f: F) -> Self
    where
        F: Fn(AuthContext) -> Result<AuthContext, AppError> + Send + Sync + 'static,
    {
        self.authenticate = Some(Arc::new(f));
        self
    }

    pub fn with_authorize<F>(mut self, f: F) -> Self
    where
        F: Fn(AuthContext) -> Result<AuthContext, AppError> + Send + Sync + 'static,
    {
        self.authorize = Some(Arc::new(f));
        self
    }

    /// Run both stages in order.
    pub fn check(&self, ctx: AuthContext) -> Result<AuthContext, AppError> {
        let ctx = match &self.authenticate {
            Some(stage) => stage(ctx)?,
            None => ctx,
        };
        match &self.authorize {
            Some(stage) => stage(ctx),
            None => Ok(ctx),
        }
    }
}

/// State for the [`require_auth`] layer on one resource's routes.
#[derive(Clone, Debug)]
pub struct GateState {
    pub gate: AuthGate,
    pub resource: Arc<str>,
}

/// Middleware: run the gate, store the resulting context in request extensions, continue.
pub async fn require_auth(State(state): State<GateState>, mut request: Request, next: Next) -> Response {
    let ctx = AuthContext {
        method: request.method().clone(),
        path: request.uri().path().to_string(),
        resource: state.resource.to_string(),
        headers: request.headers().clone(),
        principal: None,
    };
    match state.gate.check(ctx) {
        Ok(ctx) => {
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(e) => {
            let format = Format::from_accept(
                request
                    .headers()
                    .get(ACCEPT_HEADER)
                    .and_then(|v| v.to_str().ok()),
            );
            reply(format, Err(e))
        }
    }
}

/// Authenticate stage accepting requests whose `X-Auth-Token` header equals `secret`.
pub fn token_authenticator(secret: impl Into<String>) -> impl Fn(AuthContext) -> Result<AuthContext, AppError> + Send + Sync + 'static {
    let secret: String = secret.into();
    move |mut ctx: AuthContext| {
        let token = ctx
            .headers
            .get(AUTH_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim);
        match token {
            Some(t) if t == secret => {
                ctx.principal = Some("token".into());
                Ok(ctx)
            }
            Some(_) => Err(AppError::Unauthorized("invalid token".into())),
            None => Err(AppError::Unauthorized("missing token".into())),
        }
    }
}
