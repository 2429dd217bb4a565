/// Session introspection
///
/// Reports what the authorization middleware decided for this request.

use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::auth::{Authorized, Outcome};

#[derive(Serialize)]
pub struct SessionResponse {
    pub subject_id: i64,
    pub expires_at: String,
    pub outcome: Outcome,
}

/// GET /api/session
///
/// **Requires** the authorization middleware; the access token itself is
/// delivered in the `Set-Cookie` header, never in the body.
pub async fn current_session(authorized: web::ReqData<Authorized>) -> HttpResponse {
    HttpResponse::Ok().json(SessionResponse {
        subject_id: authorized.subject_id,
        expires_at: authorized.expires_at.to_rfc3339(),
        outcome: authorized.outcome,
    })
}
