/// Access token transport
///
/// The access token travels as an HTTP-only cookie scoped to the whole
/// site. Callers that cannot send cookies may use `Authorization: Bearer`.

use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::http::header;
use actix_web::HttpRequest;

use crate::configuration::CookieSettings;

/// Receives the access token that must be handed back to the client
pub trait TokenSink {
    fn publish(&mut self, access_token: &str);
}

#[derive(Clone, Debug)]
pub struct CookieTransport {
    settings: CookieSettings,
    max_age_seconds: i64,
}

impl CookieTransport {
    pub fn new(settings: CookieSettings, max_age_seconds: i64) -> Self {
        Self {
            settings,
            max_age_seconds,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.settings.name
    }

    pub fn cookie(&self, access_token: &str) -> Cookie<'static> {
        Cookie::build(self.settings.name.clone(), access_token.to_string())
            .path(self.settings.path.clone())
            .http_only(true)
            .secure(self.settings.secure)
            .same_site(SameSite::Lax)
            .max_age(Duration::seconds(self.max_age_seconds))
            .finish()
    }

    /// Expired cookie that makes the client drop its token
    pub fn clear(&self) -> Cookie<'static> {
        Cookie::build(self.settings.name.clone(), String::new())
            .path(self.settings.path.clone())
            .http_only(true)
            .secure(self.settings.secure)
            .same_site(SameSite::Lax)
            .max_age(Duration::ZERO)
            .finish()
    }

    /// Token presented by the client: the cookie first, then a bearer header.
    /// Empty values count as absent.
    pub fn read(&self, req: &HttpRequest) -> Option<String> {
        let from_cookie = req
            .cookie(&self.settings.name)
            .map(|c| c.value().to_string());

        let from_header = || {
            req.headers()
                .get(header::AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .and_then(|h| h.strip_prefix("Bearer "))
                .map(|t| t.trim().to_string())
        };

        from_cookie
            .filter(|t| !t.is_empty())
            .or_else(|| from_header().filter(|t| !t.is_empty()))
    }

    pub fn sink(&self) -> PendingCookie {
        PendingCookie {
            transport: self.clone(),
            cookie: None,
        }
    }
}

/// Per-request sink holding the cookie until the response is built
pub struct PendingCookie {
    transport: CookieTransport,
    cookie: Option<Cookie<'static>>,
}

impl PendingCookie {
    pub fn into_cookie(self) -> Option<Cookie<'static>> {
        self.cookie
    }
}

impl TokenSink for PendingCookie {
    fn publish(&mut self, access_token: &str) {
        self.cookie = Some(self.transport.cookie(access_token));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn transport() -> CookieTransport {
        CookieTransport::new(CookieSettings::default(), 7200)
    }

    #[test]
    fn test_cookie_attributes() {
        let cookie = transport().cookie("abc");

        assert_eq!(cookie.name(), "Authorization");
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(false));
        assert_eq!(cookie.max_age(), Some(Duration::seconds(7200)));
    }

    #[test]
    fn test_secure_flag_follows_settings() {
        let settings = CookieSettings {
            secure: true,
            ..CookieSettings::default()
        };
        let cookie = CookieTransport::new(settings, 60).cookie("abc");

        assert_eq!(cookie.secure(), Some(true));
    }

    #[test]
    fn test_clear_cookie_expires_immediately() {
        let cookie = transport().clear();

        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
    }

    #[test]
    fn test_read_prefers_cookie() {
        let req = TestRequest::default()
            .cookie(Cookie::new("Authorization", "from-cookie"))
            .insert_header((header::AUTHORIZATION, "Bearer from-header"))
            .to_http_request();

        assert_eq!(transport().read(&req), Some("from-cookie".to_string()));
    }

    #[test]
    fn test_read_falls_back_to_bearer_header() {
        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Bearer from-header"))
            .to_http_request();

        assert_eq!(transport().read(&req), Some("from-header".to_string()));
    }

    #[test]
    fn test_read_treats_empty_as_absent() {
        let req = TestRequest::default()
            .cookie(Cookie::new("Authorization", ""))
            .to_http_request();
        assert_eq!(transport().read(&req), None);

        let req = TestRequest::default().to_http_request();
        assert_eq!(transport().read(&req), None);
    }

    #[test]
    fn test_pending_cookie_keeps_last_published_token() {
        let mut sink = transport().sink();
        sink.publish("first");
        sink.publish("second");

        let cookie = sink.into_cookie().expect("cookie expected");
        assert_eq!(cookie.value(), "second");
    }
}
