use crate::error::AuthError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

/// `Basic base64(username:password)`, marked sensitive
pub fn basic_auth_header(username: &str, password: &str) -> Result<HeaderValue, AuthError> {
    let encoded = BASE64.encode(format!("{}:{}", username, password));
    sensitive(format!("Basic {}", encoded), "basic credentials")
}

/// `Bearer <token>`, marked sensitive
pub fn bearer_auth_header(token: &str) -> Result<HeaderValue, AuthError> {
    sensitive(format!("Bearer {}", token), "bearer token")
}

fn sensitive(value: String, what: &'static str) -> Result<HeaderValue, AuthError> {
    let mut header = HeaderValue::from_str(&value).map_err(|_| AuthError::InvalidHeader(what))?;
    header.set_sensitive(true);
    Ok(header)
}

/// Something an `Authorization` header can be attached to
pub trait Authorize {
    fn set_authorization(&mut self, value: HeaderValue);
}

impl Authorize for HeaderMap {
    fn set_authorization(&mut self, value: HeaderValue) {
        self.insert(AUTHORIZATION, value);
    }
}

impl Authorize for reqwest::Request {
    fn set_authorization(&mut self, value: HeaderValue) {
        self.headers_mut().insert(AUTHORIZATION, value);
    }
}
