//! Placeholder login. There is exactly one account and the token is a
//! fixed string.

pub const DEMO_EMAIL: &str = "test@example.com";
pub const DEMO_PASSWORD: &str = "password123";
pub const DEMO_TOKEN: &str = "fake-jwt-token";

/// Token for a matching credential pair.
pub fn authenticate(email: Option<&str>, password: Option<&str>) -> Option<&'static str> {
    match (email, password) {
        (Some(DEMO_EMAIL), Some(DEMO_PASSWORD)) => Some(DEMO_TOKEN),
        _ => None,
    }
}
