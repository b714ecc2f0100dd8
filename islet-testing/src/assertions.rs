// Test assertions for HTTP responses

use crate::TestResponse;

/// Response header value for assets served under the current fingerprint.
pub const IMMUTABLE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Assert that a response has a specific status code
#[track_caller]
pub fn assert_status(response: &TestResponse, expected: u16) {
    let actual = response.status();
    assert_eq!(
        actual, expected,
        "Expected status {}, got {}",
        expected, actual
    );
}

/// Assert that a response has a specific header
#[track_caller]
pub fn assert_header(response: &TestResponse, key: &str, expected: &str) {
    let actual = response.header(key);
    assert_eq!(
        actual,
        Some(expected),
        "Expected header '{}' to be '{}', got {:?}",
        key,
        expected,
        actual
    );
}

/// Assert that a response body contains a string
#[track_caller]
pub fn assert_body_contains(response: &TestResponse, expected: &str) {
    let body = response.body_string();
    assert!(
        body.contains(expected),
        "Expected body to contain '{}', but it didn't. Body: {}",
        expected,
        body
    );
}

/// Assert that a response body contains JSON matching expected value
#[track_caller]
pub fn assert_json<T>(response: &TestResponse, expected: &T)
where
    T: serde::de::DeserializeOwned + PartialEq + std::fmt::Debug,
{
    let actual: T = response
        .body_json()
        .unwrap_or_else(|e| panic!("Failed to deserialize response body: {}", e));
    assert_eq!(actual, *expected, "JSON bodies do not match");
}

#[track_caller]
pub fn assert_immutable(response: &TestResponse) {
    assert_header(response, "cache-control", IMMUTABLE_CACHE_CONTROL);
}

/// Assert that the hydration state script holds exactly `expected`.
#[track_caller]
pub fn assert_hydration_state(response: &TestResponse, expected: &serde_json::Value) {
    let state = hydration_state(response)
        .unwrap_or_else(|| panic!("No hydration state in body: {}", response.body_string()));
    assert_eq!(&state, expected, "Hydration state does not match");
}

/// Extract and parse the `__ISLET_STATE__` script of an HTML response.
pub fn hydration_state(response: &TestResponse) -> Option<serde_json::Value> {
    let body = response.body_string();
    let open = format!(r#"<script id="{}" type="application/json">"#, islet_core::islands::HYDRATION_STATE_ID);
    let start = body.find(&open)? + open.len();
    let len = body[start..].find("</script>")?;
    serde_json::from_str(&body[start..start + len]).ok()
}
