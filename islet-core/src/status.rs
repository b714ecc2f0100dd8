// HTTP status codes produced by the dispatcher

/// HTTP status codes emitted by Islet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpStatus {
    // 2xx Success
    Ok = 200,

    // 3xx Redirection
    NotModified = 304,
    TemporaryRedirect = 307,

    // 4xx Client Errors
    NotFound = 404,
    MethodNotAllowed = 405,

    // 5xx Server Errors
    InternalServerError = 500,
}

impl HttpStatus {
    /// Get the numeric status code
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Get the reason phrase for the status code
    pub fn reason(&self) -> &'static str {
        match self {
            HttpStatus::Ok => "OK",
            HttpStatus::NotModified => "Not Modified",
            HttpStatus::TemporaryRedirect => "Temporary Redirect",
            HttpStatus::NotFound => "Not Found",
            HttpStatus::MethodNotAllowed => "Method Not Allowed",
            HttpStatus::InternalServerError => "Internal Server Error",
        }
    }

    /// Check if status is client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.code())
    }

    /// Check if status is server error (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.code())
    }

    /// Create status from u16 code
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            200 => Some(HttpStatus::Ok),
            304 => Some(HttpStatus::NotModified),
            307 => Some(HttpStatus::TemporaryRedirect),
            404 => Some(HttpStatus::NotFound),
            405 => Some(HttpStatus::MethodNotAllowed),
            500 => Some(HttpStatus::InternalServerError),
            _ => None,
        }
    }
}

impl std::fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_codes() {
        for status in [
            HttpStatus::Ok,
            HttpStatus::NotModified,
            HttpStatus::TemporaryRedirect,
            HttpStatus::NotFound,
            HttpStatus::MethodNotAllowed,
            HttpStatus::InternalServerError,
        ] {
            assert_eq!(HttpStatus::from_code(status.code()), Some(status));
        }
        for unused in [204, 400, 403, 418] {
            assert_eq!(HttpStatus::from_code(unused), None);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(HttpStatus::TemporaryRedirect.to_string(), "307 Temporary Redirect");
        assert!(HttpStatus::MethodNotAllowed.is_client_error());
        assert!(HttpStatus::InternalServerError.is_server_error());
    }
}
