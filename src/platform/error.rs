use reqwest::StatusCode;
use snafu::{Location, Snafu};

pub type Result<T, E = PlatformError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PlatformError {
    /// The platform does not know this user or resource.
    NotFound {
        name: String,
        #[snafu(implicit)]
        location: Location,
    },

    /// The platform is throttling us. Distinct from [PlatformError::NotFound]
    /// and decided by status class, never by message text.
    RateLimited {
        #[snafu(implicit)]
        location: Location,
    },

    /// The platform answered with a server error.
    Upstream {
        status: u16,
        #[snafu(implicit)]
        location: Location,
    },

    /// Transport-level failure, including the per-call timeout.
    Transport {
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// The response body was not the documented shape.
    Decode {
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// The configured base url cannot form the endpoint path.
    Endpoint {
        source: url::ParseError,
        #[snafu(implicit)]
        location: Location,
    },
}

impl PlatformError {
    /// Worth retrying on a later cycle, as opposed to a definitive answer.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PlatformError::Upstream { .. }
                | PlatformError::Transport { .. }
                | PlatformError::RateLimited { .. }
        )
    }
}

/// Map a non-success status to the error taxonomy: 403/429 are rate limits,
/// any other 4xx is not-found, 5xx is an upstream failure.
pub fn classify_status(status: StatusCode, name: &str) -> Option<PlatformError> {
    if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
        return Some(RateLimitedSnafu.build());
    }

    if status.is_client_error() {
        return Some(NotFoundSnafu { name }.build());
    }

    if status.is_server_error() {
        return Some(
            UpstreamSnafu {
                status: status.as_u16(),
            }
            .build(),
        );
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_statuses_are_not_conflated_with_not_found() {
        for status in [StatusCode::FORBIDDEN, StatusCode::TOO_MANY_REQUESTS] {
            let err = classify_status(status, "alice").unwrap();
            assert!(matches!(err, PlatformError::RateLimited { .. }), "{status}");
        }

        let err = classify_status(StatusCode::NOT_FOUND, "alice").unwrap();
        assert!(matches!(err, PlatformError::NotFound { .. }));

        let err = classify_status(StatusCode::BAD_REQUEST, "alice").unwrap();
        assert!(matches!(err, PlatformError::NotFound { .. }));
    }

    #[test]
    fn server_errors_are_transient() {
        let err = classify_status(StatusCode::BAD_GATEWAY, "alice").unwrap();
        assert!(matches!(err, PlatformError::Upstream { status: 502, .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn success_is_not_an_error() {
        assert!(classify_status(StatusCode::OK, "alice").is_none());
    }
}
