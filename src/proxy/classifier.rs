//! Maps transport outcomes and status codes into the success/failure verdict the
//! circuit breaker consumes.

use axum::http::StatusCode;

/// Failure label carried through to log records and the final 502 body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLabel {
    Timeout,
    ConnectionError,
    HttpError,
    Unknown,
}

impl std::fmt::Display for ErrorLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorLabel::Timeout => "timeout",
            ErrorLabel::ConnectionError => "connection_error",
            ErrorLabel::HttpError => "http_error",
            ErrorLabel::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Verdict of one provider attempt.
#[derive(Debug, Clone)]
pub enum Outcome {
    Success { status: StatusCode },
    Failure { label: ErrorLabel, message: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

/// Classifies the result of dispatching one outbound `reqwest` call, given whether
/// it was observed to exceed its attempt deadline.
///
/// 4xx and below are successes — they are client errors to be passed through
/// verbatim, not masked by a failover.
pub fn classify(result: Result<StatusCode, reqwest::Error>, timed_out: bool) -> Outcome {
    if timed_out {
        return Outcome::Failure {
            label: ErrorLabel::Timeout,
            message: "attempt deadline exceeded".to_string(),
        };
    }

    match result {
        Ok(status) if status.as_u16() < 500 => Outcome::Success { status },
        Ok(status) => Outcome::Failure {
            label: ErrorLabel::HttpError,
            message: format!("upstream returned {status}"),
        },
        Err(err) if err.is_timeout() => Outcome::Failure {
            label: ErrorLabel::Timeout,
            message: err.to_string(),
        },
        Err(err) if err.is_connect() => Outcome::Failure {
            label: ErrorLabel::ConnectionError,
            message: err.to_string(),
        },
        Err(err) => Outcome::Failure {
            label: ErrorLabel::Unknown,
            message: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_below_500_is_success() {
        let outcome = classify(Ok(StatusCode::NOT_FOUND), false);
        assert!(outcome.is_success());
    }

    #[test]
    fn status_500_and_above_is_http_error_failure() {
        let outcome = classify(Ok(StatusCode::SERVICE_UNAVAILABLE), false);
        match outcome {
            Outcome::Failure { label, .. } => assert_eq!(label, ErrorLabel::HttpError),
            _ => panic!("expected failure"),
        }
    }

    #[test]
    fn deadline_exceeded_is_timeout_regardless_of_result() {
        let outcome = classify(Ok(StatusCode::OK), true);
        match outcome {
            Outcome::Failure { label, .. } => assert_eq!(label, ErrorLabel::Timeout),
            _ => panic!("expected failure"),
        }
    }
}
