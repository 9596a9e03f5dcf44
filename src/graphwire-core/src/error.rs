//! Error taxonomy and server error classification.
//!
//! Server failures arrive as an HTTP status plus, usually, a dotted
//! classname-style code string such as
//! `org.neo4j.server.rest.repr.BadInputException`. Classification keys on
//! the trailing segment of that string and falls back to the status code
//! family when no structured payload is present, so unknown server
//! vocabularies still produce a usable error value.

use serde_json::Value as Json;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// 4xx response without a more specific classification.
    #[error("client error ({status}): {message}")]
    Client {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// Request body or arguments rejected by the server.
    #[error("bad request ({status}): {message}")]
    BadRequest {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// The addressed resource does not exist.
    #[error("not found ({status}): {message}")]
    NotFound {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// Statement rejected for syntactic or semantic reasons.
    #[error("query syntax error: {message}")]
    QuerySyntax {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// 5xx response, server-side fault.
    #[error("server error ({status}): {message}")]
    Server {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// Operation attempted on a committed (or rolled back) transaction.
    #[error("transaction is closed")]
    TransactionClosed,

    /// The server no longer knows the transaction URL.
    #[error("transaction has expired")]
    TransactionExpired,

    /// A transaction was begun while the session already has one open.
    /// A session binds to one transactional resource at a time.
    #[error("session already has an open transaction")]
    SessionBusy,

    /// Response shape violates the expected schema.
    #[error("protocol error: {message}")]
    Protocol { status: Option<u16>, message: String },

    /// Transport-level timeout; never retried by this layer.
    #[error("request timed out: {message}")]
    TransportTimeout { message: String },

    /// Non-timeout transport fault, e.g. connection closed mid-request.
    #[error("transport failure: {message}")]
    Transport { message: String },

    /// Recognized as an error but the code is not in the registry.
    /// Carries the raw code and status for forward compatibility.
    #[error("unclassified server error ({status}): {code}")]
    Unclassified {
        status: u16,
        code: String,
        message: String,
    },

    /// Username or password empty where the protocol requires them.
    #[error("username and password must be non-empty")]
    InvalidCredentials,
}

impl GraphError {
    /// Original HTTP status, when the error came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            GraphError::Client { status, .. }
            | GraphError::BadRequest { status, .. }
            | GraphError::NotFound { status, .. }
            | GraphError::QuerySyntax { status, .. }
            | GraphError::Server { status, .. }
            | GraphError::Unclassified { status, .. } => Some(*status),
            GraphError::Protocol { status, .. } => *status,
            _ => None,
        }
    }

    /// Original dotted code string, when the server sent one.
    pub fn code(&self) -> Option<&str> {
        match self {
            GraphError::Client { code, .. }
            | GraphError::BadRequest { code, .. }
            | GraphError::NotFound { code, .. }
            | GraphError::QuerySyntax { code, .. }
            | GraphError::Server { code, .. } => code.as_deref(),
            GraphError::Unclassified { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Whether the server signalled that the addressed resource is gone.
    /// A transaction session treats this as expiry of its transaction URL.
    pub fn is_not_found(&self) -> bool {
        matches!(self, GraphError::NotFound { .. }) || self.status() == Some(404)
    }
}

/// Classify a server failure from its status code and optional error code.
///
/// With no code the status family decides; with a code the trailing segment
/// of the dotted string is matched against a closed registry, anything
/// unrecognized becoming [`GraphError::Unclassified`] with the raw fields
/// preserved.
pub fn classify(status: u16, code: Option<&str>, message: &str) -> GraphError {
    let Some(code) = code else {
        return classify_status(status, message);
    };
    let simple = code.rsplit('.').next().unwrap_or(code);
    let code = Some(code.to_string());
    let message = message.to_string();
    if simple.ends_with("NotFoundException") || simple == "EntityNotFound" {
        GraphError::NotFound {
            status,
            code,
            message,
        }
    } else if simple == "BadInputException" || simple == "InvalidArgumentsException" {
        // Both names appear across server versions, interchangeably.
        GraphError::BadRequest {
            status,
            code,
            message,
        }
    } else if simple.ends_with("SyntaxException") || simple == "SyntaxError" {
        GraphError::QuerySyntax {
            status,
            code,
            message,
        }
    } else {
        GraphError::Unclassified {
            status,
            code: code.unwrap_or_default(),
            message,
        }
    }
}

fn classify_status(status: u16, message: &str) -> GraphError {
    let message = message.to_string();
    match status {
        400..=499 => GraphError::Client {
            status,
            code: None,
            message,
        },
        500..=599 => GraphError::Server {
            status,
            code: None,
            message,
        },
        _ => GraphError::Protocol {
            status: Some(status),
            message,
        },
    }
}

/// Classify a raw failure body from a non-expected status.
///
/// Understands the modern `{"errors": [{"code", "message"}]}` shape and the
/// legacy single-error shape (`fullname`/`exception` plus `message`); an
/// unparsable body degrades to bare status classification.
pub fn classify_body(status: u16, body: &[u8]) -> GraphError {
    let raw = || String::from_utf8_lossy(body).trim().to_string();
    let Ok(json) = serde_json::from_slice::<Json>(body) else {
        return classify(status, None, &raw());
    };
    if let Some(first) = json
        .get("errors")
        .and_then(Json::as_array)
        .and_then(|errors| errors.first())
    {
        let code = first.get("code").and_then(Json::as_str);
        let message = first.get("message").and_then(Json::as_str).unwrap_or("");
        return classify(status, code, message);
    }
    let code = json
        .get("fullname")
        .and_then(Json::as_str)
        .or_else(|| json.get("exception").and_then(Json::as_str));
    if code.is_some() {
        let message = match json.get("message") {
            Some(Json::String(text)) => text.clone(),
            Some(Json::Array(lines)) => lines
                .iter()
                .filter_map(Json::as_str)
                .collect::<Vec<_>>()
                .join("\n"),
            _ => String::new(),
        };
        return classify(status, code, &message);
    }
    classify(status, None, &raw())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_only_classification() {
        assert!(matches!(
            classify(404, None, "gone"),
            GraphError::Client { status: 404, .. }
        ));
        assert!(matches!(
            classify(500, None, "boom"),
            GraphError::Server { status: 500, .. }
        ));
        assert!(matches!(
            classify(302, None, "moved"),
            GraphError::Protocol {
                status: Some(302),
                ..
            }
        ));
    }

    #[test]
    fn test_not_found_by_trailing_segment() {
        let err = classify(
            404,
            Some("org.neo4j.server.rest.web.NodeNotFoundException"),
            "no such node",
        );
        assert!(matches!(err, GraphError::NotFound { .. }));
        assert_eq!(err.status(), Some(404));
        assert_eq!(
            err.code(),
            Some("org.neo4j.server.rest.web.NodeNotFoundException")
        );
    }

    #[test]
    fn test_bad_input_and_invalid_arguments_are_one_kind() {
        let a = classify(
            400,
            Some("org.neo4j.server.rest.repr.BadInputException"),
            "bad",
        );
        let b = classify(
            400,
            Some("org.neo4j.server.rest.repr.InvalidArgumentsException"),
            "bad",
        );
        assert!(matches!(a, GraphError::BadRequest { .. }));
        assert!(matches!(b, GraphError::BadRequest { .. }));
    }

    #[test]
    fn test_syntax_error_both_vocabularies() {
        let legacy = classify(400, Some("org.neo4j.cypher.SyntaxException"), "bad cypher");
        let modern = classify(
            200,
            Some("Neo.ClientError.Statement.SyntaxError"),
            "Invalid input 'X'",
        );
        assert!(matches!(legacy, GraphError::QuerySyntax { .. }));
        assert!(matches!(modern, GraphError::QuerySyntax { .. }));
        assert_eq!(modern.status(), Some(200));
    }

    #[test]
    fn test_unknown_code_preserves_raw_fields() {
        let err = classify(
            409,
            Some("org.example.FancyNewException"),
            "something novel",
        );
        match err {
            GraphError::Unclassified {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 409);
                assert_eq!(code, "org.example.FancyNewException");
                assert_eq!(message, "something novel");
            }
            other => panic!("expected Unclassified, got {other:?}"),
        }
    }

    #[test]
    fn test_classification_is_case_sensitive() {
        let err = classify(404, Some("org.example.nodenotfoundexception"), "no");
        assert!(matches!(err, GraphError::Unclassified { .. }));
    }

    #[test]
    fn test_classify_modern_error_body() {
        let body = br#"{"errors": [{"code": "Neo.ClientError.Statement.SyntaxError", "message": "Invalid input"}]}"#;
        assert!(matches!(
            classify_body(200, body),
            GraphError::QuerySyntax { .. }
        ));
    }

    #[test]
    fn test_classify_legacy_error_body() {
        let body = br#"{"exception": "BadInputException", "fullname": "org.neo4j.server.rest.repr.BadInputException", "message": ["wrong"]}"#;
        let err = classify_body(400, body);
        assert!(matches!(err, GraphError::BadRequest { .. }));
        assert_eq!(
            err.code(),
            Some("org.neo4j.server.rest.repr.BadInputException")
        );
    }

    #[test]
    fn test_unparsable_body_falls_back_to_status() {
        let err = classify_body(502, b"<html>bad gateway</html>");
        assert!(matches!(err, GraphError::Server { status: 502, .. }));
        assert_eq!(err.code(), None);
    }

    #[test]
    fn test_empty_errors_array_falls_back_to_status() {
        let err = classify_body(404, br#"{"errors": []}"#);
        assert!(matches!(err, GraphError::Client { status: 404, .. }));
        assert!(err.is_not_found());
    }
}
