//! Status-code classes.
//!
//! Codes themselves are [`http::StatusCode`]. This module answers the
//! questions the response pipeline asks about them: may this status carry a
//! body, is it a redirect, is it a code we know a reason phrase for.

use http::StatusCode;

/// Statuses whose responses never carry a body.
pub fn is_empty(code: StatusCode) -> bool {
    matches!(code.as_u16(), 204 | 205 | 304)
}

/// Statuses that redirect the client.
pub fn is_redirect(code: StatusCode) -> bool {
    matches!(code.as_u16(), 300 | 301 | 302 | 303 | 305 | 307 | 308)
}

/// `true` if `code` is a registered status with a reason phrase.
pub fn is_known(code: u16) -> bool {
    StatusCode::from_u16(code)
        .ok()
        .and_then(|s| s.canonical_reason())
        .is_some()
}

/// The standard reason phrase, or `""` for unregistered codes.
pub fn reason(code: StatusCode) -> &'static str {
    code.canonical_reason().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_class() {
        for code in [204, 205, 304] {
            assert!(is_empty(StatusCode::from_u16(code).unwrap()));
        }
        assert!(!is_empty(StatusCode::OK));
        assert!(!is_empty(StatusCode::NOT_FOUND));
    }

    #[test]
    fn known_codes() {
        assert!(is_known(404));
        assert!(is_known(418));
        assert!(!is_known(299));
        assert!(!is_known(1000));
        assert!(!is_known(0));
    }

    #[test]
    fn reasons() {
        assert_eq!(reason(StatusCode::NOT_FOUND), "Not Found");
        assert_eq!(reason(StatusCode::from_u16(299).unwrap()), "");
    }
}
