/*
[INPUT]:  Venue WebSocket error code catalogue
[OUTPUT]: Error code constants used to infer the failed operation
[POS]:    Data layer - server status codes
[UPDATE]: When the venue adds codes that imply a specific operation
*/

/// Success code carried by replies that include a `code` field
pub const OK: &str = "0";

pub const INVALID_OK_ACCESS_KEY: &str = "60005";
pub const INVALID_SIGN: &str = "60007";
/// The endpoint does not support subscribing to the requested channel
pub const ENDPOINT_NOT_SUPPORT_SUBSCRIBE_CHANNEL: &str = "60008";
pub const LOGIN_FAILED: &str = "60009";
/// Message text embeds the offending request, e.g. `Invalid request: {"op": "subscribe", ...}`
pub const INVALID_REQUEST: &str = "60012";
pub const DOES_NOT_EXIST: &str = "60018";
pub const BULK_LOGIN_PARTIALLY_SUCCEEDED: &str = "60022";

/// Codes that can only be produced by a login attempt
pub fn is_login_failure(code: &str) -> bool {
    matches!(
        code,
        LOGIN_FAILED | BULK_LOGIN_PARTIALLY_SUCCEEDED | INVALID_SIGN | INVALID_OK_ACCESS_KEY
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_failure_codes() {
        assert!(is_login_failure("60009"));
        assert!(is_login_failure("60005"));
        assert!(!is_login_failure(INVALID_REQUEST));
        assert!(!is_login_failure(OK));
    }
}
