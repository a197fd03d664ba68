use crate::status::Status;
use crate::status_code::status_code_t;

/// The standard result type used throughout RBS, with `Status` as the error.
pub type Result<T> = std::result::Result<T, Status>;

/// Create an error result from a status code.
pub fn make_error<T>(code: status_code_t) -> Result<T> {
    Err(Status::new(code))
}

/// Create an error result from a status code and message.
pub fn make_error_msg<T>(code: status_code_t, msg: impl Into<String>) -> Result<T> {
    Err(Status::with_message(code, msg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status_code::{PoolCode, StatusCode};

    #[test]
    fn test_make_error() {
        let r: Result<i32> = make_error(PoolCode::POOL_EMPTY);
        assert!(r.is_err());
        assert_eq!(r.unwrap_err().code(), PoolCode::POOL_EMPTY);
    }

    #[test]
    fn test_make_error_msg() {
        let r: Result<i32> = make_error_msg(StatusCode::INVALID_CONFIG, "bad option");
        let err = r.unwrap_err();
        assert_eq!(err.code(), StatusCode::INVALID_CONFIG);
        assert_eq!(err.message(), Some("bad option"));
    }
}
