/// Status code type shared by every RBS subsystem.
#[allow(non_camel_case_types)]
pub type status_code_t = u16;

/// Common status codes (0-999).
pub mod StatusCode {
    use super::status_code_t;

    pub const OK: status_code_t = 0;
    pub const NOT_IMPLEMENTED: status_code_t = 1;
    pub const INVALID_ARG: status_code_t = 2;
    pub const INVALID_CONFIG: status_code_t = 3;
    pub const IO_ERROR: status_code_t = 4;
    pub const INTERRUPTED: status_code_t = 5;
    pub const DATA_CORRUPTION: status_code_t = 6;
    pub const UNKNOWN: status_code_t = 999;
}

/// Chunk file pool status codes (4xxx).
pub mod PoolCode {
    use super::status_code_t;

    /// Persisted pool meta failed its checksum or is missing required fields.
    pub const CORRUPT_META: status_code_t = 4000;
    /// The pool directory holds an entry the scanner refuses to trust.
    pub const INCONSISTENT_POOL: status_code_t = 4001;
    /// Both the dirty and clean queues are drained.
    pub const POOL_EMPTY: status_code_t = 4002;
    /// The acquire target already exists; the rename was refused.
    pub const ALREADY_EXISTS: status_code_t = 4003;
    /// The operation raced a shutdown.
    pub const STOPPED: status_code_t = 4004;
    /// A format worker hit an allocation error; formatting is abandoned.
    pub const FORMAT_FAILED: status_code_t = 4005;
    /// The filesystem does not have room for the configured reserve.
    pub const NO_SPACE: status_code_t = 4006;
}

/// Render a status code as its symbolic name.
pub fn to_string(code: status_code_t) -> String {
    let name = match code {
        StatusCode::OK => "OK",
        StatusCode::NOT_IMPLEMENTED => "NotImplemented",
        StatusCode::INVALID_ARG => "InvalidArg",
        StatusCode::INVALID_CONFIG => "InvalidConfig",
        StatusCode::IO_ERROR => "IoError",
        StatusCode::INTERRUPTED => "Interrupted",
        StatusCode::DATA_CORRUPTION => "DataCorruption",
        StatusCode::UNKNOWN => "Unknown",
        PoolCode::CORRUPT_META => "Pool::CorruptMeta",
        PoolCode::INCONSISTENT_POOL => "Pool::InconsistentPool",
        PoolCode::POOL_EMPTY => "Pool::Empty",
        PoolCode::ALREADY_EXISTS => "Pool::AlreadyExists",
        PoolCode::STOPPED => "Pool::Stopped",
        PoolCode::FORMAT_FAILED => "Pool::FormatFailed",
        PoolCode::NO_SPACE => "Pool::NoSpace",
        _ => return format!("Code{}", code),
    };
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_code_names() {
        assert_eq!(to_string(StatusCode::OK), "OK");
        assert_eq!(to_string(StatusCode::IO_ERROR), "IoError");
        assert_eq!(to_string(PoolCode::CORRUPT_META), "Pool::CorruptMeta");
        assert_eq!(to_string(PoolCode::ALREADY_EXISTS), "Pool::AlreadyExists");
    }

    #[test]
    fn test_unknown_code_falls_back_to_number() {
        assert_eq!(to_string(1234), "Code1234");
    }
}
