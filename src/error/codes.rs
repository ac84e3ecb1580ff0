/// Error code registry for effio
///
/// Error codes are organized by category:
/// - 1000-1999: Computation failures
/// - 2000-2999: Cancellation
/// - 3000-3999: Timeouts
/// - 4000-4999: Terminal-state violations (closed channels, sinks, sources)
/// - 5000-5999: Resource acquisition and release
/// - 6000-6999: Wrapped host errors
/// - 7000-7999: Configuration
/// - 9000-9999: Aggregates and other errors
#[allow(dead_code)]
pub struct ErrorCode;

impl ErrorCode {
    // Computation failures (1000-1999)
    pub const FAILURE_GENERIC: u16 = 1000;
    pub const FAILURE_USER: u16 = 1001;
    pub const FAILURE_CHECK: u16 = 1002;
    pub const FAILURE_INVALID_ARGUMENT: u16 = 1003;
    pub const FAILURE_SCHEDULE_EXHAUSTED: u16 = 1004;

    // Cancellation (2000-2999)
    pub const CANCELLED_GENERIC: u16 = 2000;
    pub const CANCELLED_SCOPE: u16 = 2001;
    pub const CANCELLED_FIBER: u16 = 2002;
    pub const CANCELLED_PRODUCER: u16 = 2003;

    // Timeouts (3000-3999)
    pub const TIMEOUT_GENERIC: u16 = 3000;
    pub const TIMEOUT_FIBER_AWAIT: u16 = 3001;

    // Terminal-state violations (4000-4999)
    pub const CLOSED_GENERIC: u16 = 4000;
    pub const CLOSED_CHANNEL: u16 = 4001;
    pub const CLOSED_SINK: u16 = 4002;
    pub const CLOSED_SOURCE: u16 = 4003;
    pub const CLOSED_CHANNEL_FULL: u16 = 4004;
    pub const CLOSED_FIBER_LOST: u16 = 4005;

    // Resources (5000-5999)
    pub const RESOURCE_GENERIC: u16 = 5000;
    pub const RESOURCE_RELEASE_FAILED: u16 = 5001;
    pub const RESOURCE_ACQUIRE_FAILED: u16 = 5002;

    // Wrapped host errors (6000-6999)
    pub const EXCEPTION_GENERIC: u16 = 6000;
    pub const EXCEPTION_IO: u16 = 6001;
    pub const EXCEPTION_ANYHOW: u16 = 6002;

    // Configuration (7000-7999)
    pub const CONFIG_GENERIC: u16 = 7000;
    pub const CONFIG_INVALID_YAML: u16 = 7001;
    pub const CONFIG_INVALID_TOML: u16 = 7002;
    pub const CONFIG_UNSUPPORTED_FORMAT: u16 = 7003;
    pub const CONFIG_RUNTIME_BUILD: u16 = 7004;

    // Aggregates and other errors (9000-9999)
    pub const AGGREGATE: u16 = 9000;
    pub const OTHER_INTERNAL_ERROR: u16 = 9001;
}

/// Get a human-readable description for an error code
pub fn describe_error_code(code: u16) -> &'static str {
    match code {
        // Computation failures
        1000 => "Generic computation failure",
        1001 => "User-raised failure",
        1002 => "Value rejected by check predicate",
        1003 => "Invalid argument",
        1004 => "Schedule exhausted",

        // Cancellation
        2000 => "Computation cancelled",
        2001 => "Cancellation scope was cancelled",
        2002 => "Fiber was cancelled",
        2003 => "Source producer was cancelled",

        // Timeouts
        3000 => "Operation timed out",
        3001 => "Timed out awaiting fiber",

        // Terminal-state violations
        4000 => "Target is closed",
        4001 => "Channel is closed",
        4002 => "Sink is closed",
        4003 => "Source is closed",
        4004 => "Channel is full",
        4005 => "Fiber dropped before producing an outcome",

        // Resources
        5000 => "Generic resource error",
        5001 => "Resource release failed",
        5002 => "Resource acquisition failed",

        // Wrapped host errors
        6000 => "Host error",
        6001 => "I/O error",
        6002 => "Unclassified host error",

        // Configuration
        7000 => "Generic configuration error",
        7001 => "Invalid YAML syntax in configuration",
        7002 => "Invalid TOML syntax in configuration",
        7003 => "Unsupported configuration format",
        7004 => "Failed to build async runtime",

        // Aggregates and other errors
        9000 => "Multiple errors occurred",
        9001 => "Internal error",

        _ => "Unknown error code",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_ranges() {
        assert!(ErrorCode::FAILURE_GENERIC >= 1000 && ErrorCode::FAILURE_GENERIC < 2000);
        assert!(ErrorCode::CANCELLED_GENERIC >= 2000 && ErrorCode::CANCELLED_GENERIC < 3000);
        assert!(ErrorCode::TIMEOUT_GENERIC >= 3000 && ErrorCode::TIMEOUT_GENERIC < 4000);
        assert!(ErrorCode::CLOSED_GENERIC >= 4000 && ErrorCode::CLOSED_GENERIC < 5000);
        assert!(ErrorCode::RESOURCE_GENERIC >= 5000 && ErrorCode::RESOURCE_GENERIC < 6000);
        assert!(ErrorCode::EXCEPTION_GENERIC >= 6000 && ErrorCode::EXCEPTION_GENERIC < 7000);
        assert!(ErrorCode::CONFIG_GENERIC >= 7000 && ErrorCode::CONFIG_GENERIC < 8000);
        assert!(ErrorCode::AGGREGATE >= 9000 && ErrorCode::AGGREGATE < 10000);
    }

    #[test]
    fn test_error_code_descriptions() {
        assert_eq!(describe_error_code(4003), "Source is closed");
        assert_eq!(describe_error_code(3001), "Timed out awaiting fiber");
        assert_eq!(describe_error_code(65535), "Unknown error code");
    }
}
