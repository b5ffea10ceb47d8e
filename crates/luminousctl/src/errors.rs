//! Exit codes for ask-nix

use luminous_common::ResponseStatus;

/// Exit code for success
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code when input was rejected or not understood
pub const EXIT_VALIDATION: i32 = 1;

/// Exit code when the command ran and failed (or timed out)
pub const EXIT_EXECUTION: i32 = 2;

/// Exit code for internal errors (storage, config, bugs)
pub const EXIT_INTERNAL: i32 = 3;

pub fn exit_code_for(status: ResponseStatus) -> i32 {
    match status {
        ResponseStatus::Ok => EXIT_SUCCESS,
        ResponseStatus::ValidationFailed | ResponseStatus::NotUnderstood => EXIT_VALIDATION,
        ResponseStatus::ExecutionFailed | ResponseStatus::TimedOut => EXIT_EXECUTION,
    }
}

/// Exit code for an error that escaped to main
pub fn exit_code_for_error(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<luminous_common::LuminousError>()
        .map(|e| e.exit_code())
        .unwrap_or(EXIT_INTERNAL)
}

/// Failure class recorded in the invocation log
pub fn error_code_for_error(err: &anyhow::Error) -> &'static str {
    err.downcast_ref::<luminous_common::LuminousError>()
        .map(|e| e.code())
        .unwrap_or("internal")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_agree_with_library() {
        for status in [
            ResponseStatus::Ok,
            ResponseStatus::ValidationFailed,
            ResponseStatus::NotUnderstood,
            ResponseStatus::ExecutionFailed,
            ResponseStatus::TimedOut,
        ] {
            assert_eq!(exit_code_for(status), status.exit_code());
        }
    }

    #[test]
    fn test_unknown_errors_are_internal() {
        let err = anyhow::anyhow!("boom");
        assert_eq!(exit_code_for_error(&err), EXIT_INTERNAL);
        assert_eq!(error_code_for_error(&err), "internal");
    }

    #[test]
    fn test_library_errors_keep_their_class() {
        let err: anyhow::Error =
            luminous_common::LuminousError::Config("bad value".into()).into();
        assert_eq!(exit_code_for_error(&err), EXIT_INTERNAL);
        assert_eq!(error_code_for_error(&err), "config");
    }
}
