// Exit codes for CI triage
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_GENERIC_FAIL: i32 = 1;
/// At least one correctness case failed.
pub const EXIT_CHECK_FAILED: i32 = 2;
