//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Validation error - invalid plan, release id or dependency graph
pub const VALIDATION_ERROR: i32 = 2;

/// Template error - values or manifest rendering failed
pub const TEMPLATE_ERROR: i32 = 3;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Deploy error - cluster unreachable, apply or rollout failed
pub const DEPLOY_ERROR: i32 = 6;
