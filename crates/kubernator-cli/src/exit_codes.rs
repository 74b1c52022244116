//! Exit codes for the provisioner, distinguishing failure classes so a script
//! driving this tool can branch without string-matching (`SPEC_FULL.md` §10.2).

/// Success - the pass completed with no fatal error.
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure (IO, JSON/YAML parse, regex).
pub const ERROR: i32 = 1;

/// Schema/identity validation failed: OpenAPI validation, missing identity
/// fields, identity drift after a transform, or a duplicate resource.
pub const VALIDATION_ERROR: i32 = 2;

/// A plugin hook or directory walk step failed.
pub const WALK_ERROR: i32 = 3;

/// A reconciliation call against the cluster failed (API error, immutable
/// field rejection outside the known recreate table, delete not observed).
pub const RECONCILE_ERROR: i32 = 4;

/// Field-validation warnings accumulated and `warn_fatal` escalated them.
pub const WARN_FATAL: i32 = 5;

/// Invalid CLI arguments or configuration (sysexits.h `EX_USAGE`).
pub const USAGE_ERROR: i32 = 64;
