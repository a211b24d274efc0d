//! Central error types for seflow.
//!
//! Uses `thiserror` for error definitions with automatic `Display` and
//! `From` implementations. Lookup misses, permission-map problems, criterion
//! validation failures and checker configuration errors all share one enum so
//! callers can propagate with `?` across module boundaries.
//!
//! Two variants are not failures in the usual sense: [`PolicyError::RuleNotConditional`]
//! and [`PolicyError::InvalidRuleUse`] are discriminators returned by rule
//! accessors. Queries match on them and skip the rule.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum PolicyError {
    // =========================================================================
    // Symbol lookup misses
    // =========================================================================
    /// Name does not resolve to a type (or, for `lookup_type_or_attr`, an attribute).
    #[error("{0} is not a valid type")]
    InvalidType(String),

    /// Name does not resolve to a role.
    #[error("{0} is not a valid role")]
    InvalidRole(String),

    /// Name does not resolve to a user.
    #[error("{0} is not a valid user")]
    InvalidUser(String),

    /// Name does not resolve to an object class.
    #[error("{0} is not a valid class")]
    InvalidClass(String),

    /// Name does not resolve to a common permission set.
    #[error("{0} is not a valid common")]
    InvalidCommon(String),

    /// Name does not resolve to a boolean.
    #[error("{0} is not a valid Boolean")]
    InvalidBoolean(String),

    /// Name does not resolve to a category.
    #[error("{0} is not a valid category")]
    InvalidCategory(String),

    /// Name does not resolve to a sensitivity.
    #[error("{0} is not a valid sensitivity")]
    InvalidSensitivity(String),

    /// Level string is malformed or uses categories not associated with the sensitivity.
    #[error("{0} is not a valid level")]
    InvalidLevel(String),

    /// Range string is malformed or its high level does not dominate its low level.
    #[error("{0} is not a valid range")]
    InvalidRange(String),

    /// Name does not resolve to an initial SID.
    #[error("{0} is not a valid initial sid")]
    InvalidInitialSid(String),

    /// MLS level/range requested from a policy without MLS enabled.
    #[error("MLS is disabled")]
    MlsDisabled,

    /// Name is not a declared policy capability.
    #[error("{0} is not a valid policy capability")]
    InvalidPolicyCapability(String),

    // =========================================================================
    // Permissions and permission maps
    // =========================================================================
    /// Permission is not valid for the selected class(es).
    #[error("Perms {perms} are invalid for {classes}")]
    InvalidPermission { perms: String, classes: String },

    /// Class is not present in the permission map.
    #[error("{0} is not mapped")]
    UnmappedClass(String),

    /// Permission is not present in the permission map for its class.
    #[error("{class}:{perm} is not mapped")]
    UnmappedPermission { class: String, perm: String },

    /// Weight was requested for a rule that is not an `allow` rule.
    #[error("{0} rules cannot be used for calculating a weight")]
    RuleType(String),

    /// Malformed permission map file.
    #[error("{path}:{line}: {message}")]
    MapParse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    // =========================================================================
    // Rule accessor discriminators
    // =========================================================================
    /// Requested the conditional expression of an unconditional rule.
    #[error("rule is not conditional")]
    RuleNotConditional,

    /// Requested a payload attribute the rule kind does not carry.
    #[error("{ruletype} rules do not have {attribute}")]
    InvalidRuleUse {
        ruletype: String,
        attribute: &'static str,
    },

    /// Class does not inherit a common permission set.
    #[error("{0} does not inherit a common")]
    NoCommon(String),

    // =========================================================================
    // Criterion validation
    // =========================================================================
    /// Out-of-range value (weights, path lengths, port ranges, ...).
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Criterion regular expression failed to compile.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    // =========================================================================
    // I/O and configuration
    // =========================================================================
    /// IO operation failed with path context.
    #[error("IO error at {path}: {error}")]
    Io {
        error: std::io::Error,
        path: PathBuf,
    },

    /// Analysis configuration could not be parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unknown option in a check configuration.
    #[error("{check}: Invalid option: {option}")]
    InvalidCheckOption { check: String, option: String },

    /// Option value in a check configuration failed validation.
    #[error("{check}: Invalid {option} setting: {message}")]
    InvalidCheckValue {
        check: String,
        option: String,
        message: String,
    },

    /// Unknown `check_type` in a check configuration.
    #[error("{check}: Unknown checker module: {check_type}")]
    InvalidCheckerModule { check: String, check_type: String },
}

/// Convenience type alias for Results using PolicyError.
pub type Result<T> = std::result::Result<T, PolicyError>;

impl PolicyError {
    /// Create an IO error with path context.
    ///
    /// ```ignore
    /// let text = std::fs::read_to_string(path)
    ///     .map_err(|e| PolicyError::io_with_path(e, path))?;
    /// ```
    #[inline]
    pub fn io_with_path(error: std::io::Error, path: impl AsRef<Path>) -> Self {
        PolicyError::Io {
            error,
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Create a permission-map parse error at a file location.
    #[inline]
    pub fn map_parse(path: impl AsRef<Path>, line: usize, message: impl Into<String>) -> Self {
        PolicyError::MapParse {
            path: path.as_ref().to_path_buf(),
            line,
            message: message.into(),
        }
    }

    /// True for the rule accessor discriminators that queries skip over.
    pub fn is_rule_discriminator(&self) -> bool {
        matches!(
            self,
            PolicyError::RuleNotConditional | PolicyError::InvalidRuleUse { .. }
        )
    }
}
