//! # Primitives
//!
//! Fixed constants for the Potty Trainer core: table base names, namespace
//! rules, and input limits.
//!
//! These are compiled into the binary and are immutable at runtime. Anything
//! an operator should be able to change lives in the app's configuration.

// =============================================================================
// TABLE BASE NAMES
// =============================================================================
//
// Each base name is prefixed with the configured namespace to produce the
// physical redb table name (e.g. "pottytrainer-users").

/// Base name of the users table.
pub const USERS_TABLE: &str = "users";

/// Base name of the API tokens table.
pub const TOKENS_TABLE: &str = "tokens";

/// Base name of the eats table.
pub const EATS_TABLE: &str = "eats";

/// Base name of the poops table.
pub const POOPS_TABLE: &str = "poops";

/// Base name of the foods table.
pub const FOODS_TABLE: &str = "foods";

/// Base name of the food names (aliases) table.
pub const FOOD_NAMES_TABLE: &str = "food_names";

/// Base name of the ingredient edges table.
pub const INGREDIENTS_TABLE: &str = "ingredients";

/// Base name of the external sign-in identities table.
pub const EXTERNAL_IDENTITIES_TABLE: &str = "external_identities";

// =============================================================================
// NAMESPACING
// =============================================================================

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "pottytrainer";

/// Characters a namespace may already end in. Any other ending gets
/// [`DEFAULT_SEPARATOR`] appended.
pub const NAMESPACE_SEPARATORS: [char; 2] = ['-', '_'];

/// Separator appended to a namespace that does not end in one.
pub const DEFAULT_SEPARATOR: char = '-';

/// Separator between a logical table's physical name and its index suffix.
///
/// `pottytrainer-tokens` + `token` -> `pottytrainer-tokens.by_token`
pub const INDEX_TABLE_INFIX: &str = ".by_";

/// Separator between the scope (user or provider) and the scoped value in a
/// composite secondary-index value.
pub const INDEX_SCOPE_SEPARATOR: char = '#';

// =============================================================================
// IDENTITY
// =============================================================================

/// Number of random bytes in a freshly issued API token.
pub const TOKEN_BYTES: usize = 32;

/// Default lifetime of an issued API token, in days.
pub const DEFAULT_TOKEN_TTL_DAYS: u32 = 90;

/// Default request timeout applied by callers that do not choose one.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length, in bytes, of a food name or logged food text.
pub const MAX_NAME_LENGTH: usize = 256;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_separator_is_accepted_separator() {
        assert!(NAMESPACE_SEPARATORS.contains(&DEFAULT_SEPARATOR));
    }

    #[test]
    fn token_is_two_uuids_wide() {
        // Tokens are built from two v4 UUIDs.
        assert_eq!(TOKEN_BYTES, 2 * 16);
    }
}
