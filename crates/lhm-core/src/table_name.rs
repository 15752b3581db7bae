//! Shadow, failed and trigger name derivation.
//!
//! Every name is a pure function of the origin table name and the configured
//! prefixes, so a cleanup run started by a later process finds exactly the
//! artifacts an earlier, interrupted run created.
//!
//! | Artifact      | Default shape       | Example            |
//! |---------------|---------------------|--------------------|
//! | Shadow table  | `lhmn_<origin>`     | `lhmn_orders`      |
//! | Failed rename | `<origin>_failed`   | `orders_failed`    |
//! | Trigger       | `lhmt_<act>_<origin>` | `lhmt_ins_orders` |
//!
//! When a composed name would exceed the identifier limit, the origin part is
//! truncated and an 8-hex-digit SHA-256 digest of the full origin name is
//! inserted, so two long origins sharing a prefix never map to the same name.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::CoreError;

/// Identifier length limit of MySQL.
pub const MAX_IDENTIFIER_LEN: usize = 64;

pub const DEFAULT_SHADOW_PREFIX: &str = "lhmn_";
pub const DEFAULT_FAILED_SUFFIX: &str = "_failed";
pub const DEFAULT_TRIGGER_PREFIX: &str = "lhmt_";

/// Hex digits of the digest appended to overflowing names.
const DIGEST_LEN: usize = 8;

/// Room reserved for `_` + digest when a name has to be shortened.
const DIGEST_RESERVE: usize = DIGEST_LEN + 1;

/// Names derived once per migration run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableName {
    /// The origin table being migrated.
    pub original: String,
    /// The shadow table populated by the background copy.
    pub new: String,
    /// The name an abandoned shadow table is renamed to during cleanup.
    pub failed: String,
}

impl TableName {
    /// Derive names with the default prefixes.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidName` if `original` is not a legal identifier.
    pub fn derive(original: &str) -> Result<Self, CoreError> {
        TableNamer::default().derive(original)
    }
}

/// Row event a migration trigger mirrors into the shadow table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerAction {
    Insert,
    Update,
    Delete,
}

impl TriggerAction {
    pub const ALL: [Self; 3] = [Self::Insert, Self::Update, Self::Delete];

    #[must_use]
    pub const fn abbreviation(self) -> &'static str {
        match self {
            Self::Insert => "ins",
            Self::Update => "upd",
            Self::Delete => "del",
        }
    }
}

/// Derives migration artifact names from an origin table name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNamer {
    shadow_prefix: String,
    failed_suffix: String,
    trigger_prefix: String,
    max_len: usize,
}

impl Default for TableNamer {
    fn default() -> Self {
        Self {
            shadow_prefix: DEFAULT_SHADOW_PREFIX.to_string(),
            failed_suffix: DEFAULT_FAILED_SUFFIX.to_string(),
            trigger_prefix: DEFAULT_TRIGGER_PREFIX.to_string(),
            max_len: MAX_IDENTIFIER_LEN,
        }
    }
}

impl TableNamer {
    /// Build a namer with custom affixes.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidName` if an affix is empty, contains
    /// characters outside `[A-Za-z0-9_$]`, or leaves no room for a shortened
    /// name within `max_len`, or if one prefix is a prefix of the other.
    pub fn new(
        shadow_prefix: impl Into<String>,
        failed_suffix: impl Into<String>,
        trigger_prefix: impl Into<String>,
        max_len: usize,
    ) -> Result<Self, CoreError> {
        let namer = Self {
            shadow_prefix: shadow_prefix.into(),
            failed_suffix: failed_suffix.into(),
            trigger_prefix: trigger_prefix.into(),
            max_len,
        };
        if max_len == 0 || max_len > MAX_IDENTIFIER_LEN {
            return Err(CoreError::invalid_name(
                &max_len.to_string(),
                format!("identifier limit must be between 1 and {MAX_IDENTIFIER_LEN}"),
            ));
        }
        // Longest trigger affix is `<prefix><act>_`.
        let trigger_affix_len = namer.trigger_prefix.len() + 4;
        for (affix, len) in [
            (&namer.shadow_prefix, namer.shadow_prefix.len()),
            (&namer.failed_suffix, namer.failed_suffix.len()),
            (&namer.trigger_prefix, trigger_affix_len),
        ] {
            validate_affix(affix)?;
            if len + DIGEST_RESERVE >= max_len {
                return Err(CoreError::invalid_name(
                    affix,
                    format!("too long to fit names within {max_len} characters"),
                ));
            }
        }
        // Either prefix extending the other would let a shadow table name
        // pass as a migration trigger, or the reverse.
        if namer.shadow_prefix.starts_with(&namer.trigger_prefix)
            || namer.trigger_prefix.starts_with(&namer.shadow_prefix)
        {
            return Err(CoreError::invalid_name(
                &namer.shadow_prefix,
                format!(
                    "shadow table and trigger prefixes must not overlap ('{}' vs '{}')",
                    namer.shadow_prefix, namer.trigger_prefix
                ),
            ));
        }
        Ok(namer)
    }

    /// Derive the shadow and failed names for `original`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidName` if `original` is not a legal identifier.
    pub fn derive(&self, original: &str) -> Result<TableName, CoreError> {
        validate_identifier_within(original, self.max_len)?;
        Ok(TableName {
            original: original.to_string(),
            new: self.fit(&self.shadow_prefix, original, ""),
            failed: self.fit("", original, &self.failed_suffix),
        })
    }

    /// Name of the trigger mirroring `action` from `original` into its shadow.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidName` if `original` is not a legal identifier.
    pub fn trigger_name(&self, action: TriggerAction, original: &str) -> Result<String, CoreError> {
        validate_identifier_within(original, self.max_len)?;
        let prefix = format!("{}{}_", self.trigger_prefix, action.abbreviation());
        Ok(self.fit(&prefix, original, ""))
    }

    /// Whether `name` carries the reserved migration trigger prefix.
    #[must_use]
    pub fn is_migration_trigger(&self, name: &str) -> bool {
        name.starts_with(&self.trigger_prefix)
    }

    /// Prefix of shadow table names.
    #[must_use]
    pub fn shadow_prefix(&self) -> &str {
        &self.shadow_prefix
    }

    /// Suffix of the name a leftover shadow table is renamed to.
    #[must_use]
    pub fn failed_suffix(&self) -> &str {
        &self.failed_suffix
    }

    /// Reserved prefix of migration trigger names.
    #[must_use]
    pub fn trigger_prefix(&self) -> &str {
        &self.trigger_prefix
    }

    /// Identifier length limit applied to every derived name.
    #[must_use]
    pub const fn max_len(&self) -> usize {
        self.max_len
    }

    fn fit(&self, prefix: &str, original: &str, suffix: &str) -> String {
        let plain_len = prefix.len() + original.len() + suffix.len();
        if plain_len <= self.max_len {
            return format!("{prefix}{original}{suffix}");
        }
        let head_len = self
            .max_len
            .saturating_sub(prefix.len() + suffix.len() + DIGEST_RESERVE);
        // Identifiers are validated ASCII, so byte slicing is on a char boundary.
        let head = &original[..head_len.min(original.len())];
        format!("{prefix}{head}_{}{suffix}", short_digest(original))
    }
}

/// Check that `name` is a legal unquoted MySQL identifier.
///
/// Accepts 1 to 64 characters of `[A-Za-z0-9_$]` that are not all digits.
///
/// # Errors
///
/// Returns `CoreError::InvalidName` describing the first violated rule.
pub fn validate_identifier(name: &str) -> Result<(), CoreError> {
    validate_identifier_within(name, MAX_IDENTIFIER_LEN)
}

fn validate_identifier_within(name: &str, max_len: usize) -> Result<(), CoreError> {
    if name.is_empty() {
        return Err(CoreError::invalid_name(name, "identifier is empty"));
    }
    if name.len() > max_len {
        return Err(CoreError::invalid_name(
            name,
            format!("identifier exceeds {max_len} characters"),
        ));
    }
    if let Some(c) = name.chars().find(|c| !is_identifier_char(*c)) {
        return Err(CoreError::invalid_name(
            name,
            format!("character {c:?} is not allowed in an unquoted identifier"),
        ));
    }
    if name.chars().all(|c| c.is_ascii_digit()) {
        return Err(CoreError::invalid_name(name, "identifier cannot be all digits"));
    }
    Ok(())
}

fn validate_affix(affix: &str) -> Result<(), CoreError> {
    if affix.is_empty() {
        return Err(CoreError::invalid_name(affix, "affix is empty"));
    }
    if let Some(c) = affix.chars().find(|c| !is_identifier_char(*c)) {
        return Err(CoreError::invalid_name(
            affix,
            format!("character {c:?} is not allowed in an unquoted identifier"),
        ));
    }
    Ok(())
}

const fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn short_digest(original: &str) -> String {
    let digest = Sha256::digest(original.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(DIGEST_LEN);
    hex
}
