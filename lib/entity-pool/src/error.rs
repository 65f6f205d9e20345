//! Error types.

use snafu::Snafu;

use crate::loader::TemplateRef;

/// A generic error.
///
/// Used for failures reported by external collaborators, such as the entity loader, where the set of possible failure
/// modes is not enumerable by this crate. Carries context and backtrace information where available.
pub type GenericError = anyhow::Error;

/// Pool configuration errors.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum ConfigError {
    /// Two configured kinds share the same template reference.
    ///
    /// Template references are the lookup key for resolving an acquire request to a kind, so they must be unique
    /// across the configured kind set.
    #[snafu(display("Duplicate template reference '{}' in pool configuration.", template))]
    DuplicateTemplate {
        /// The template reference that appeared more than once.
        template: TemplateRef,
    },
}
