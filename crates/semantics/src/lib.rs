//! # fieldmemo semantics
//!
//! Pure, table-driven field understanding.
//!
//! ## Architecture
//!
//! ```text
//! FieldDescriptor
//!     │
//!     ├──> FieldClassifier (patterns + RepeaterRegistry)
//!     │      └─> InstanceType / Scope, frozen on the field
//!     │
//!     ├──> SemanticKeyGenerator (lexicon aliases, global facts)
//!     │      └─> "employer_name" | "SECTION:work_1:job_title"
//!     │
//!     └──> FuzzyKeyMatcher (stems, synonyms, token weights)
//!            └─> best cache key + similarity
//! ```

mod classifier;
mod dates;
mod keys;
pub mod lexicon;
mod matcher;
pub mod patterns;
mod registry;

pub use classifier::{ClassifierConfig, FieldClassifier, SectionalSignals};
pub use dates::DateRoleSequencer;
pub use keys::{derive_base_key, get_canonical_key, snake_case, GeneratedKey, KeyConfig, SemanticKeyGenerator};
pub use matcher::{FuzzyKeyMatcher, KeyMatch, MatchHint, MatchSource, MatcherConfig};
pub use registry::RepeaterRegistry;
