pub mod identity;
pub mod record;
pub mod target;

pub use identity::IdentityRule;
pub use record::{FieldValue, Fields, Record, RESERVED_FIELDS};
pub use target::{
    ArtifactFormat, DerivedRule, DetailSpec, FetchMode, FieldRule, ListingSpec, TargetSpec,
    DEFAULT_CDX_ENDPOINT,
};
