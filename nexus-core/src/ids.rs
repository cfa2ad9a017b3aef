//! Newtype identifiers threaded explicitly through every request.
//!
//! Mirrors `adk_core::types`: each id wraps a `String`, derives `Display`
//! through to the inner value, and is never implicitly convertible between
//! kinds — a document id and a tenant id are different types even though
//! both are UUID strings underneath.

use derive_more::{AsRef, Deref, Display, From, Into};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            Display,
            From,
            AsRef,
            Deref,
            Into,
            Serialize,
            Deserialize,
            Default,
        )]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }
    };
}

id_type!(TenantId);
id_type!(ApiKeyId);
id_type!(CorpusId);
id_type!(DocumentId);
id_type!(ChunkId);
id_type!(SessionId);
id_type!(RequestId);
id_type!(JobId);
id_type!(PlanId);
id_type!(PolicyId);
id_type!(LegalHoldId);
id_type!(DsarId);
id_type!(RegionId);
id_type!(SubjectId);
