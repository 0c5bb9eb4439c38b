// ABOUTME: Core library for parcel, containing the artifact record model and payload types.
// ABOUTME: Defines the shared data model and operator-facing text used across all parcel crates.

pub mod location;
pub mod notice;
pub mod record;

pub use location::{LocationError, LocationPayload};
pub use notice::{Notices, format_timestamp};
pub use record::{ArtifactId, ArtifactRecord, ArtifactType, NewArtifact, UnknownArtifactType};
