//! Protocol translation bridge and its supporting pieces.

pub mod artifact;
pub mod cache;
pub mod fingerprint;
pub mod mapping;
pub mod model;
pub mod registry;
pub mod translator;

pub use artifact::{Artifact, ArtifactKind};
pub use cache::{CacheStats, TranslationCache};
pub use fingerprint::structural_fingerprint;
pub use mapping::MappingTable;
pub use model::ModelClient;
pub use registry::{
    BuiltinProtocol, ProtocolDescriptor, ProtocolExamples, ProtocolOrigin, ProtocolRegistry,
};
pub use translator::{ProtocolBridge, ProtocolInfo};
