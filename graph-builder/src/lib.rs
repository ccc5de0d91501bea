pub mod builder;
pub mod extractor;

pub use builder::{build_graph, CancellationFlag, GraphProgress, GraphReport};
pub use extractor::{ExtractedEntity, ExtractedRelationship, Extractor, ExtractionResult};
