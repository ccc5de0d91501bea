//! The closed ontology the Extractor validates against and the Graph Store
//! ranks with (§4.4, §4.6).

use std::fmt;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Person,
    Topic,
    ResearchMethod,
    Paper,
    Concept,
    Organization,
    Dataset,
}

impl EntityType {
    pub const ALL: [EntityType; 7] = [
        EntityType::Person,
        EntityType::Topic,
        EntityType::ResearchMethod,
        EntityType::Paper,
        EntityType::Concept,
        EntityType::Organization,
        EntityType::Dataset,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "PERSON",
            EntityType::Topic => "TOPIC",
            EntityType::ResearchMethod => "RESEARCH_METHOD",
            EntityType::Paper => "PAPER",
            EntityType::Concept => "CONCEPT",
            EntityType::Organization => "ORGANIZATION",
            EntityType::Dataset => "DATASET",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PERSON" => Ok(EntityType::Person),
            "TOPIC" => Ok(EntityType::Topic),
            "RESEARCH_METHOD" => Ok(EntityType::ResearchMethod),
            "PAPER" => Ok(EntityType::Paper),
            "CONCEPT" => Ok(EntityType::Concept),
            "ORGANIZATION" => Ok(EntityType::Organization),
            "DATASET" => Ok(EntityType::Dataset),
            other => Err(AppError::OntologyViolation(format!(
                "unknown entity type: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationshipType {
    Authored,
    AffiliatedWith,
    Cites,
    About,
    Studies,
    UsesMethod,
    UsesDataset,
    BasedOn,
    Extends,
    Contradicts,
    Proposes,
    RelatedTo,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 12] = [
        RelationshipType::Authored,
        RelationshipType::AffiliatedWith,
        RelationshipType::Cites,
        RelationshipType::About,
        RelationshipType::Studies,
        RelationshipType::UsesMethod,
        RelationshipType::UsesDataset,
        RelationshipType::BasedOn,
        RelationshipType::Extends,
        RelationshipType::Contradicts,
        RelationshipType::Proposes,
        RelationshipType::RelatedTo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Authored => "AUTHORED",
            RelationshipType::AffiliatedWith => "AFFILIATED_WITH",
            RelationshipType::Cites => "CITES",
            RelationshipType::About => "ABOUT",
            RelationshipType::Studies => "STUDIES",
            RelationshipType::UsesMethod => "USES_METHOD",
            RelationshipType::UsesDataset => "USES_DATASET",
            RelationshipType::BasedOn => "BASED_ON",
            RelationshipType::Extends => "EXTENDS",
            RelationshipType::Contradicts => "CONTRADICTS",
            RelationshipType::Proposes => "PROPOSES",
            RelationshipType::RelatedTo => "RELATED_TO",
        }
    }

    /// Fixed table of relationship-type weights used as graph-ranking
    /// tie-breakers (§4.4). Unknown types default to 1.0 via `type_weight`.
    pub fn type_weight(&self) -> f32 {
        match self {
            RelationshipType::Cites => 2.0,
            RelationshipType::Authored => 1.8,
            RelationshipType::Proposes => 1.5,
            RelationshipType::Extends | RelationshipType::BasedOn => 1.3,
            RelationshipType::UsesMethod | RelationshipType::UsesDataset => 1.2,
            RelationshipType::Studies | RelationshipType::About => 1.1,
            RelationshipType::Contradicts => 1.0,
            RelationshipType::RelatedTo => 0.8,
            RelationshipType::AffiliatedWith => 0.7,
        }
    }

    /// Whether `source -> target` is a permitted pair of entity types for this
    /// relationship type. `RELATED_TO` permits any combination.
    pub fn permits(&self, source: EntityType, target: EntityType) -> bool {
        use EntityType::{Concept, Dataset, Organization, Paper, Person, ResearchMethod, Topic};
        match self {
            RelationshipType::Authored => source == Person && target == Paper,
            RelationshipType::AffiliatedWith => source == Person && target == Organization,
            RelationshipType::Cites => source == Paper && target == Paper,
            RelationshipType::About => source == Paper && (target == Topic || target == Concept),
            RelationshipType::Studies => source == Person && (target == Topic || target == Concept),
            RelationshipType::UsesMethod => source == Paper && target == ResearchMethod,
            RelationshipType::UsesDataset => source == Paper && target == Dataset,
            RelationshipType::BasedOn => source == Paper && target == Paper,
            RelationshipType::Extends => source == Paper && target == Paper,
            RelationshipType::Contradicts => source == Paper && target == Paper,
            RelationshipType::Proposes => source == Paper && (target == Concept || target == ResearchMethod),
            RelationshipType::RelatedTo => true,
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RelationshipType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AUTHORED" => Ok(RelationshipType::Authored),
            "AFFILIATED_WITH" => Ok(RelationshipType::AffiliatedWith),
            "CITES" => Ok(RelationshipType::Cites),
            "ABOUT" => Ok(RelationshipType::About),
            "STUDIES" => Ok(RelationshipType::Studies),
            "USES_METHOD" => Ok(RelationshipType::UsesMethod),
            "USES_DATASET" => Ok(RelationshipType::UsesDataset),
            "BASED_ON" => Ok(RelationshipType::BasedOn),
            "EXTENDS" => Ok(RelationshipType::Extends),
            "CONTRADICTS" => Ok(RelationshipType::Contradicts),
            "PROPOSES" => Ok(RelationshipType::Proposes),
            "RELATED_TO" => Ok(RelationshipType::RelatedTo),
            other => Err(AppError::OntologyViolation(format!(
                "unknown relationship type: {other}"
            ))),
        }
    }
}

/// Weight lookup for a relationship type name that may not parse (defensive:
/// stored relationship rows are always validated on write, but a caller
/// operating on a raw string should still get the documented default of 1.0).
pub fn type_weight_for_name(name: &str) -> f32 {
    name.parse::<RelationshipType>()
        .map(|t| t.type_weight())
        .unwrap_or(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn authored_only_permits_person_to_paper() {
        assert!(RelationshipType::Authored.permits(EntityType::Person, EntityType::Paper));
        assert!(!RelationshipType::Authored.permits(EntityType::Paper, EntityType::Person));
    }

    #[test]
    fn related_to_permits_any_pair() {
        assert!(RelationshipType::RelatedTo.permits(EntityType::Dataset, EntityType::Person));
    }

    #[test]
    fn unknown_relationship_type_defaults_to_weight_one() {
        assert_eq!(type_weight_for_name("NOT_A_REAL_TYPE"), 1.0);
    }

    #[test]
    fn roundtrip_entity_type_strings() {
        for ty in EntityType::ALL {
            assert_eq!(EntityType::from_str(ty.as_str()).unwrap(), ty);
        }
    }

    #[test]
    fn roundtrip_relationship_type_strings() {
        for ty in RelationshipType::ALL {
            assert_eq!(RelationshipType::from_str(ty.as_str()).unwrap(), ty);
        }
    }
}
