//! Actors: the scrapers a run can target.

pub mod catalog;
pub mod input_rules;

pub use catalog::ActorCatalog;
pub use input_rules::{normalize_input, Coercion, InputRule};

use crate::common::OwnerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorVisibility {
    Public,
    Private(OwnerId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActorDefinition {
    pub id: String,
    pub name: String,
    pub visibility: ActorVisibility,
    pub input_rules: &'static [InputRule],
    /// Successful runs hand their items to the worker's enrichment pipeline.
    pub enrichment: bool,
}

impl ActorDefinition {
    pub fn public(id: &str, name: &str, input_rules: &'static [InputRule]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            visibility: ActorVisibility::Public,
            input_rules,
            enrichment: false,
        }
    }

    pub fn private_to(mut self, owner_id: OwnerId) -> Self {
        self.visibility = ActorVisibility::Private(owner_id);
        self
    }

    pub fn with_enrichment(mut self) -> Self {
        self.enrichment = true;
        self
    }

    pub fn is_visible_to(&self, owner_id: OwnerId) -> bool {
        match self.visibility {
            ActorVisibility::Public => true,
            ActorVisibility::Private(owner) => owner == owner_id,
        }
    }
}
