//! Retrieval-augmented context pipeline.
//!
//! `RagPipeline::query` turns a question and a set of permitted categories
//! into a ranked, deduplicated, budget-limited `ContextBundle`:
//! expand -> embed -> route and search -> merge -> rerank -> assemble, with
//! an optional response cache in front.

pub mod assemble;
pub mod collaborators;
pub mod expand;
pub mod merge;
pub mod pipeline;
pub mod router;

pub use assemble::{assemble, select_within_budget, AssemblyStats};
pub use collaborators::{NoMemory, NoSkills, SkillRule, StaticMemory, StaticSkills};
pub use expand::{expand, StaticAcronymDictionary};
pub use merge::merge;
pub use pipeline::{AuxiliaryContext, RagPipeline, RagPipelineBuilder};
pub use router::{CollectionRouter, PipelineOptions, RouteOutcome, SearchOutcome};
