//! Query-side adapters: term nodes in, leaf blueprints and search iterators
//! out.

pub mod blueprint;
pub mod match_data;
pub mod search;
pub mod term;

pub use blueprint::{Blueprint, EmptyBlueprint, HitEstimate, MemTermBlueprint};
pub use match_data::{MatchPosition, TermFieldMatchData};
pub use search::{BooleanMatchIterator, EmptySearch, PostingIterator, SearchIterator};
pub use term::{FieldSpec, RequestContext, TermNode};
