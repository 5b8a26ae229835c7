//! Search primitives: visited set, candidate buffer, beam search.

mod beam;
mod candidates;
mod visited;

pub use beam::{beam_search, BeamParams, SearchContext};
pub use candidates::{Candidate, CandidateList};
pub use visited::VisitedSet;
