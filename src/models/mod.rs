//! Models module.
pub mod tiered;

/// The rule of the tiered heuristic that produced a prediction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// The user already rated the item; the rating is passed through.
    Observed,
    /// The user likes (nearly) everything.
    Optimistic,
    /// The user likes (nearly) nothing.
    Pessimistic,
    /// A similar user rated the item.
    Neighbour,
    /// No similar user rated the item.
    Fallback,
}

impl Tier {
    /// Short lowercase name, used in reports.
    pub fn name(self) -> &'static str {
        match self {
            Tier::Observed => "observed",
            Tier::Optimistic => "optimistic",
            Tier::Pessimistic => "pessimistic",
            Tier::Neighbour => "neighbour",
            Tier::Fallback => "fallback",
        }
    }
}
