//! Keyword-scoring query router.
//!
//! Classifies a free-text question into one of a closed set of topics so the
//! caller can pick the right system prompt and knowledge slice. Pure string
//! scoring, decided before any generative call is made.

use tracing::debug;

/// The closed set of topics a question can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryRoute {
    Terrain,
    Gear,
    Conditions,
    Plan,
    General,
}

impl QueryRoute {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryRoute::Terrain => "terrain",
            QueryRoute::Gear => "gear",
            QueryRoute::Conditions => "conditions",
            QueryRoute::Plan => "plan",
            QueryRoute::General => "general",
        }
    }
}

/// A topic's score must reach this before it beats General.
const MIN_SCORE: usize = 2;

const TERRAIN_KEYWORDS: &[&str] = &[
    "terrain", "map", "ridge", "saddle", "bench", "bowl", "creek", "timber",
    "approach", "route", "glassing", "glass", "stalk", "ambush", "topo",
    "topographic", "elevation", "drainage", "canyon",
];

const GEAR_KEYWORDS: &[&str] = &[
    "gear", "pack", "bow", "rifle", "optics", "binoculars", "scope",
    "rangefinder", "boots", "clothing", "layers", "tent", "sleeping", "knife",
    "broadhead", "arrow", "caliber", "ammunition", "backpack", "camp", "stove",
    "tarp",
];

const CONDITIONS_KEYWORDS: &[&str] = &[
    "weather", "temperature", "cold", "hot", "rain", "snow", "wind",
    "barometric", "pressure", "moon", "phase", "front", "storm", "fog",
    "humidity", "forecast", "season", "rut",
];

const PLAN_KEYWORDS: &[&str] = &[
    "plan", "strategy", "scenario", "situation", "mistake", "bumped",
    "spooked", "bugle", "call", "setup", "morning", "evening",
];

const TERRAIN_PHRASES: &[&str] = &[
    "analyze this terrain",
    "look at this map",
    "approach route",
    "glassing position",
    "where should i glass",
];

const GEAR_PHRASES: &[&str] = &[
    "what gear",
    "pack list",
    "what should i bring",
    "equipment",
    "what bow",
    "what rifle",
];

const CONDITIONS_PHRASES: &[&str] = &[
    "weather",
    "what time",
    "when should i",
    "cold front",
    "temperature",
    "moon phase",
];

const PLAN_PHRASES: &[&str] = &[
    "build a plan",
    "hunt plan",
    "what's my strategy",
    "what should i do",
    "game plan",
];

/// Scores fixed keyword sets against the question's word set, then falls back
/// to phrase matching. General wins unless some topic scores at least
/// [`MIN_SCORE`]; keyword ties break in the order terrain, gear, conditions,
/// plan.
#[derive(Debug, Default)]
pub struct QueryRouter;

impl QueryRouter {
    pub fn new() -> Self {
        Self
    }

    pub fn route(&self, message: &str) -> QueryRoute {
        let lowered = message.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let scored = [
            (QueryRoute::Terrain, keyword_score(&words, TERRAIN_KEYWORDS)),
            (QueryRoute::Gear, keyword_score(&words, GEAR_KEYWORDS)),
            (
                QueryRoute::Conditions,
                keyword_score(&words, CONDITIONS_KEYWORDS),
            ),
            (QueryRoute::Plan, keyword_score(&words, PLAN_KEYWORDS)),
        ];

        // First listed wins a tie.
        let (best, score) = scored
            .iter()
            .copied()
            .fold((QueryRoute::General, 0usize), |acc, (route, score)| {
                if score > acc.1 { (route, score) } else { acc }
            });
        if score >= MIN_SCORE {
            debug!(route = best.as_str(), score, "routed by keyword score");
            return best;
        }

        for (route, phrases) in [
            (QueryRoute::Terrain, TERRAIN_PHRASES),
            (QueryRoute::Gear, GEAR_PHRASES),
            (QueryRoute::Conditions, CONDITIONS_PHRASES),
            (QueryRoute::Plan, PLAN_PHRASES),
        ] {
            if phrases.iter().any(|p| lowered.contains(p)) {
                debug!(route = route.as_str(), "routed by phrase match");
                return route;
            }
        }

        QueryRoute::General
    }
}

/// Distinct words from the message that appear in the keyword set.
fn keyword_score(words: &[&str], keywords: &[&str]) -> usize {
    let mut matched: Vec<&str> = words
        .iter()
        .copied()
        .filter(|w| keywords.contains(w))
        .collect();
    matched.sort_unstable();
    matched.dedup();
    matched.len()
}
