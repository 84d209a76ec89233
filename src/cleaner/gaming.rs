//! Gaming/esports market subset.
//!
//! The keyword lists below are policy data, not logic: they decide which
//! markets count as gaming and how they classify, and they are expected to
//! over- and under-match at the margins (a question naming both an esports
//! title and an NBA team trips the exclusion list). Tune the lists, not the
//! matching code.

use serde_json::Value;
use tracing::info;

use crate::types::RawRecord;

/// Substrings that admit a market into the gaming subset.
const GAMING_KEYWORDS: &[&str] = &[
    "esports",
    "e-sports",
    "video game",
    "league of legends",
    "wild rift",
    "lcs",
    "lec ",
    "lck",
    "lpl ",
    "msi ",
    "dota",
    "the international",
    "counter-strike",
    "cs2",
    "csgo",
    "cs:go",
    "iem katowice",
    "blast premier",
    "esl pro league",
    "valorant",
    "overwatch",
    "call of duty",
    "fortnite",
    "rocket league",
    "starcraft",
    "hearthstone",
    "rainbow six",
    "apex legends",
    "pubg",
    "street fighter",
    "tekken",
    "smash bros",
    "mobile legends",
    "king of glory",
    "arena of valor",
];

/// Substrings that veto a match. Politics and traditional sports share words
/// like "win" and "finals" with esports questions, so these suppress the
/// worst false positives.
const EXCLUDE_KEYWORDS: &[&str] = &[
    "nba",
    "nfl",
    "mlb",
    "nhl",
    "ncaa",
    "premier league",
    "la liga",
    "serie a",
    "bundesliga",
    "champions league",
    "world cup",
    "super bowl",
    "olympic",
    "grand slam",
    "wimbledon",
    "formula 1",
    "f1 ",
    "election",
    "president",
    "senate",
    "congress",
    "parliament",
    "inflation",
    "gdp",
    "bitcoin",
    "ethereum",
];

/// Ordered game → keyword table; first match wins.
const GAME_TABLE: &[(&str, &[&str])] = &[
    ("League of Legends", &["league of legends", "wild rift", "lcs", "lec ", "lck", "lpl ", "msi "]),
    ("Counter-Strike", &["counter-strike", "cs2", "csgo", "cs:go", "iem katowice", "blast premier", "esl pro league"]),
    ("Dota 2", &["dota", "the international"]),
    ("Valorant", &["valorant"]),
    ("Overwatch", &["overwatch"]),
    ("Call of Duty", &["call of duty", "warzone"]),
    ("Fortnite", &["fortnite"]),
    ("Rocket League", &["rocket league"]),
    ("StarCraft", &["starcraft"]),
    ("Hearthstone", &["hearthstone"]),
    ("Rainbow Six", &["rainbow six"]),
    ("Apex Legends", &["apex legends"]),
    ("PUBG", &["pubg"]),
    ("Fighting Games", &["street fighter", "tekken", "smash bros"]),
    ("Mobile", &["mobile legends", "king of glory", "arena of valor"]),
];

/// Generic terms that only support the fallback "Gaming" label.
const GENERIC_GAMING_TERMS: &[&str] = &["esports", "e-sports", "video game", "gaming"];

pub fn is_gaming_market(text: &str) -> bool {
    let lower = text.to_lowercase();
    GAMING_KEYWORDS.iter().any(|k| lower.contains(k))
        && !EXCLUDE_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// First-match lookup against the game table; only-generic matches fall back
/// to the "Gaming" label, no match at all is None.
pub fn classify_game_type(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    for (game, keywords) in GAME_TABLE {
        if keywords.iter().any(|k| lower.contains(k)) {
            return Some(game);
        }
    }
    if GENERIC_GAMING_TERMS.iter().any(|k| lower.contains(k)) {
        return Some("Gaming");
    }
    None
}

/// Ordered phrase rules, most specific first; everything else is a prop bet.
pub fn classify_bet_type(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    if lower.contains("will win") || lower.contains("to win") || lower.contains("wins") {
        "Match Winner"
    } else if lower.contains("spread")
        || lower.contains("over/under")
        || lower.contains("over-under")
        || lower.contains("handicap")
    {
        "Spread / Over-Under"
    } else if lower.contains("first blood") || lower.contains("first kill") {
        "First Blood"
    } else if lower.contains("mvp") {
        "MVP"
    } else if lower.contains(" map") || lower.contains(" round") {
        "Map/Round Winner"
    } else {
        "Prop Bet"
    }
}

/// Filter cleaned markets down to the gaming subset and attach the derived
/// `gaming_type` / `bet_type` columns.
pub fn extract_gaming_markets(markets: &[RawRecord]) -> Vec<RawRecord> {
    let mut gaming = Vec::new();
    for market in markets {
        let Some(question) = market.get("question").and_then(|v| v.as_str()) else {
            continue;
        };
        if !is_gaming_market(question) {
            continue;
        }

        let mut row = market.clone();
        let game_type = classify_game_type(question)
            .map(|g| Value::String(g.to_string()))
            .unwrap_or(Value::Null);
        row.insert("gaming_type".to_string(), game_type);
        row.insert(
            "bet_type".to_string(),
            Value::String(classify_bet_type(question).to_string()),
        );
        gaming.push(row);
    }
    info!("gaming subset: {} of {} markets", gaming.len(), markets.len());
    gaming
}

/// Aggregate view of the gaming subset, logged after transformation.
#[derive(Debug, Default)]
pub struct GamingSummary {
    pub total: usize,
    pub active: usize,
    pub closed: usize,
    pub total_volume: f64,
    pub by_game: Vec<(String, usize)>,
    pub by_bet_type: Vec<(String, usize)>,
}

pub fn gaming_summary(markets: &[RawRecord]) -> GamingSummary {
    let mut summary = GamingSummary { total: markets.len(), ..Default::default() };
    let mut games: std::collections::BTreeMap<String, usize> = Default::default();
    let mut bets: std::collections::BTreeMap<String, usize> = Default::default();

    for market in markets {
        match market.get("closed").and_then(|v| v.as_bool()) {
            Some(true) => summary.closed += 1,
            _ => summary.active += 1,
        }
        if let Some(volume) = market.get("volume").and_then(|v| v.as_f64()) {
            summary.total_volume += volume;
        }
        if let Some(game) = market.get("gaming_type").and_then(|v| v.as_str()) {
            *games.entry(game.to_string()).or_default() += 1;
        }
        if let Some(bet) = market.get("bet_type").and_then(|v| v.as_str()) {
            *bets.entry(bet.to_string()).or_default() += 1;
        }
    }
    summary.by_game = games.into_iter().collect();
    summary.by_bet_type = bets.into_iter().collect();
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn market(question: &str) -> RawRecord {
        serde_json::from_value(json!({"id": "m", "question": question})).unwrap()
    }

    #[test]
    fn valorant_final_classifies_as_match_winner() {
        let q = "Who will win the Valorant Champions grand final?";
        assert!(is_gaming_market(q));
        assert_eq!(classify_game_type(q), Some("Valorant"));
        assert_eq!(classify_bet_type(q), "Match Winner");
    }

    #[test]
    fn traditional_sports_are_excluded() {
        let q = "Will the Lakers win the NBA finals?";
        assert!(!is_gaming_market(q));
        assert!(extract_gaming_markets(&[market(q)]).is_empty());

        // Matches the inclusion list but trips the exclusion list
        let q = "Will an esports title feature at the Olympic games?";
        assert!(!is_gaming_market(q));
    }

    #[test]
    fn generic_terms_fall_back_to_gaming_label() {
        let q = "Will esports viewership double this year?";
        assert!(is_gaming_market(q));
        assert_eq!(classify_game_type(q), Some("Gaming"));
    }

    #[test]
    fn bet_type_rules_apply_in_order() {
        assert_eq!(classify_bet_type("CS2 map 3 over/under 26.5 rounds?"), "Spread / Over-Under");
        assert_eq!(classify_bet_type("Who gets first blood in game 1?"), "First Blood");
        assert_eq!(classify_bet_type("Who takes MVP at Worlds?"), "MVP");
        assert_eq!(classify_bet_type("Faker to appear at the opening?"), "Prop Bet");
        assert_eq!(classify_bet_type("Which team takes map 2?"), "Map/Round Winner");
    }

    #[test]
    fn subset_rows_carry_derived_columns() {
        let markets = vec![
            market("Who will win the Valorant Champions grand final?"),
            market("Will inflation exceed 3%?"),
        ];
        let subset = extract_gaming_markets(&markets);
        assert_eq!(subset.len(), 1);
        assert_eq!(subset[0].get("gaming_type"), Some(&json!("Valorant")));
        assert_eq!(subset[0].get("bet_type"), Some(&json!("Match Winner")));
    }

    #[test]
    fn summary_counts_by_game_and_bet_type() {
        let mut rows = extract_gaming_markets(&[
            market("Who will win the Valorant Champions grand final?"),
            market("CS2 map 3 over/under 26.5 rounds?"),
        ]);
        rows[0].insert("volume".into(), json!(100.0));
        rows[1].insert("closed".into(), json!(true));

        let summary = gaming_summary(&rows);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.active, 1);
        assert_eq!(summary.closed, 1);
        assert_eq!(summary.total_volume, 100.0);
        assert!(summary.by_game.iter().any(|(g, n)| g == "Valorant" && *n == 1));
        assert!(summary.by_bet_type.iter().any(|(b, n)| b == "Spread / Over-Under" && *n == 1));
    }
}
