use crate::types::Candidate;

use std::cmp::Ordering;

const KEYWORD_WEIGHT: f64 = 0.45;
const RATING_WEIGHT: f64 = 0.30;
const POPULARITY_WEIGHT: f64 = 0.20;
const RESERVABLE_BOOST: f64 = 0.05;
/// Review count at which the popularity term saturates.
const POPULARITY_CEILING: f64 = 5_000.0;

const STOP_WORDS: &[&str] = &[
    "and", "the", "for", "with", "that", "this", "but", "not", "are", "was", "our", "want",
    "would", "like", "some", "any", "place", "please", "good", "nice", "table", "near",
];

/// Preference keywords: cuisine chips first, then distinctive words from the free-text notes.
pub fn extract_keywords(notes: Option<&str>, cuisines: &[String]) -> Vec<String> {
    let from_notes = notes
        .unwrap_or_default()
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() >= 3 && !STOP_WORDS.contains(&w.as_str()));

    let mut keywords: Vec<String> = Vec::new();
    for word in cuisines
        .iter()
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .chain(from_notes)
    {
        if !keywords.contains(&word) {
            keywords.push(word);
        }
    }
    keywords
}

fn keyword_density(candidate: &Candidate, keywords: &[String]) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }
    let mut haystack = candidate.name.to_lowercase();
    for tag in &candidate.types {
        haystack.push(' ');
        haystack.push_str(&tag.replace('_', " "));
    }
    for review in &candidate.reviews {
        haystack.push(' ');
        haystack.push_str(&review.to_lowercase());
    }
    let hits = keywords.iter().filter(|k| haystack.contains(k.as_str())).count();
    hits as f64 / keywords.len() as f64
}

pub fn score(candidate: &Candidate, keywords: &[String]) -> f64 {
    let rating = candidate.rating.unwrap_or(0.0).clamp(0.0, 5.0) as f64 / 5.0;
    let popularity =
        ((1.0 + candidate.review_count as f64).ln() / (1.0 + POPULARITY_CEILING).ln()).min(1.0);
    let boost = if candidate.reservable == Some(true) {
        RESERVABLE_BOOST
    } else {
        0.0
    };
    KEYWORD_WEIGHT * keyword_density(candidate, keywords)
        + RATING_WEIGHT * rating
        + POPULARITY_WEIGHT * popularity
        + boost
}

/// Order candidates best first. Ties go to the higher raw rating, then to discovery order.
pub fn rank(candidates: Vec<Candidate>, keywords: &[String]) -> Vec<Candidate> {
    let mut scored: Vec<(f64, Candidate)> = candidates
        .into_iter()
        .map(|c| (score(&c, keywords), c))
        .collect();
    // sort_by is stable, which preserves discovery order on full ties
    scored.sort_by(|(a_score, a), (b_score, b)| {
        b_score.total_cmp(a_score).then_with(|| {
            let a_rating = a.rating.unwrap_or(0.0);
            let b_rating = b.rating.unwrap_or(0.0);
            b_rating.partial_cmp(&a_rating).unwrap_or(Ordering::Equal)
        })
    });
    scored.into_iter().map(|(_, c)| c).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(id: &str, rating: f32, reviews: u32) -> Candidate {
        Candidate {
            place_id: id.to_string(),
            name: id.to_string(),
            rating: Some(rating),
            review_count: reviews,
            ..Default::default()
        }
    }

    fn ids(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.place_id.as_str()).collect()
    }

    #[test]
    fn keywords_combine_chips_and_notes() {
        let keywords = extract_keywords(
            Some("Quiet spot with good natural wine, and ITALIAN food"),
            &["Italian".to_string()],
        );
        assert_eq!(
            keywords,
            vec!["italian", "quiet", "spot", "natural", "wine", "food"]
        );
    }

    #[test]
    fn keyword_matches_outrank_rating() {
        let mut matching = place("match", 4.0, 200);
        matching.reviews = vec!["Best natural wine list in town".to_string()];
        let plain = place("plain", 4.6, 200);
        let ranked = rank(vec![plain, matching], &["natural".to_string(), "wine".to_string()]);
        assert_eq!(ids(&ranked), vec!["match", "plain"]);
    }

    #[test]
    fn popularity_and_reservations_break_close_calls() {
        let busy = place("busy", 4.5, 3_000);
        let quiet = place("quiet", 4.5, 3);
        assert_eq!(ids(&rank(vec![quiet.clone(), busy], &[])), vec!["busy", "quiet"]);

        let mut bookable = quiet.clone();
        bookable.place_id = "bookable".to_string();
        bookable.reservable = Some(true);
        assert_eq!(ids(&rank(vec![quiet, bookable], &[])), vec!["bookable", "quiet"]);
    }

    #[test]
    fn full_ties_keep_discovery_order() {
        let ranked = rank(
            vec![place("a", 4.0, 10), place("b", 4.0, 10), place("c", 4.0, 10)],
            &[],
        );
        assert_eq!(ids(&ranked), vec!["a", "b", "c"]);
        assert_eq!(
            ids(&rank(ranked.clone(), &[])),
            ids(&ranked),
            "ranking is reproducible"
        );
    }
}
