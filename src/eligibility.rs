use crate::types::Candidate;

const OPERATIONAL: &str = "OPERATIONAL";

const FOOD_SERVICE_TYPES: &[&str] = &["restaurant", "food", "bar", "cafe"];

/// Places that serve food but do not take reservations.
const DISALLOWED_TYPES: &[&str] = &[
    "fast_food_restaurant",
    "fast_food",
    "meal_takeaway",
    "meal_delivery",
    "food_court",
    "sandwich_shop",
    "ice_cream_shop",
    "dessert_shop",
    "donut_shop",
    "juice_shop",
    "bakery",
    "convenience_store",
    "grocery_store",
    "supermarket",
    "gas_station",
];

fn is_food_service(tag: &str) -> bool {
    FOOD_SERVICE_TYPES.contains(&tag) || tag.ends_with("_restaurant") || tag.ends_with("_bar")
}

/// Whether a candidate is worth calling at all.
pub fn is_eligible(candidate: &Candidate) -> bool {
    let has_phone = candidate
        .phone
        .as_deref()
        .is_some_and(|p| p.chars().any(|c| c.is_ascii_digit()));
    if !has_phone {
        return false;
    }
    match candidate.business_status.as_deref() {
        Some(status) if status.eq_ignore_ascii_case(OPERATIONAL) => {}
        _ => return false,
    }
    let tags: Vec<String> = candidate
        .types
        .iter()
        .map(|t| t.to_ascii_lowercase())
        .collect();
    if tags.iter().any(|t| DISALLOWED_TYPES.contains(&t.as_str())) {
        return false;
    }
    tags.iter().any(|t| is_food_service(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bistro() -> Candidate {
        Candidate {
            place_id: "p1".to_string(),
            name: "Le Bistro".to_string(),
            phone: Some("+1 512-555-0100".to_string()),
            business_status: Some("OPERATIONAL".to_string()),
            types: vec!["french_restaurant".to_string(), "restaurant".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn operational_restaurant_with_phone_is_eligible() {
        assert!(is_eligible(&bistro()));
    }

    #[test]
    fn missing_phone_is_always_rejected() {
        let mut c = bistro();
        c.phone = None;
        assert!(!is_eligible(&c));
        c.phone = Some("  ".to_string());
        assert!(!is_eligible(&c));
    }

    #[test]
    fn requires_operational_status() {
        let mut c = bistro();
        c.business_status = None;
        assert!(!is_eligible(&c));
        c.business_status = Some("CLOSED_TEMPORARILY".to_string());
        assert!(!is_eligible(&c));
    }

    #[test]
    fn rejects_non_food_and_takeaway_places() {
        let mut c = bistro();
        c.types = vec!["museum".to_string()];
        assert!(!is_eligible(&c));
        c.types = vec!["restaurant".to_string(), "meal_takeaway".to_string()];
        assert!(!is_eligible(&c));
        c.types = vec!["fast_food_restaurant".to_string()];
        assert!(!is_eligible(&c));
        c.types = vec!["wine_bar".to_string()];
        assert!(is_eligible(&c));
    }

    #[test]
    fn same_input_same_answer() {
        let c = bistro();
        assert_eq!(is_eligible(&c), is_eligible(&c.clone()));
    }
}
