use crate::error::CollaboratorError;
use crate::opening_hours::{DayTime, OpeningHours, Period};
use crate::types::{Candidate, LatLng, SearchQuery};
use crate::utils::to_e164;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

const SERVICE: &str = "places";
const SEARCH_URL: &str = "https://places.googleapis.com/v1/places:searchText";
const STATIC_MAP_URL: &str = "https://maps.googleapis.com/maps/api/staticmap";
const FIELD_MASK: &str = "places.id,places.displayName,places.internationalPhoneNumber,\
places.rating,places.userRatingCount,places.types,\
places.businessStatus,places.regularOpeningHours,places.currentOpeningHours.openNow,\
places.utcOffsetMinutes,places.reviews,places.reservable,places.location";
const MAX_RESULTS: u32 = 20;

/// Finds restaurants for a search.
#[async_trait]
pub trait PlaceSearch: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Candidate>, CollaboratorError>;

    /// A map showing the given restaurants, when the provider can draw one.
    fn map_url(&self, _candidates: &[Candidate]) -> Option<String> {
        None
    }
}

pub struct GooglePlaces {
    http_client: reqwest::Client,
    api_key: String,
}

impl GooglePlaces {
    pub fn new(http_client: reqwest::Client, api_key: String) -> Self {
        Self {
            http_client,
            api_key,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TextSearchRequest {
    text_query: String,
    max_result_count: u32,
    included_type: &'static str,
}

#[derive(Deserialize, Default)]
struct TextSearchResponse {
    #[serde(default)]
    places: Vec<Place>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct Place {
    id: String,
    display_name: Option<LocalizedText>,
    international_phone_number: Option<String>,
    rating: Option<f32>,
    user_rating_count: Option<u32>,
    types: Vec<String>,
    business_status: Option<String>,
    regular_opening_hours: Option<PlaceHours>,
    current_opening_hours: Option<PlaceHours>,
    utc_offset_minutes: Option<i32>,
    reviews: Vec<Review>,
    reservable: Option<bool>,
    location: Option<LatLng>,
}

#[derive(Deserialize, Default)]
struct LocalizedText {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct PlaceHours {
    open_now: Option<bool>,
    periods: Vec<PlacePeriod>,
}

#[derive(Deserialize)]
struct PlacePeriod {
    open: PlacePoint,
    #[serde(default)]
    close: Option<PlacePoint>,
}

#[derive(Deserialize)]
struct PlacePoint {
    day: u8,
    #[serde(default)]
    hour: u8,
    #[serde(default)]
    minute: u8,
}

#[derive(Deserialize, Default)]
struct Review {
    #[serde(default)]
    text: Option<LocalizedText>,
}

impl From<PlacePoint> for DayTime {
    fn from(p: PlacePoint) -> Self {
        DayTime {
            day: p.day,
            hour: p.hour,
            minute: p.minute,
        }
    }
}

impl From<Place> for Candidate {
    fn from(place: Place) -> Self {
        let open_now = place.current_opening_hours.and_then(|h| h.open_now);
        let opening_hours = match place.regular_opening_hours {
            Some(hours) => Some(OpeningHours {
                open_now: open_now.or(hours.open_now),
                periods: hours
                    .periods
                    .into_iter()
                    .map(|p| Period {
                        open: p.open.into(),
                        close: p.close.map(Into::into),
                    })
                    .collect(),
            }),
            None => open_now.map(|open_now| OpeningHours {
                open_now: Some(open_now),
                periods: vec![],
            }),
        };
        Candidate {
            place_id: place.id,
            name: place.display_name.map(|n| n.text).unwrap_or_default(),
            // dialing needs a country code, which national numbers lack
            phone: place.international_phone_number.as_deref().and_then(to_e164),
            rating: place.rating,
            review_count: place.user_rating_count.unwrap_or(0),
            types: place.types,
            business_status: place.business_status,
            opening_hours,
            utc_offset_minutes: place.utc_offset_minutes,
            reviews: place
                .reviews
                .into_iter()
                .filter_map(|r| r.text.map(|t| t.text))
                .collect(),
            reservable: place.reservable,
            location: place.location,
        }
    }
}

fn text_query(query: &SearchQuery) -> String {
    let cuisines = query.cuisines.join(" ");
    if cuisines.trim().is_empty() {
        format!("restaurants in {}", query.location)
    } else {
        format!("{cuisines} restaurants in {}", query.location)
    }
}

#[async_trait]
impl PlaceSearch for GooglePlaces {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Candidate>, CollaboratorError> {
        let request = TextSearchRequest {
            text_query: text_query(query),
            max_result_count: MAX_RESULTS,
            included_type: "restaurant",
        };
        let resp = self
            .http_client
            .post(SEARCH_URL)
            .header("X-Goog-Api-Key", &self.api_key)
            .header("X-Goog-FieldMask", FIELD_MASK)
            .json(&request)
            .send()
            .await
            .map_err(CollaboratorError::http(SERVICE))?;
        if !resp.status().is_success() {
            return Err(CollaboratorError::Status {
                service: SERVICE,
                status: resp.status(),
            });
        }
        let resp = resp
            .json::<TextSearchResponse>()
            .await
            .map_err(|e| CollaboratorError::malformed(SERVICE, e.to_string()))?;
        debug!(count = resp.places.len(), text_query=%request.text_query, "place search");
        Ok(resp.places.into_iter().map(Candidate::from).collect())
    }

    fn map_url(&self, candidates: &[Candidate]) -> Option<String> {
        let markers: Vec<String> = candidates
            .iter()
            .filter_map(|c| c.location)
            .map(|l| format!("{:.6},{:.6}", l.latitude, l.longitude))
            .collect();
        if markers.is_empty() {
            return None;
        }
        let markers = format!("size:mid|color:red|{}", markers.join("|"));
        reqwest::Url::parse_with_params(
            STATIC_MAP_URL,
            &[
                ("size", "640x400"),
                ("markers", markers.as_str()),
                ("key", self.api_key.as_str()),
            ],
        )
        .ok()
        .map(String::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn place_maps_to_candidate() {
        let resp: TextSearchResponse = serde_json::from_value(json!({
            "places": [{
                "id": "ChIJ123",
                "displayName": { "text": "Osteria Nonna", "languageCode": "en" },
                "internationalPhoneNumber": "+1 512-555-0100",
                "nationalPhoneNumber": "(512) 555-0100",
                "rating": 4.6,
                "userRatingCount": 812,
                "types": ["italian_restaurant", "restaurant", "food"],
                "businessStatus": "OPERATIONAL",
                "regularOpeningHours": {
                    "openNow": false,
                    "periods": [
                        { "open": { "day": 5, "hour": 17, "minute": 0 },
                          "close": { "day": 6, "hour": 1, "minute": 0 } }
                    ]
                },
                "currentOpeningHours": { "openNow": true },
                "utcOffsetMinutes": -300,
                "reviews": [ { "text": { "text": "Handmade pasta." } } ],
                "reservable": true,
                "location": { "latitude": 30.26, "longitude": -97.74 }
            }]
        }))
        .unwrap();
        let candidate: Candidate = resp.places.into_iter().next().unwrap().into();
        assert_eq!(candidate.name, "Osteria Nonna");
        assert_eq!(candidate.phone.as_deref(), Some("+15125550100"));
        assert_eq!(candidate.review_count, 812);
        let hours = candidate.opening_hours.unwrap();
        assert_eq!(hours.open_now, Some(true));
        assert_eq!(hours.periods[0].close, Some(DayTime { day: 6, hour: 1, minute: 0 }));
        assert_eq!(candidate.reviews, vec!["Handmade pasta."]);
    }

    #[test]
    fn national_only_numbers_leave_the_candidate_without_a_phone() {
        let place: Place = serde_json::from_value(json!({
            "id": "ChIJ456",
            "displayName": { "text": "Taqueria Sol" },
            "nationalPhoneNumber": "(512) 555-0101",
            "businessStatus": "OPERATIONAL",
            "types": ["mexican_restaurant"]
        }))
        .unwrap();
        let candidate = Candidate::from(place);
        assert_eq!(candidate.phone, None);
        assert!(!crate::eligibility::is_eligible(&candidate));
    }

    #[test]
    fn cuisines_lead_the_text_query() {
        let query: SearchQuery = serde_json::from_value(json!({
            "location": "Austin, TX",
            "party_size": 2,
            "date": "2026-10-19",
            "intent": "next_available",
            "cuisines": ["thai"]
        }))
        .unwrap();
        assert_eq!(text_query(&query), "thai restaurants in Austin, TX");
    }
}
