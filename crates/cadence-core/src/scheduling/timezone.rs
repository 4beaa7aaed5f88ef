//! Contact timezone resolution
//!
//! A contact's explicit IANA timezone wins. Otherwise the free-text location
//! is matched against a table of cities, countries, US states and Canadian
//! provinces.

use chrono_tz::Tz;

/// Location keyword to IANA timezone, in match priority order
const LOCATION_TIMEZONES: &[(&str, &str)] = &[
    // North America
    ("new york", "America/New_York"),
    ("nyc", "America/New_York"),
    ("manhattan", "America/New_York"),
    ("brooklyn", "America/New_York"),
    ("los angeles", "America/Los_Angeles"),
    ("la", "America/Los_Angeles"),
    ("san francisco", "America/Los_Angeles"),
    ("sf", "America/Los_Angeles"),
    ("chicago", "America/Chicago"),
    ("houston", "America/Chicago"),
    ("toronto", "America/Toronto"),
    ("vancouver", "America/Vancouver"),
    ("montreal", "America/Toronto"),
    // Europe
    ("london", "Europe/London"),
    ("paris", "Europe/Paris"),
    ("berlin", "Europe/Berlin"),
    ("madrid", "Europe/Madrid"),
    ("rome", "Europe/Rome"),
    ("amsterdam", "Europe/Amsterdam"),
    ("stockholm", "Europe/Stockholm"),
    ("oslo", "Europe/Oslo"),
    ("copenhagen", "Europe/Copenhagen"),
    ("zurich", "Europe/Zurich"),
    ("vienna", "Europe/Vienna"),
    ("prague", "Europe/Prague"),
    ("warsaw", "Europe/Warsaw"),
    ("dublin", "Europe/Dublin"),
    // Asia Pacific
    ("sydney", "Australia/Sydney"),
    ("melbourne", "Australia/Melbourne"),
    ("brisbane", "Australia/Brisbane"),
    ("perth", "Australia/Perth"),
    ("adelaide", "Australia/Adelaide"),
    ("tokyo", "Asia/Tokyo"),
    ("seoul", "Asia/Seoul"),
    ("shanghai", "Asia/Shanghai"),
    ("beijing", "Asia/Shanghai"),
    ("hong kong", "Asia/Hong_Kong"),
    ("singapore", "Asia/Singapore"),
    ("bangkok", "Asia/Bangkok"),
    ("mumbai", "Asia/Kolkata"),
    ("delhi", "Asia/Kolkata"),
    ("bangalore", "Asia/Kolkata"),
    // Countries
    ("usa", "America/New_York"),
    ("united states", "America/New_York"),
    ("canada", "America/Toronto"),
    ("uk", "Europe/London"),
    ("united kingdom", "Europe/London"),
    ("england", "Europe/London"),
    ("france", "Europe/Paris"),
    ("germany", "Europe/Berlin"),
    ("spain", "Europe/Madrid"),
    ("italy", "Europe/Rome"),
    ("netherlands", "Europe/Amsterdam"),
    ("sweden", "Europe/Stockholm"),
    ("norway", "Europe/Oslo"),
    ("denmark", "Europe/Copenhagen"),
    ("switzerland", "Europe/Zurich"),
    ("austria", "Europe/Vienna"),
    ("australia", "Australia/Sydney"),
    ("japan", "Asia/Tokyo"),
    ("south korea", "Asia/Seoul"),
    ("korea", "Asia/Seoul"),
    ("china", "Asia/Shanghai"),
    ("thailand", "Asia/Bangkok"),
    ("india", "Asia/Kolkata"),
    // US states
    ("california", "America/Los_Angeles"),
    ("new york state", "America/New_York"),
    ("texas", "America/Chicago"),
    ("florida", "America/New_York"),
    ("illinois", "America/Chicago"),
    ("washington", "America/Los_Angeles"),
    ("oregon", "America/Los_Angeles"),
    ("nevada", "America/Los_Angeles"),
    ("arizona", "America/Phoenix"),
    ("colorado", "America/Denver"),
    ("utah", "America/Denver"),
    ("montana", "America/Denver"),
    ("wyoming", "America/Denver"),
    ("north dakota", "America/Chicago"),
    ("south dakota", "America/Chicago"),
    ("nebraska", "America/Chicago"),
    ("kansas", "America/Chicago"),
    ("oklahoma", "America/Chicago"),
    ("minnesota", "America/Chicago"),
    ("iowa", "America/Chicago"),
    ("missouri", "America/Chicago"),
    ("arkansas", "America/Chicago"),
    ("louisiana", "America/Chicago"),
    ("wisconsin", "America/Chicago"),
    ("michigan", "America/New_York"),
    ("indiana", "America/New_York"),
    ("ohio", "America/New_York"),
    ("kentucky", "America/New_York"),
    ("tennessee", "America/Chicago"),
    ("mississippi", "America/Chicago"),
    ("alabama", "America/Chicago"),
    ("georgia", "America/New_York"),
    ("south carolina", "America/New_York"),
    ("north carolina", "America/New_York"),
    ("virginia", "America/New_York"),
    ("west virginia", "America/New_York"),
    ("maryland", "America/New_York"),
    ("delaware", "America/New_York"),
    ("new jersey", "America/New_York"),
    ("connecticut", "America/New_York"),
    ("rhode island", "America/New_York"),
    ("massachusetts", "America/New_York"),
    ("vermont", "America/New_York"),
    ("new hampshire", "America/New_York"),
    ("maine", "America/New_York"),
    ("pennsylvania", "America/New_York"),
    // Canadian provinces
    ("ontario", "America/Toronto"),
    ("quebec", "America/Toronto"),
    ("british columbia", "America/Vancouver"),
    ("alberta", "America/Edmonton"),
    ("saskatchewan", "America/Regina"),
    ("manitoba", "America/Winnipeg"),
    ("new brunswick", "America/Moncton"),
    ("nova scotia", "America/Halifax"),
    ("prince edward island", "America/Halifax"),
    ("newfoundland", "America/St_Johns"),
    ("yukon", "America/Whitehorse"),
    ("northwest territories", "America/Yellowknife"),
    ("nunavut", "America/Iqaluit"),
];

/// Shortest location that may match as a fragment of a table key
const MIN_FRAGMENT_LEN: usize = 3;

/// Parse an IANA timezone name
pub fn parse_timezone(name: &str) -> Option<Tz> {
    name.trim().parse::<Tz>().ok()
}

/// Derive a timezone from a free-text location such as `"Sydney, Australia"`.
///
/// Tried in order: exact key, key appearing as whole words inside the
/// location (table order), location appearing inside a key.
pub fn derive_timezone(location: &str) -> Option<Tz> {
    let normalized = location.trim().to_lowercase();
    if normalized.is_empty() {
        return None;
    }

    let found = LOCATION_TIMEZONES
        .iter()
        .find(|(key, _)| *key == normalized)
        .or_else(|| {
            LOCATION_TIMEZONES
                .iter()
                .find(|(key, _)| contains_words(&normalized, key))
        })
        .or_else(|| {
            if normalized.chars().count() < MIN_FRAGMENT_LEN {
                return None;
            }
            LOCATION_TIMEZONES
                .iter()
                .find(|(key, _)| key.contains(normalized.as_str()))
        });

    found.and_then(|(_, tz)| parse_timezone(tz))
}

/// Resolve a contact's timezone: explicit name, then location, then `default`
pub fn resolve_timezone(explicit: Option<&str>, location: Option<&str>, default: Tz) -> Tz {
    explicit
        .and_then(parse_timezone)
        .or_else(|| location.and_then(derive_timezone))
        .unwrap_or(default)
}

/// Whether `needle` occurs in `haystack` bounded by non-alphanumeric characters
fn contains_words(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let before = haystack[..start].chars().next_back();
        let after = haystack[end..].chars().next();
        !before.map(char::is_alphanumeric).unwrap_or(false)
            && !after.map(char::is_alphanumeric).unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_exact_and_compound_locations() {
        assert_eq!(derive_timezone("Sydney"), Some(Tz::Australia__Sydney));
        assert_eq!(derive_timezone("Sydney, Australia"), Some(Tz::Australia__Sydney));
        assert_eq!(derive_timezone("  LONDON "), Some(Tz::Europe__London));
        assert_eq!(derive_timezone("Austin, Texas, USA"), Some(Tz::America__New_York));
        assert_eq!(derive_timezone("Calgary, Alberta"), Some(Tz::America__Edmonton));
    }

    #[test]
    fn test_whole_word_matching() {
        // "la" must not match inside "atlanta", "kansas" not inside "arkansas"
        assert_eq!(derive_timezone("Atlanta, Georgia"), Some(Tz::America__New_York));
        assert_eq!(derive_timezone("Little Rock, Arkansas"), Some(Tz::America__Chicago));
        assert_eq!(derive_timezone("LA"), Some(Tz::America__Los_Angeles));
    }

    #[test]
    fn test_fragment_matching() {
        assert_eq!(derive_timezone("brisb"), Some(Tz::Australia__Brisbane));
        // too short to match as a fragment
        assert_eq!(derive_timezone("br"), None);
        assert_eq!(derive_timezone("Atlantis"), None);
        assert_eq!(derive_timezone(""), None);
    }

    #[test]
    fn test_resolve_prefers_explicit() {
        assert_eq!(
            resolve_timezone(Some("Asia/Tokyo"), Some("London"), Tz::UTC),
            Tz::Asia__Tokyo
        );
        assert_eq!(
            resolve_timezone(Some("Not/AZone"), Some("London"), Tz::UTC),
            Tz::Europe__London
        );
        assert_eq!(resolve_timezone(None, Some("Atlantis"), Tz::UTC), Tz::UTC);
        assert_eq!(resolve_timezone(None, None, Tz::Europe__Paris), Tz::Europe__Paris);
    }
}
