//! Deterministic conversation ids

use base64::{engine::general_purpose::STANDARD, Engine};
use cadence_common::types::{extract_address, CampaignId};

const CONVERSATION_ID_LEN: usize = 32;

/// Conversation id shared by every message between a contact and a sender
/// within a campaign, whichever provider delivered it.
pub fn conversation_id(
    contact_email: &str,
    sender_email: &str,
    campaign_id: Option<CampaignId>,
) -> String {
    let mut participants = [extract_address(contact_email), extract_address(sender_email)];
    participants.sort();

    let mut raw = participants.join("|");
    if let Some(id) = campaign_id {
        raw.push('|');
        raw.push_str(&id.to_string());
    }

    STANDARD
        .encode(raw.as_bytes())
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(CONVERSATION_ID_LEN)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    #[test]
    fn test_order_and_case_independent() {
        let campaign = Some(Uuid::new_v4());
        let a = conversation_id("Lead@Example.com", "rep@acme.io", campaign);
        let b = conversation_id("rep@acme.io", "lead@example.com", campaign);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_distinct_participants_distinct_ids() {
        let campaign = Some(Uuid::new_v4());
        assert_ne!(
            conversation_id("alice@example.com", "rep@acme.io", campaign),
            conversation_id("bob@example.com", "rep@acme.io", campaign)
        );
    }

    #[test]
    fn test_campaign_segment_only_when_present() {
        assert_eq!(conversation_id("b@x.io", "a@x.io", None), "YUB4LmlvfGJAeC5pbw");
        assert_ne!(
            conversation_id("b@x.io", "a@x.io", None),
            conversation_id("b@x.io", "a@x.io", Some(Uuid::nil()))
        );
    }

    #[test]
    fn test_display_names_ignored() {
        assert_eq!(
            conversation_id("\"Lead\" <lead@example.com>", "rep@acme.io", None),
            conversation_id("lead@example.com", "Rep <rep@acme.io>", None)
        );
    }
}
