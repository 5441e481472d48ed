//! Ordering and identity for the visible message list.
//!
//! Origins overlap in time: a fetch on reconnect can return a message
//! already delivered by push, and a local placeholder briefly coexists with
//! its server echo. `dedup_sorted` is the sole gate through which any
//! message list becomes visible.

use std::collections::HashSet;

use crate::state::ChatMessage;

/// Identity used to decide whether two records are the same logical message.
/// Confirmed ids and local placeholders live in disjoint namespaces, so a
/// placeholder can never merge with a confirmed message that happens to
/// share its id, while exact re-delivery of either kind is suppressed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DedupKey {
    Confirmed(String),
    Local(String, i64),
}

fn dedup_key(m: &ChatMessage) -> DedupKey {
    if m.is_placeholder() {
        DedupKey::Local(m.id.clone(), m.created_at.timestamp_millis())
    } else {
        DedupKey::Confirmed(m.id.clone())
    }
}

/// Sort ascending by `created_at` (ties broken by id so the result is
/// invariant to delivery order), then keep the first occurrence of each
/// dedup key.
pub(crate) fn dedup_sorted(mut messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    messages.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    let mut seen: HashSet<DedupKey> = HashSet::with_capacity(messages.len());
    messages.retain(|m| seen.insert(dedup_key(m)));
    messages
}

/// Match a server echo of our own send against the optimistic outbox.
///
/// The transport carries no correlation token, so the match is heuristic:
/// the most recently inserted placeholder whose `created_at` falls within
/// `window_ms` of the echo's is consumed, and exactly one per echo, so two
/// rapid sends cannot both be claimed by a single echo.
pub(crate) fn reconcile_echo(
    outbox: &mut Vec<ChatMessage>,
    echo: &ChatMessage,
    window_ms: i64,
) -> Option<ChatMessage> {
    let pos = outbox.iter().rposition(|p| {
        (echo.created_at - p.created_at)
            .num_milliseconds()
            .abs()
            <= window_ms
    })?;
    Some(outbox.remove(pos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{MessageDeliveryState, LOCAL_ID_PREFIX};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn ts(offset_ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, 10, 0, 0).unwrap() + Duration::milliseconds(offset_ms)
    }

    fn msg(id: &str, offset_ms: i64) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            conversation_id: "c1".to_string(),
            sender_id: "u1".to_string(),
            sender_name: "Alice".to_string(),
            sender_email: None,
            body: format!("body of {id}"),
            attached_reference: None,
            read_by: vec![],
            created_at: ts(offset_ms),
            updated_at: ts(offset_ms),
            delivery: MessageDeliveryState::Sent,
        }
    }

    fn placeholder(suffix: &str, offset_ms: i64) -> ChatMessage {
        let mut m = msg(&format!("{LOCAL_ID_PREFIX}{suffix}"), offset_ms);
        m.delivery = MessageDeliveryState::Pending;
        m
    }

    #[test]
    fn duplicates_by_confirmed_id_collapse_and_output_is_sorted() {
        let out = dedup_sorted(vec![msg("a", 2000), msg("b", 1000), msg("a", 2000)]);
        let ids: Vec<&str> = out.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn output_is_invariant_to_permutation() {
        let a = msg("a", 500);
        let b = msg("b", 500);
        let c = msg("c", 100);
        let first = dedup_sorted(vec![a.clone(), b.clone(), c.clone()]);
        let second = dedup_sorted(vec![b.clone(), c.clone(), a.clone()]);
        let third = dedup_sorted(vec![c, a, b]);
        assert_eq!(first, second);
        assert_eq!(second, third);
    }

    #[test]
    fn dedup_is_idempotent() {
        let once = dedup_sorted(vec![msg("a", 10), msg("b", 20), msg("a", 10)]);
        let twice = dedup_sorted(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn placeholder_never_merges_with_confirmed_message_sharing_its_id() {
        let out = dedup_sorted(vec![placeholder("x", 0), msg("x", 0)]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn distinct_placeholders_with_equal_timestamps_both_survive() {
        let out = dedup_sorted(vec![placeholder("p1", 0), placeholder("p2", 0)]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn exact_placeholder_redelivery_is_suppressed() {
        let p = placeholder("p1", 0);
        let out = dedup_sorted(vec![p.clone(), p]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn echo_within_window_consumes_one_placeholder() {
        let mut outbox = vec![placeholder("p1", 0)];
        let echo = msg("srv-99", 1200);
        let consumed = reconcile_echo(&mut outbox, &echo, 2000).expect("match");
        assert!(consumed.id.ends_with("p1"));
        assert!(outbox.is_empty());
    }

    #[test]
    fn echo_outside_window_matches_nothing() {
        let mut outbox = vec![placeholder("p1", 0)];
        let echo = msg("srv-99", 2500);
        assert!(reconcile_echo(&mut outbox, &echo, 2000).is_none());
        assert_eq!(outbox.len(), 1);
    }

    #[test]
    fn echo_consumes_newest_matching_placeholder_and_stops() {
        let mut outbox = vec![placeholder("older", 0), placeholder("newer", 300)];
        let echo = msg("srv-1", 400);
        let consumed = reconcile_echo(&mut outbox, &echo, 2000).expect("match");
        assert!(consumed.id.ends_with("newer"));
        assert_eq!(outbox.len(), 1);
        assert!(outbox[0].id.ends_with("older"));
    }
}
