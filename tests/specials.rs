// tests/specials.rs
mod common;

use common::{day, obs, recording_mux, MemoryStore};
use std::sync::Arc;

use special_finder::model::{MatchOperator, WatchedTitle};
use special_finder::specials::{SpecialFinder, SpecialsOutcome, StoreSearch};

const TODAY: &str = "2026-10-16";

fn finder(rows: Vec<special_finder::model::Observation>) -> (SpecialFinder, Arc<std::sync::Mutex<Vec<String>>>) {
    let store = Arc::new(MemoryStore::with_rows(rows));
    let (mux, sent) = recording_mux();
    (SpecialFinder::new(Arc::new(StoreSearch::new(store)), mux), sent)
}

#[tokio::test]
async fn recent_match_notifies_and_old_one_does_not() {
    let (f, sent) = finder(vec![
        obs("Lindt Dark Chocolate 100g", "3.50", "Coles", "2026-10-13"),
        obs("Lindt Dark Chocolate 100g", "2.75", "Aldi", "2026-10-06"),
    ]);
    let f = f.with_watched(vec![WatchedTitle::new("dark chocolate")]);

    let out = f.find_specials_on(day(TODAY), None).await;
    assert_eq!(
        out,
        SpecialsOutcome::Completed {
            titles: 1,
            notified: 1,
            failed: 0
        }
    );
    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].starts_with("Special found: Lindt Dark Chocolate 100g at 3.5 (Coles)"));
}

#[tokio::test]
async fn window_start_day_is_included() {
    let (f, sent) = finder(vec![obs("Rice 5kg", "9", "Aldi", "2026-10-09")]);
    let f = f.with_watched(vec![WatchedTitle::new("rice")]);

    f.find_specials_on(day(TODAY), None).await;
    assert_eq!(sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn no_titles_anywhere_is_not_configured() {
    let (f, sent) = finder(vec![obs("Rice 5kg", "9", "Aldi", "2026-10-15")]);

    assert_eq!(f.find_specials_on(day(TODAY), None).await, SpecialsOutcome::NotConfigured);
    assert_eq!(f.find_specials_on(day(TODAY), Some(&[][..])).await, SpecialsOutcome::NotConfigured);
    assert!(sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn explicit_titles_replace_configured_ones() {
    let (f, sent) = finder(vec![
        obs("Rice 5kg", "9", "Aldi", "2026-10-15"),
        obs("Pasta 500g", "1.2", "Aldi", "2026-10-15"),
    ]);
    let f = f.with_watched(vec![WatchedTitle::new("rice")]);

    let explicit = vec![WatchedTitle::new("pasta")];
    f.find_specials_on(day(TODAY), Some(explicit.as_slice())).await;

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("Pasta 500g"));
}

#[tokio::test]
async fn operator_controls_partial_matches() {
    let rows = vec![obs("Greek Yoghurt 1kg", "6", "Coles", "2026-10-15")];

    let (and, and_sent) = finder(rows.clone());
    let strict = vec![WatchedTitle::new("greek feta")];
    and.find_specials_on(day(TODAY), Some(strict.as_slice())).await;
    assert!(and_sent.lock().unwrap().is_empty());

    let (or, or_sent) = finder(rows);
    let loose = vec![WatchedTitle::new("greek feta").with_operator(MatchOperator::Or)];
    or.find_specials_on(day(TODAY), Some(loose.as_slice())).await;
    assert_eq!(or_sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn shorter_window_narrows_the_search() {
    let (f, sent) = finder(vec![obs("Rice 5kg", "9", "Aldi", "2026-10-13")]);
    let f = f
        .with_watched(vec![WatchedTitle::new("rice")])
        .with_window_days(2);

    f.find_specials_on(day(TODAY), None).await;
    assert!(sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn oversized_window_is_bounded_not_fatal() {
    let (f, sent) = finder(vec![obs("Rice 5kg", "9", "Aldi", "2000-01-03")]);
    let f = f
        .with_watched(vec![WatchedTitle::new("rice")])
        .with_window_days(i64::MAX);

    let out = f.find_specials_on(day(TODAY), None).await;
    assert!(matches!(out, SpecialsOutcome::Completed { notified: 1, .. }));
    assert_eq!(sent.lock().unwrap().len(), 1);
}
