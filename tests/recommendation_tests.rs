use std::collections::HashSet;
use std::sync::Arc;

use listrec::{
    db::MemoryStore,
    error::RecError,
    models::CanonicalKey,
    services::{RecommendationService, RecommendationSettings, SnowballStemmer, SuggestionFilter},
};

fn create_test_service() -> RecommendationService {
    RecommendationService::new(
        Arc::new(MemoryStore::new()),
        Arc::new(SnowballStemmer::default()),
        RecommendationSettings::default(),
    )
}

fn items(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

async fn weights_of(
    service: &RecommendationService,
    user_id: &str,
    category: &str,
    words: &[&str],
) -> Vec<f64> {
    let canonicalizer = service.canonicalizer();
    let weights = service
        .store()
        .load_weights(&canonicalizer.canonicalize(category), user_id)
        .await
        .unwrap()
        .unwrap();
    words
        .iter()
        .map(|w| (weights.weight(&canonicalizer.canonicalize(w)) * 1000.0).round() / 1000.0)
        .collect()
}

async fn counts_of(
    service: &RecommendationService,
    user_id: &str,
    category: &str,
    words: &[&str],
) -> Vec<i64> {
    let canonicalizer = service.canonicalizer();
    let aggregate = service
        .store()
        .load_aggregate(&canonicalizer.canonicalize(category), user_id)
        .await
        .unwrap()
        .unwrap();
    words
        .iter()
        .map(|w| aggregate.count(&canonicalizer.canonicalize(w)))
        .collect()
}

async fn past_phrase(service: &RecommendationService, user_id: &str) -> String {
    let ranked = service
        .get_past_recommendations(user_id, "grocery")
        .await
        .unwrap();
    SuggestionFilter::past().phrase(&ranked).unwrap()
}

#[tokio::test]
async fn test_grocery_history_weights_and_suggestions() {
    let service = create_test_service();
    let tracked = ["apples", "bananas", "ice cream", "pineapple", "chocolate"];

    // 1) first grocery list
    service
        .record_event("1", "grocery", &items(&["apples", "bananas", "ice cream"]), true)
        .await
        .unwrap();
    assert_eq!(
        weights_of(&service, "1", "grocery", &tracked).await,
        vec![1.0, 1.0, 1.0, 0.0, 0.0]
    );

    // 2) same list updated, still the first list
    service
        .record_event("1", "grocery", &items(&["pineapple", "apple"]), false)
        .await
        .unwrap();
    assert_eq!(
        counts_of(&service, "1", "grocery", &tracked).await,
        vec![2, 1, 1, 1, 0]
    );
    assert_eq!(
        weights_of(&service, "1", "grocery", &tracked).await,
        vec![2.0, 1.0, 1.0, 1.0, 0.0]
    );

    // 3) second list decays everything first
    service
        .record_event("1", "grocery", &items(&["pineapple", "apple"]), true)
        .await
        .unwrap();
    assert_eq!(
        counts_of(&service, "1", "grocery", &tracked).await,
        vec![3, 1, 1, 2, 0]
    );
    assert_eq!(
        weights_of(&service, "1", "grocery", &tracked).await,
        vec![1.6, 0.6, 0.6, 1.0, 0.0]
    );

    // 4) second list updated
    service
        .record_event("1", "grocery", &items(&["chocolate", "ice cream"]), false)
        .await
        .unwrap();
    assert_eq!(
        weights_of(&service, "1", "grocery", &tracked).await,
        vec![1.6, 0.6, 1.0, 1.0, 0.4]
    );

    // Another user's "Groceries" and "shopping" lists stay out of user 1's rows
    service
        .record_event("2", "Groceries", &items(&["chocolate", "ice cream"]), true)
        .await
        .unwrap();
    service
        .record_event("2", "shopping", &items(&["books", "chocolate"]), true)
        .await
        .unwrap();
    assert_eq!(
        weights_of(&service, "2", "grocery", &["ice cream", "chocolate"]).await,
        vec![1.0, 1.0]
    );
    assert_eq!(
        weights_of(&service, "2", "shopping", &["books", "chocolate"]).await,
        vec![1.0, 1.0]
    );

    // 5) third list
    service
        .record_event("1", "grocery", &items(&["ice cream", "apple"]), true)
        .await
        .unwrap();
    assert_eq!(
        counts_of(&service, "1", "grocery", &tracked).await,
        vec![4, 1, 3, 2, 1]
    );
    assert_eq!(
        weights_of(&service, "1", "grocery", &tracked).await,
        vec![1.36, 0.36, 1.0, 0.6, 0.24]
    );

    // 6) an empty fourth list changes nothing
    service
        .record_event("1", "grocery", &[], true)
        .await
        .unwrap();
    assert_eq!(
        weights_of(&service, "1", "grocery", &tracked).await,
        vec![1.36, 0.36, 1.0, 0.6, 0.24]
    );
    assert_eq!(past_phrase(&service, "1").await, "apple, ice cream, and pineapple");

    // 7) the first item on that empty list starts it
    service
        .record_event("1", "grocery", &items(&["apple"]), true)
        .await
        .unwrap();
    assert_eq!(past_phrase(&service, "1").await, "apple and ice cream");

    service
        .record_event("1", "grocery", &items(&["apple"]), true)
        .await
        .unwrap();
    assert_eq!(past_phrase(&service, "1").await, "apple");
}

#[tokio::test]
async fn test_past_recommendations_need_three_lists() {
    let service = create_test_service();

    for lists in 0..3 {
        let result = service.get_past_recommendations("1", "grocery").await;
        assert!(matches!(result, Err(RecError::InsufficientHistory { .. })));
        assert!(result.unwrap_err().is_recoverable());

        service
            .record_event("1", "grocery", &items(&["milk"]), true)
            .await
            .unwrap();
        assert_eq!(
            counts_of(&service, "1", "grocery", &["milk"]).await,
            vec![lists + 1]
        );
    }

    let ranked = service.get_past_recommendations("1", "grocery").await.unwrap();
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].item, "milk");
}

/// Replays `size` new lists where item `i` appears on the first `counts[i]` of them
async fn make_history(
    service: &RecommendationService,
    user_id: &str,
    size: usize,
    counts: &[(&str, usize)],
) {
    for list in 0..size {
        let words: Vec<&str> = counts
            .iter()
            .filter(|(_, count)| *count > list)
            .map(|(word, _)| *word)
            .collect();
        service
            .record_event(user_id, "grocery", &items(&words), true)
            .await
            .unwrap();
    }
}

async fn make_population(service: &RecommendationService) {
    make_history(
        service,
        "1",
        5,
        &[("apple", 4), ("banana", 2), ("carrot", 0), ("donut", 1)],
    )
    .await;
    make_history(
        service,
        "2",
        4,
        &[("apple", 3), ("banana", 0), ("carrot", 0), ("donut", 1)],
    )
    .await;
    make_history(
        service,
        "3",
        5,
        &[("apple", 1), ("banana", 1), ("carrot", 0), ("donut", 5)],
    )
    .await;
    make_history(
        service,
        "4",
        5,
        &[("apple", 1), ("banana", 0), ("carrot", 0), ("donut", 4)],
    )
    .await;
    make_history(
        service,
        "5",
        5,
        &[("apple", 0), ("banana", 1), ("carrot", 5), ("donut", 4)],
    )
    .await;
}

#[tokio::test]
async fn test_cross_user_recommendations_predict_every_item() {
    let service = create_test_service();
    make_population(&service).await;
    service
        .record_event("2", "grocery", &items(&["apple"]), true)
        .await
        .unwrap();

    let ranked = service
        .get_cross_user_recommendations("2", "grocery")
        .await
        .unwrap();

    let words: HashSet<&str> = ranked.iter().map(|r| r.item.as_str()).collect();
    assert_eq!(words, HashSet::from(["apple", "banana", "carrot", "donut"]));
    assert!(ranked.iter().all(|r| r.score.is_finite()));
    assert!(ranked.windows(2).all(|pair| pair[0].score >= pair[1].score));

    // The observed 1.0 for apple is fitted
    let apple = ranked.iter().find(|r| r.item == "apple").unwrap();
    assert!(apple.score > 0.5, "apple predicted {}", apple.score);

    // The requester's row was persisted as computed
    let stored = service.get_stored_predictions("2", "grocery").await.unwrap();
    assert_eq!(stored, ranked);

    // Current list items are never suggested again
    let current = [service.canonicalizer().canonicalize("apple")];
    if let Ok(selected) = SuggestionFilter::cross_user(&current).select(&ranked) {
        assert!(selected.iter().all(|r| r.item != "apple"));
    }
}

#[tokio::test]
async fn test_cross_user_needs_four_users() {
    let service = create_test_service();
    for user in ["1", "2", "3"] {
        service
            .record_event(user, "grocery", &items(&["apple", "donut"]), true)
            .await
            .unwrap();
    }

    let result = service.get_cross_user_recommendations("1", "grocery").await;
    assert!(matches!(
        result,
        Err(RecError::InsufficientPopulation { users: 3, required: 4, .. })
    ));

    service
        .record_event("4", "grocery", &items(&["carrot"]), true)
        .await
        .unwrap();
    assert!(service
        .get_cross_user_recommendations("1", "grocery")
        .await
        .is_ok());
}

#[tokio::test]
async fn test_feedback_only_users_do_not_join_population() {
    let service = create_test_service();
    service
        .record_event("1", "grocery", &items(&["apples", "milk"]), true)
        .await
        .unwrap();

    for user in ["2", "3", "4"] {
        service
            .record_negative_feedback(user, "grocery", &items(&["kale"]))
            .await
            .unwrap();
    }

    let result = service.get_cross_user_recommendations("1", "grocery").await;
    assert!(matches!(
        result,
        Err(RecError::InsufficientPopulation { users: 1, required: 4, .. })
    ));

    // Once they record a list they count
    for user in ["2", "3", "4"] {
        service
            .record_event(user, "grocery", &items(&["bread"]), true)
            .await
            .unwrap();
    }
    assert!(service
        .get_cross_user_recommendations("1", "grocery")
        .await
        .is_ok());
}

#[tokio::test]
async fn test_refresh_stores_rows_for_every_user() {
    let service = create_test_service();
    make_population(&service).await;

    let written = service.refresh_category_predictions("grocery").await.unwrap();
    assert_eq!(written, 5);

    for user in ["1", "2", "3", "4", "5"] {
        let stored = service.get_stored_predictions(user, "grocery").await.unwrap();
        assert_eq!(stored.len(), 4);
    }
}

#[tokio::test]
async fn test_negative_feedback_is_fitted_as_dislike() {
    let service = create_test_service();
    make_population(&service).await;
    service
        .record_negative_feedback("5", "grocery", &items(&["apples"]))
        .await
        .unwrap();

    let canonicalizer = service.canonicalizer();
    let weights = service
        .store()
        .load_weights(&canonicalizer.canonicalize("grocery"), "5")
        .await
        .unwrap()
        .unwrap();
    let apple: CanonicalKey = canonicalizer.canonicalize("apple");
    assert!((weights.weight(&apple) + 0.4).abs() < 1e-9);

    let ranked = service
        .get_cross_user_recommendations("5", "grocery")
        .await
        .unwrap();
    assert!(ranked.iter().all(|r| r.score.is_finite()));
    // User 5's own spelling is used for the key they disliked
    assert!(ranked.iter().any(|r| r.item == "apples"));
}
