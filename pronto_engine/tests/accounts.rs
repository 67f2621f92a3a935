//! Account upserts and the notification-subscription queries behind the dispatcher.
mod support;

use chrono::{Duration, Utc};
use pronto_engine::{
    db_types::{Category, NewUser},
    traits::{AccountManagement, NotificationPrefs},
    MarketConfig,
};
use support::{prepare_test_db, seed_user};

fn prefs(categories: &[Category], cities: &[&str]) -> NotificationPrefs {
    NotificationPrefs {
        notifications_enabled: true,
        subscribed_categories: categories.to_vec(),
        subscribed_cities: cities.iter().map(|c| c.to_string()).collect(),
        notification_frequency_minutes: 10,
    }
}

#[tokio::test]
async fn accounts_are_created_once_and_usernames_refresh() {
    let db = prepare_test_db(MarketConfig::default()).await;
    let first = db.fetch_or_create_user_account(NewUser::new(1)).await.unwrap();
    assert_eq!(first.username, None);
    assert_eq!(first.balance.value(), 0);

    let renamed = db.fetch_or_create_user_account(NewUser::new(1).with_username("alice")).await.unwrap();
    assert_eq!(renamed.username.as_deref(), Some("alice"));
    // A later call without a username keeps the last known one.
    let kept = db.fetch_or_create_user_account(NewUser::new(1)).await.unwrap();
    assert_eq!(kept.username.as_deref(), Some("alice"));
}

#[tokio::test]
async fn notification_prefs_round_trip() {
    let db = prepare_test_db(MarketConfig::default()).await;
    seed_user(&db, 1, 0).await;
    let account = db
        .update_notification_prefs(1, prefs(&[Category::Plumbing, Category::Cleaning], &["Moscow"]))
        .await
        .unwrap();
    assert!(account.notifications_enabled);
    assert_eq!(account.subscribed_categories.0, vec![Category::Plumbing, Category::Cleaning]);
    assert_eq!(account.subscribed_cities.0, vec!["Moscow".to_string()]);
    assert_eq!(account.notification_frequency_minutes, 10);
}

#[tokio::test]
async fn subscribed_executors_match_category_and_city() {
    let db = prepare_test_db(MarketConfig::default()).await;
    for id in 1..=5 {
        seed_user(&db, id, 0).await;
    }
    // 2 matches; 3 is in the wrong city; 4 follows another category; 5 never opted in.
    db.update_notification_prefs(2, prefs(&[Category::Plumbing], &["Moscow"])).await.unwrap();
    db.update_notification_prefs(3, prefs(&[Category::Plumbing], &["Kazan"])).await.unwrap();
    db.update_notification_prefs(4, prefs(&[Category::Cleaning], &["Moscow"])).await.unwrap();

    let matched = db.subscribed_executors(Category::Plumbing, "Moscow", 1).await.unwrap();
    let ids: Vec<i64> = matched.iter().map(|u| u.id).collect();
    assert_eq!(ids, vec![2]);
}

#[tokio::test]
async fn the_posting_client_is_never_notified() {
    let db = prepare_test_db(MarketConfig::default()).await;
    seed_user(&db, 1, 0).await;
    db.update_notification_prefs(1, prefs(&[Category::Plumbing], &["Moscow"])).await.unwrap();
    let matched = db.subscribed_executors(Category::Plumbing, "Moscow", 1).await.unwrap();
    assert!(matched.is_empty());
}

#[tokio::test]
async fn notification_timestamps_are_recorded() {
    let db = prepare_test_db(MarketConfig::default()).await;
    seed_user(&db, 2, 0).await;
    db.update_notification_prefs(2, prefs(&[Category::Plumbing], &["Moscow"])).await.unwrap();

    let before = db.subscribed_executors(Category::Plumbing, "Moscow", 1).await.unwrap();
    assert!(before[0].last_notified_at.is_none());

    let notified_at = Utc::now() - Duration::minutes(3);
    db.mark_executor_notified(2, notified_at).await.unwrap();
    let after = db.subscribed_executors(Category::Plumbing, "Moscow", 1).await.unwrap();
    let last = after[0].last_notified_at.expect("timestamp recorded");
    assert!((last - notified_at).num_seconds().abs() < 1);
}
