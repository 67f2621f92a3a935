#![allow(dead_code)]
//! Shared helpers for the engine integration tests: a throwaway SQLite database per test, with
//! migrations applied and straightforward user seeding.
use pronto_common::Rubles;
use pronto_engine::{
    db_types::{NewUser, UserAccount},
    traits::{AccountManagement, PaymentsDatabase},
    MarketConfig,
    SqliteDatabase,
};

pub fn random_db_url() -> String {
    format!("sqlite://{}/pronto_test_{}.db", std::env::temp_dir().display(), rand::random::<u64>())
}

pub async fn prepare_test_db(config: MarketConfig) -> SqliteDatabase {
    let _ = env_logger::try_init();
    let url = random_db_url();
    let db = SqliteDatabase::new_with_url(&url, config, 5).await.expect("Error creating test database");
    db.migrate().await.expect("Error running migrations");
    db
}

/// Creates the user and tops their balance up to `balance` rubles via the public recharge path.
pub async fn seed_user(db: &SqliteDatabase, id: i64, balance: i64) -> UserAccount {
    db.fetch_or_create_user_account(NewUser::new(id)).await.expect("Error creating user");
    if balance > 0 {
        db.recharge(id, Rubles::from(balance), "test_seed").await.expect("Error seeding balance");
    }
    db.fetch_user_account(id).await.expect("Error fetching user").expect("User should exist")
}

pub async fn user(db: &SqliteDatabase, id: i64) -> UserAccount {
    db.fetch_user_account(id).await.expect("Error fetching user").expect("User should exist")
}
