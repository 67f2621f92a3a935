use pronto_common::Rubles;

use crate::{
    db_types::{BalanceTransaction, ExecutorTake, NewUser, Order, OrderId, UserAccount},
    order_objects::OrderQueryFilter,
    traits::{AccountApiError, AccountManagement, NotificationPrefs},
};

/// Query API over user accounts, orders and the balance history.
#[derive(Debug, Clone)]
pub struct AccountApi<B> {
    db: B,
}

impl<B> AccountApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> AccountApi<B>
where B: AccountManagement
{
    pub async fn fetch_user_account(&self, user_id: i64) -> Result<Option<UserAccount>, AccountApiError> {
        self.db.fetch_user_account(user_id).await
    }

    pub async fn fetch_or_create_user_account(&self, user: NewUser) -> Result<UserAccount, AccountApiError> {
        self.db.fetch_or_create_user_account(user).await
    }

    /// The user's current balance. Absent users read as zero balance rather than an error so
    /// the balance endpoint can be called straight after authentication.
    pub async fn balance(&self, user_id: i64) -> Result<Rubles, AccountApiError> {
        let account = self.db.fetch_user_account(user_id).await?;
        Ok(account.map(|a| a.balance).unwrap_or_default())
    }

    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, AccountApiError> {
        self.db.fetch_order(order_id).await
    }

    pub async fn fetch_order_with_takes(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<(Order, Vec<ExecutorTake>)>, AccountApiError> {
        self.db.fetch_order_with_takes(order_id).await
    }

    pub async fn search_orders(&self, query: OrderQueryFilter) -> Result<(Vec<Order>, i64), AccountApiError> {
        self.db.search_orders(query).await
    }

    pub async fn fetch_takes_for_orders(&self, order_ids: &[OrderId]) -> Result<Vec<ExecutorTake>, AccountApiError> {
        self.db.fetch_takes_for_orders(order_ids).await
    }

    pub async fn balance_history(&self, user_id: i64) -> Result<Vec<BalanceTransaction>, AccountApiError> {
        self.db.fetch_balance_history(user_id).await
    }

    pub async fn update_notification_prefs(
        &self,
        user_id: i64,
        prefs: NotificationPrefs,
    ) -> Result<UserAccount, AccountApiError> {
        self.db.update_notification_prefs(user_id, prefs).await
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
