use chrono::Utc;
use log::*;
use pronto_common::Rubles;

use crate::{
    db_types::PaymentInvoice,
    order_objects::{NewInvoice, PaidInvoice},
    traits::{PaymentsApiError, PaymentsDatabase},
};

/// API over invoice persistence and balance crediting.
///
/// The webhook path funnels through [`Self::process_paid_invoice`], which is idempotent: the
/// provider may replay a delivery any number of times and the owner is credited exactly once.
#[derive(Debug, Clone)]
pub struct PaymentsApi<B> {
    db: B,
}

impl<B> PaymentsApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> PaymentsApi<B>
where B: PaymentsDatabase
{
    pub async fn create_pending_invoice(
        &self,
        user_id: i64,
        invoice: NewInvoice,
    ) -> Result<PaymentInvoice, PaymentsApiError> {
        self.db.create_pending_invoice(user_id, invoice).await
    }

    pub async fn process_paid_invoice(&self, external_invoice_id: &str) -> Result<Option<PaidInvoice>, PaymentsApiError> {
        let result = self.db.process_paid_invoice(external_invoice_id, Utc::now()).await?;
        if result.is_none() {
            trace!("🔄️💰️ Webhook for invoice {external_invoice_id} was a no-op");
        }
        Ok(result)
    }

    pub async fn invoice_for_user(&self, invoice_id: i64, user_id: i64) -> Result<Option<PaymentInvoice>, PaymentsApiError> {
        self.db.invoice_for_user(invoice_id, user_id).await
    }

    pub async fn recharge(&self, user_id: i64, amount: Rubles, method: &str) -> Result<(Rubles, i64), PaymentsApiError> {
        self.db.recharge(user_id, amount, method).await
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
