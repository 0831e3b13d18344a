//! Payment administration. Every call needs a signed-in admin.

use auth_gated_client::{replies, ApiRequest, Invocation};
use observable_store::Record;
use serde_json::{json, Value};
use tracing::info;

use super::to_records;
use crate::{AppContext, ServiceResult};

const PAYMENT_SERVICE: &str = "acourse.PaymentService";

pub struct PaymentService {
    ctx: AppContext,
}

impl PaymentService {
    pub(crate) fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    async fn fetch(&self, payload: Value) -> ServiceResult<Vec<Record>> {
        let _busy = self.ctx.busy().guard("payments");
        let request = ApiRequest::rpc(PAYMENT_SERVICE, "ListPayments", payload).authenticated();
        Ok(match self.ctx.client().invoke(request).await?.into_value() {
            Some(reply) => to_records(replies::payments(&reply), "payment"),
            None => Vec::new(),
        })
    }

    /// Pending payments with user and course joined.
    pub async fn list(&self) -> ServiceResult<Vec<Record>> {
        self.fetch(json!({})).await
    }

    /// Settled payments, newest first.
    pub async fn history(&self) -> ServiceResult<Vec<Record>> {
        let mut payments = self.fetch(json!({"history": true})).await?;
        payments.reverse();
        Ok(payments)
    }

    pub async fn approve(&self, ids: &[String]) -> ServiceResult<Invocation> {
        self.decide("ApprovePayments", ids).await
    }

    pub async fn reject(&self, ids: &[String]) -> ServiceResult<Invocation> {
        self.decide("RejectPayments", ids).await
    }

    async fn decide(&self, method: &str, ids: &[String]) -> ServiceResult<Invocation> {
        let _busy = self.ctx.busy().guard("payments");
        let request = ApiRequest::rpc(PAYMENT_SERVICE, method, json!({"ids": ids})).authenticated();
        let outcome = self.ctx.client().invoke(request).await?;
        if !outcome.is_skipped() {
            info!(method, count = ids.len(), "payments updated");
        }
        Ok(outcome)
    }
}
