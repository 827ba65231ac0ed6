use std::sync::Arc;

use tracing::{debug, info, instrument};

use shared_database::Store;
use shared_models::billing::{InsuranceClaim, Invoice, InvoiceDetails, RevenueStats};
use shared_models::response::{Page, PageRequest};
use shared_utils::AppState;

use crate::models::{
    BillingError, ClaimListQuery, CreateInvoiceRequest, InvoiceListQuery, PaymentRequest,
    StatsQuery,
};

pub struct BillingService {
    store: Arc<dyn Store>,
}

impl BillingService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
        }
    }

    pub async fn list_invoices(
        &self,
        query: InvoiceListQuery,
    ) -> Result<Page<InvoiceDetails>, BillingError> {
        let page = query.page();
        let (invoices, total) = self.store.list_invoices(query.filter(), page).await?;
        Ok(Page::new(invoices, total, page))
    }

    pub async fn get_invoice(&self, id: i64) -> Result<InvoiceDetails, BillingError> {
        self.store
            .find_invoice(id)
            .await?
            .ok_or(BillingError::InvoiceNotFound)
    }

    #[instrument(skip(self, request), fields(patient_id = request.patient_id))]
    pub async fn create_invoice(
        &self,
        request: CreateInvoiceRequest,
        created_by: i64,
    ) -> Result<Invoice, BillingError> {
        let invoice = self.store.create_invoice(request.into_new(created_by)).await?;
        info!("Created invoice {} for {}", invoice.invoice_code, invoice.total_amount);
        Ok(invoice)
    }

    /// Applies a payment. Without an explicit status the status follows the
    /// paid amount against `total_amount - discount`.
    #[instrument(skip(self, request))]
    pub async fn record_payment(
        &self,
        id: i64,
        request: PaymentRequest,
    ) -> Result<Invoice, BillingError> {
        let invoice = self.store.record_payment(id, request.into()).await?;
        info!(
            "Invoice {} paid {} of {}: {}",
            invoice.invoice_code,
            invoice.paid_amount,
            invoice.payable(),
            invoice.payment_status
        );
        Ok(invoice)
    }

    pub async fn stats(&self, query: StatsQuery) -> Result<RevenueStats, BillingError> {
        let range = query.range()?;
        let stats = self.store.revenue_stats(range).await?;
        debug!("Revenue stats over {} invoices", stats.summary.total_invoices);
        Ok(stats)
    }

    pub async fn insurance_claims(
        &self,
        query: ClaimListQuery,
    ) -> Result<Page<InsuranceClaim>, BillingError> {
        let page = PageRequest::new(query.page, query.limit);
        let status = query.status.filter(|status| !status.trim().is_empty());
        let (claims, total) = self.store.list_insurance_claims(status, page).await?;
        Ok(Page::new(claims, total, page))
    }
}
