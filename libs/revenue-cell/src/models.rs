use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use validator::Validate;

use shared_database::store::{
    InvoiceFilter, NewInvoice, PaymentUpdate, StoreError, INVOICE_NOT_FOUND,
};
use shared_models::billing::{DateRange, PaymentStatus};
use shared_models::error::AppError;
use shared_models::response::PageRequest;
use shared_utils::validation::validate_non_negative;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvoiceRequest {
    pub patient_id: i64,
    pub appointment_id: Option<i64>,
    #[validate(custom(function = "validate_non_negative"))]
    pub total_amount: Decimal,
    #[validate(custom(function = "validate_non_negative"))]
    pub discount: Option<Decimal>,
    /// Free-form line items, stored as given.
    pub services: Option<Vec<serde_json::Value>>,
    pub notes: Option<String>,
}

impl CreateInvoiceRequest {
    pub fn into_new(self, created_by: i64) -> NewInvoice {
        NewInvoice {
            patient_id: self.patient_id,
            appointment_id: self.appointment_id,
            total_amount: self.total_amount,
            discount: self.discount.unwrap_or(Decimal::ZERO),
            services: self.services.unwrap_or_default(),
            notes: self.notes,
            created_by: Some(created_by),
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct PaymentRequest {
    #[validate(custom(function = "validate_non_negative"))]
    pub paid_amount: Option<Decimal>,
    pub payment_method: Option<String>,
    pub payment_status: Option<PaymentStatus>,
}

impl From<PaymentRequest> for PaymentUpdate {
    fn from(request: PaymentRequest) -> Self {
        PaymentUpdate {
            paid_amount: request.paid_amount,
            payment_method: request.payment_method,
            payment_status: request.payment_status,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct InvoiceListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub payment_status: Option<PaymentStatus>,
    pub patient_id: Option<i64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl InvoiceListQuery {
    pub fn page(&self) -> PageRequest {
        PageRequest::new(self.page, self.limit)
    }

    pub fn filter(&self) -> InvoiceFilter {
        InvoiceFilter {
            payment_status: self.payment_status,
            patient_id: self.patient_id,
            range: DateRange::new(self.start_date, self.end_date),
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct StatsQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl StatsQuery {
    pub fn range(&self) -> Result<DateRange, BillingError> {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) if start > end => {
                Err(BillingError::InvertedRange { start, end })
            }
            _ => Ok(DateRange::new(self.start_date, self.end_date)),
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ClaimListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
}

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("Invoice not found")]
    InvoiceNotFound,

    #[error("start_date {start} is after end_date {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for BillingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) if msg == INVOICE_NOT_FOUND => BillingError::InvoiceNotFound,
            other => BillingError::Store(other),
        }
    }
}

impl From<BillingError> for AppError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::InvoiceNotFound => AppError::NotFound(INVOICE_NOT_FOUND.to_string()),
            BillingError::InvertedRange { .. } => AppError::validation("end_date", err.to_string()),
            BillingError::Store(err) => err.into(),
        }
    }
}
