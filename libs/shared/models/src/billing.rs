use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Partial,
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 4] = [
        PaymentStatus::Unpaid,
        PaymentStatus::Partial,
        PaymentStatus::Paid,
        PaymentStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
        }
    }

    /// Status implied by the amount paid against the payable amount.
    /// Never yields `Refunded`; that status is only set explicitly.
    pub fn derive(paid_amount: Decimal, payable: Decimal) -> Self {
        if paid_amount <= Decimal::ZERO {
            PaymentStatus::Unpaid
        } else if paid_amount >= payable {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Partial
        }
    }

    /// An explicit status wins over the derived one.
    pub fn resolve(
        explicit: Option<PaymentStatus>,
        paid_amount: Decimal,
        payable: Decimal,
    ) -> Self {
        explicit.unwrap_or_else(|| Self::derive(paid_amount, payable))
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown payment status: {}", s))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub invoice_code: String,
    pub appointment_id: Option<i64>,
    pub patient_id: i64,
    pub total_amount: Decimal,
    pub discount: Decimal,
    pub paid_amount: Decimal,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<String>,
    pub services: Vec<serde_json::Value>,
    pub notes: Option<String>,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn payable(&self) -> Decimal {
        self.total_amount - self.discount
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceDetails {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub patient_name: Option<String>,
    pub patient_phone: Option<String>,
    pub appointment_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsuranceClaim {
    pub id: i64,
    pub invoice_id: Option<i64>,
    pub patient_id: i64,
    pub insurance_number: Option<String>,
    pub claim_amount: Decimal,
    pub approved_amount: Option<Decimal>,
    pub status: String,
    pub submitted_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub patient_name: Option<String>,
    pub invoice_code: Option<String>,
}

/// Inclusive whole-day bounds on a creation timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date <= end)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.contains_date(at.date_naive())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RevenueSummary {
    pub total_invoices: i64,
    pub gross_revenue: Decimal,
    pub total_discount: Decimal,
    pub net_revenue: Decimal,
    pub total_paid: Decimal,
    pub total_outstanding: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusBreakdown {
    pub payment_status: PaymentStatus,
    pub count: i64,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RevenueStats {
    pub summary: RevenueSummary,
    pub by_status: Vec<StatusBreakdown>,
}

impl RevenueStats {
    /// Aggregates invoices already filtered to the requested range.
    pub fn from_invoices<'a>(invoices: impl IntoIterator<Item = &'a Invoice>) -> Self {
        let mut summary = RevenueSummary::default();
        let mut by_status: Vec<StatusBreakdown> = Vec::new();

        for invoice in invoices {
            summary.total_invoices += 1;
            summary.gross_revenue += invoice.total_amount;
            summary.total_discount += invoice.discount;
            summary.total_paid += invoice.paid_amount;

            match by_status
                .iter_mut()
                .find(|entry| entry.payment_status == invoice.payment_status)
            {
                Some(entry) => {
                    entry.count += 1;
                    entry.amount += invoice.payable();
                }
                None => by_status.push(StatusBreakdown {
                    payment_status: invoice.payment_status,
                    count: 1,
                    amount: invoice.payable(),
                }),
            }
        }

        summary.net_revenue = summary.gross_revenue - summary.total_discount;
        summary.total_outstanding = summary.net_revenue - summary.total_paid;
        by_status.sort_by_key(|entry| entry.payment_status.as_str());

        Self { summary, by_status }
    }
}
