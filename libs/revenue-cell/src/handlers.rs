use axum::extract::{Extension, Path, State};

use shared_models::auth::{AuthUser, Capability};
use shared_models::billing::{InsuranceClaim, Invoice, InvoiceDetails, RevenueStats};
use shared_models::error::AppError;
use shared_models::response::{ApiResponse, Page};
use shared_utils::validation::{ApiQuery, ValidatedJson};
use shared_utils::AppState;

use crate::models::{
    ClaimListQuery, CreateInvoiceRequest, InvoiceListQuery, PaymentRequest, StatsQuery,
};
use crate::services::BillingService;

#[axum::debug_handler]
pub async fn list_invoices(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiQuery(query): ApiQuery<InvoiceListQuery>,
) -> Result<ApiResponse<Page<InvoiceDetails>>, AppError> {
    user.require(Capability::ManageInvoices)?;

    let invoices = BillingService::new(&state).list_invoices(query).await?;
    Ok(ApiResponse::ok("Invoices retrieved successfully", invoices))
}

#[axum::debug_handler]
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<i64>,
) -> Result<ApiResponse<InvoiceDetails>, AppError> {
    let invoice = BillingService::new(&state).get_invoice(invoice_id).await?;
    Ok(ApiResponse::ok("Invoice retrieved successfully", invoice))
}

#[axum::debug_handler]
pub async fn create_invoice(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidatedJson(request): ValidatedJson<CreateInvoiceRequest>,
) -> Result<ApiResponse<Invoice>, AppError> {
    user.require(Capability::ManageInvoices)?;

    let invoice = BillingService::new(&state).create_invoice(request, user.id).await?;
    Ok(ApiResponse::created("Invoice created successfully", invoice))
}

#[axum::debug_handler]
pub async fn update_payment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(invoice_id): Path<i64>,
    ValidatedJson(request): ValidatedJson<PaymentRequest>,
) -> Result<ApiResponse<Invoice>, AppError> {
    user.require(Capability::ManageInvoices)?;

    let invoice = BillingService::new(&state).record_payment(invoice_id, request).await?;
    Ok(ApiResponse::ok("Payment updated successfully", invoice))
}

#[axum::debug_handler]
pub async fn revenue_stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiQuery(query): ApiQuery<StatsQuery>,
) -> Result<ApiResponse<RevenueStats>, AppError> {
    user.require(Capability::ViewRevenueReports)?;

    let stats = BillingService::new(&state).stats(query).await?;
    Ok(ApiResponse::ok("Revenue statistics retrieved successfully", stats))
}

#[axum::debug_handler]
pub async fn list_insurance_claims(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiQuery(query): ApiQuery<ClaimListQuery>,
) -> Result<ApiResponse<Page<InsuranceClaim>>, AppError> {
    user.require(Capability::ViewRevenueReports)?;

    let claims = BillingService::new(&state).insurance_claims(query).await?;
    Ok(ApiResponse::ok("Insurance claims retrieved successfully", claims))
}
