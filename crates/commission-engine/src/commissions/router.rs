use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::collection::{CollectionTarget, StatusChange};
use super::configuration::CommissionConfig;
use super::domain::{
    Actor, DevelopmentId, DistributionId, PartnerCommissionId, PartnerShare, ProductId, RoleType,
    SaleId, SaleInput, UserId,
};
use super::error::CommissionError;
use super::ledger::AdjustmentRequest;
use super::repository::{
    CommissionRepository, PartnerCommissionFilter, PartnerDirectory, RepositoryError, SaleFilter,
};
use super::service::CommissionService;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Router builder exposing the commission engine over HTTP.
pub fn commission_router<R, P>(service: Arc<CommissionService<R, P>>) -> Router
where
    R: CommissionRepository + 'static,
    P: PartnerDirectory + 'static,
{
    Router::new()
        .route(
            "/api/v1/commissions/sales",
            get(list_sales_handler::<R, P>).post(upsert_sale_handler::<R, P>),
        )
        .route(
            "/api/v1/commissions/sales/:sale_id",
            get(sale_detail_handler::<R, P>),
        )
        .route(
            "/api/v1/commissions/sales/:sale_id/calculate",
            post(calculate_sale_handler::<R, P>),
        )
        .route(
            "/api/v1/commissions/sales/:sale_id/reconciliation",
            get(reconciliation_handler::<R, P>),
        )
        .route(
            "/api/v1/commissions/calculate",
            post(calculate_batch_handler::<R, P>),
        )
        .route(
            "/api/v1/commissions/partner-commissions",
            get(partner_commissions_handler::<R, P>),
        )
        .route(
            "/api/v1/commissions/partner-commissions/:id",
            patch(partner_collection_handler::<R, P>),
        )
        .route(
            "/api/v1/commissions/product-partners",
            get(product_partners_handler::<R, P>),
        )
        .route(
            "/api/v1/commissions/products/:product_id/partners",
            put(load_partners_handler::<R, P>),
        )
        .route(
            "/api/v1/commissions/distributions/:id/adjustments",
            get(adjustments_handler::<R, P>).post(adjust_handler::<R, P>),
        )
        .route(
            "/api/v1/commissions/distributions/:id/collection-status",
            patch(distribution_collection_handler::<R, P>),
        )
        .route(
            "/api/v1/commissions/config/default",
            get(default_config_handler::<R, P>).put(put_default_config_handler::<R, P>),
        )
        .route(
            "/api/v1/commissions/config/developments/:development",
            get(development_config_handler::<R, P>)
                .put(put_development_config_handler::<R, P>),
        )
        .route(
            "/api/v1/commissions/config/effective/:development",
            get(effective_config_handler::<R, P>),
        )
        .route(
            "/api/v1/commissions/global-config",
            get(global_overrides_handler::<R, P>).put(put_global_overrides_handler::<R, P>),
        )
        .route(
            "/api/v1/commissions/global-config/:role",
            get(global_override_handler::<R, P>).put(put_global_override_handler::<R, P>),
        )
        .with_state(service)
}

pub fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    let payload = json!({
        "error": message.into(),
    });
    (status, Json(payload)).into_response()
}

impl IntoResponse for CommissionError {
    fn into_response(self) -> Response {
        let status = match &self {
            CommissionError::Validation(_) => StatusCode::BAD_REQUEST,
            CommissionError::NotFound { .. } => StatusCode::NOT_FOUND,
            CommissionError::InvalidTransition { .. } | CommissionError::Conflict(_) => {
                StatusCode::CONFLICT
            }
            CommissionError::ConfigNotFound { .. }
            | CommissionError::InvalidConfig(_)
            | CommissionError::DistributionImbalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            CommissionError::Repository(RepositoryError::Unavailable(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CommissionError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %self, "commission request failed");
        }
        error_body(status, self.to_string())
    }
}

fn respond<T: serde::Serialize>(status: StatusCode, result: Result<T, CommissionError>) -> Response {
    match result {
        Ok(value) => (status, Json(value)).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Reads the acting user from the headers set by the auth layer.
pub(crate) fn actor_from_headers<R, P>(
    headers: &HeaderMap,
    service: &CommissionService<R, P>,
) -> Result<Actor, Response>
where
    R: CommissionRepository + 'static,
    P: PartnerDirectory + 'static,
{
    let user_id = headers
        .get(ACTOR_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            error_body(
                StatusCode::BAD_REQUEST,
                format!("{ACTOR_ID_HEADER} header is required"),
            )
        })?;

    let role = match headers.get(ACTOR_ROLE_HEADER) {
        Some(value) => {
            let role = value.to_str().map(str::trim).unwrap_or_default();
            if !service.settings().allows_role(role) {
                return Err(error_body(
                    StatusCode::FORBIDDEN,
                    format!("role '{role}' may not modify commissions"),
                ));
            }
            Some(role.to_string())
        }
        None => None,
    };

    Ok(Actor {
        user_id: UserId(user_id.to_string()),
        role,
    })
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SalesQuery {
    desarrollo: Option<DevelopmentId>,
    propietario_deal: Option<UserId>,
    fecha_firma_from: Option<NaiveDate>,
    fecha_firma_to: Option<NaiveDate>,
    commission_calculated: Option<bool>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl SalesQuery {
    fn filter(&self) -> SaleFilter {
        SaleFilter {
            desarrollo: self.desarrollo.clone(),
            propietario_deal: self.propietario_deal.clone(),
            fecha_firma_from: self.fecha_firma_from,
            fecha_firma_to: self.fecha_firma_to,
            commission_calculated: self.commission_calculated,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct BatchRequest {
    #[serde(flatten)]
    filter: SaleFilter,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    offset: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ProductPartnersQuery {
    sale_id: Option<u64>,
    sale_ids: Option<String>,
}

impl ProductPartnersQuery {
    fn sale_ids(&self) -> Result<Vec<SaleId>, CommissionError> {
        let mut ids: Vec<SaleId> = self.sale_id.map(SaleId).into_iter().collect();
        if let Some(raw) = &self.sale_ids {
            for part in raw.split(',').map(str::trim).filter(|part| !part.is_empty()) {
                let id = part.parse::<u64>().map_err(|_| {
                    CommissionError::validation(format!("'{part}' is not a valid sale id"))
                })?;
                if !ids.contains(&SaleId(id)) {
                    ids.push(SaleId(id));
                }
            }
        }
        Ok(ids)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct OverrideEntry {
    role: RoleType,
    percent: Decimal,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OverridePercent {
    percent: Decimal,
}

pub(crate) async fn list_sales_handler<R, P>(
    State(service): State<Arc<CommissionService<R, P>>>,
    Query(query): Query<SalesQuery>,
) -> Response
where
    R: CommissionRepository + 'static,
    P: PartnerDirectory + 'static,
{
    respond(
        StatusCode::OK,
        service.list_sales(&query.filter(), query.limit, query.offset),
    )
}

pub(crate) async fn upsert_sale_handler<R, P>(
    State(service): State<Arc<CommissionService<R, P>>>,
    headers: HeaderMap,
    Json(input): Json<SaleInput>,
) -> Response
where
    R: CommissionRepository + 'static,
    P: PartnerDirectory + 'static,
{
    if let Err(response) = actor_from_headers(&headers, &service) {
        return response;
    }
    match service.upsert_sale(input) {
        Ok(outcome) if outcome.created => (StatusCode::CREATED, Json(outcome)).into_response(),
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn sale_detail_handler<R, P>(
    State(service): State<Arc<CommissionService<R, P>>>,
    Path(sale_id): Path<u64>,
) -> Response
where
    R: CommissionRepository + 'static,
    P: PartnerDirectory + 'static,
{
    respond(StatusCode::OK, service.sale_detail(SaleId(sale_id)))
}

pub(crate) async fn calculate_sale_handler<R, P>(
    State(service): State<Arc<CommissionService<R, P>>>,
    Path(sale_id): Path<u64>,
    headers: HeaderMap,
) -> Response
where
    R: CommissionRepository + 'static,
    P: PartnerDirectory + 'static,
{
    if let Err(response) = actor_from_headers(&headers, &service) {
        return response;
    }
    respond(StatusCode::OK, service.ensure_calculated(SaleId(sale_id)))
}

pub(crate) async fn reconciliation_handler<R, P>(
    State(service): State<Arc<CommissionService<R, P>>>,
    Path(sale_id): Path<u64>,
) -> Response
where
    R: CommissionRepository + 'static,
    P: PartnerDirectory + 'static,
{
    respond(StatusCode::OK, service.reconciliation(SaleId(sale_id)))
}

pub(crate) async fn calculate_batch_handler<R, P>(
    State(service): State<Arc<CommissionService<R, P>>>,
    headers: HeaderMap,
    Json(request): Json<BatchRequest>,
) -> Response
where
    R: CommissionRepository + 'static,
    P: PartnerDirectory + 'static,
{
    if let Err(response) = actor_from_headers(&headers, &service) {
        return response;
    }
    respond(
        StatusCode::OK,
        service.calculate_batch(&request.filter, request.limit, request.offset),
    )
}

pub(crate) async fn partner_commissions_handler<R, P>(
    State(service): State<Arc<CommissionService<R, P>>>,
    Query(filter): Query<PartnerCommissionFilter>,
) -> Response
where
    R: CommissionRepository + 'static,
    P: PartnerDirectory + 'static,
{
    respond(StatusCode::OK, service.partner_commissions(&filter))
}

pub(crate) async fn partner_collection_handler<R, P>(
    State(service): State<Arc<CommissionService<R, P>>>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    Json(change): Json<StatusChange>,
) -> Response
where
    R: CommissionRepository + 'static,
    P: PartnerDirectory + 'static,
{
    let actor = match actor_from_headers(&headers, &service) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.set_collection_status(
            CollectionTarget::PartnerCommission(PartnerCommissionId(id)),
            change,
            &actor,
        ),
    )
}

pub(crate) async fn product_partners_handler<R, P>(
    State(service): State<Arc<CommissionService<R, P>>>,
    Query(query): Query<ProductPartnersQuery>,
) -> Response
where
    R: CommissionRepository + 'static,
    P: PartnerDirectory + 'static,
{
    let result = query
        .sale_ids()
        .and_then(|ids| service.product_partners(&ids));
    respond(StatusCode::OK, result)
}

pub(crate) async fn load_partners_handler<R, P>(
    State(service): State<Arc<CommissionService<R, P>>>,
    Path(product_id): Path<String>,
    headers: HeaderMap,
    Json(shares): Json<Vec<PartnerShare>>,
) -> Response
where
    R: CommissionRepository + 'static,
    P: PartnerDirectory + 'static,
{
    if let Err(response) = actor_from_headers(&headers, &service) {
        return response;
    }
    respond(
        StatusCode::OK,
        service.load_product_partners(&ProductId(product_id), shares),
    )
}

pub(crate) async fn adjustments_handler<R, P>(
    State(service): State<Arc<CommissionService<R, P>>>,
    Path(id): Path<u64>,
) -> Response
where
    R: CommissionRepository + 'static,
    P: PartnerDirectory + 'static,
{
    respond(StatusCode::OK, service.adjustments(DistributionId(id)))
}

pub(crate) async fn adjust_handler<R, P>(
    State(service): State<Arc<CommissionService<R, P>>>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    Json(request): Json<AdjustmentRequest>,
) -> Response
where
    R: CommissionRepository + 'static,
    P: PartnerDirectory + 'static,
{
    let actor = match actor_from_headers(&headers, &service) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::CREATED,
        service.adjust(DistributionId(id), request, &actor),
    )
}

pub(crate) async fn distribution_collection_handler<R, P>(
    State(service): State<Arc<CommissionService<R, P>>>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    Json(change): Json<StatusChange>,
) -> Response
where
    R: CommissionRepository + 'static,
    P: PartnerDirectory + 'static,
{
    let actor = match actor_from_headers(&headers, &service) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.set_collection_status(
            CollectionTarget::Distribution(DistributionId(id)),
            change,
            &actor,
        ),
    )
}

pub(crate) async fn default_config_handler<R, P>(
    State(service): State<Arc<CommissionService<R, P>>>,
) -> Response
where
    R: CommissionRepository + 'static,
    P: PartnerDirectory + 'static,
{
    respond(StatusCode::OK, service.default_config())
}

pub(crate) async fn put_default_config_handler<R, P>(
    State(service): State<Arc<CommissionService<R, P>>>,
    headers: HeaderMap,
    Json(mut config): Json<CommissionConfig>,
) -> Response
where
    R: CommissionRepository + 'static,
    P: PartnerDirectory + 'static,
{
    let actor = match actor_from_headers(&headers, &service) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    if config.development.is_some() {
        return error_body(
            StatusCode::BAD_REQUEST,
            "the default configuration cannot name a development",
        );
    }
    config.development = None;
    respond(StatusCode::OK, service.upsert_config(config, &actor))
}

pub(crate) async fn development_config_handler<R, P>(
    State(service): State<Arc<CommissionService<R, P>>>,
    Path(development): Path<String>,
) -> Response
where
    R: CommissionRepository + 'static,
    P: PartnerDirectory + 'static,
{
    respond(
        StatusCode::OK,
        service.development_config(&DevelopmentId(development)),
    )
}

pub(crate) async fn put_development_config_handler<R, P>(
    State(service): State<Arc<CommissionService<R, P>>>,
    Path(development): Path<String>,
    headers: HeaderMap,
    Json(mut config): Json<CommissionConfig>,
) -> Response
where
    R: CommissionRepository + 'static,
    P: PartnerDirectory + 'static,
{
    let actor = match actor_from_headers(&headers, &service) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let development = DevelopmentId(development);
    if let Some(named) = &config.development {
        if named != &development {
            return error_body(
                StatusCode::BAD_REQUEST,
                format!("body names development {named} but the path names {development}"),
            );
        }
    }
    config.development = Some(development);
    respond(StatusCode::OK, service.upsert_config(config, &actor))
}

pub(crate) async fn effective_config_handler<R, P>(
    State(service): State<Arc<CommissionService<R, P>>>,
    Path(development): Path<String>,
) -> Response
where
    R: CommissionRepository + 'static,
    P: PartnerDirectory + 'static,
{
    respond(
        StatusCode::OK,
        service.effective_config(&DevelopmentId(development)),
    )
}

pub(crate) async fn global_overrides_handler<R, P>(
    State(service): State<Arc<CommissionService<R, P>>>,
) -> Response
where
    R: CommissionRepository + 'static,
    P: PartnerDirectory + 'static,
{
    respond(StatusCode::OK, service.global_overrides())
}

pub(crate) async fn put_global_overrides_handler<R, P>(
    State(service): State<Arc<CommissionService<R, P>>>,
    headers: HeaderMap,
    Json(entries): Json<Vec<OverrideEntry>>,
) -> Response
where
    R: CommissionRepository + 'static,
    P: PartnerDirectory + 'static,
{
    let actor = match actor_from_headers(&headers, &service) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let entries = entries
        .into_iter()
        .map(|entry| (entry.role, entry.percent))
        .collect();
    respond(StatusCode::OK, service.set_global_overrides(entries, &actor))
}

pub(crate) async fn global_override_handler<R, P>(
    State(service): State<Arc<CommissionService<R, P>>>,
    Path(role): Path<RoleType>,
) -> Response
where
    R: CommissionRepository + 'static,
    P: PartnerDirectory + 'static,
{
    respond(StatusCode::OK, service.global_override(role))
}

pub(crate) async fn put_global_override_handler<R, P>(
    State(service): State<Arc<CommissionService<R, P>>>,
    Path(role): Path<RoleType>,
    headers: HeaderMap,
    Json(body): Json<OverridePercent>,
) -> Response
where
    R: CommissionRepository + 'static,
    P: PartnerDirectory + 'static,
{
    let actor = match actor_from_headers(&headers, &service) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.set_global_override(role, body.percent, &actor),
    )
}
