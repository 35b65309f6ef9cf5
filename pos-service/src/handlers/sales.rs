use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, NaiveTime, Utc};
use mongodb::bson::DateTime;
use service_core::error::AppError;

use crate::{
    dtos::sales::{CreateSaleRequest, CreateSaleResponse, SaleResponse, SalesQuery},
    middleware::TenantContext,
    services::SaleFilter,
    utils::ValidatedJson,
    AppState,
};

/// Record a sale and decrement stock in one transaction.
pub async fn create_sale(
    State(state): State<AppState>,
    TenantContext(scope): TenantContext,
    ValidatedJson(req): ValidatedJson<CreateSaleRequest>,
) -> Result<(StatusCode, Json<CreateSaleResponse>), AppError> {
    let sale = state.sales.create_sale(&scope, req.into()).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateSaleResponse {
            message: "Sale created successfully".to_string(),
            sale: sale.into(),
        }),
    ))
}

pub async fn list_sales(
    State(state): State<AppState>,
    TenantContext(scope): TenantContext,
    Query(query): Query<SalesQuery>,
) -> Result<Json<Vec<SaleResponse>>, AppError> {
    let filter = SaleFilter {
        start: query
            .start_date
            .as_deref()
            .map(|v| parse_bound(v, Bound::Start))
            .transpose()?,
        end: query
            .end_date
            .as_deref()
            .map(|v| parse_bound(v, Bound::End))
            .transpose()?,
        limit: query.limit,
    };

    let sales = state.sales.list(&scope, filter).await?;
    Ok(Json(sales.into_iter().map(Into::into).collect()))
}

pub async fn get_sale(
    State(state): State<AppState>,
    TenantContext(scope): TenantContext,
    Path(id): Path<String>,
) -> Result<Json<SaleResponse>, AppError> {
    let sale = state.sales.get(&scope, &id).await?;
    Ok(Json(sale.into()))
}

#[derive(Debug, Clone, Copy)]
enum Bound {
    Start,
    End,
}

/// RFC 3339 timestamps are taken as is. A bare date covers the whole UTC day.
fn parse_bound(value: &str, bound: Bound) -> Result<DateTime, AppError> {
    let value = value.trim();
    if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(value) {
        return Ok(DateTime::from_chrono(ts.with_timezone(&Utc)));
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        AppError::BadRequest(anyhow::anyhow!(
            "Invalid date '{}': expected YYYY-MM-DD or an RFC 3339 timestamp",
            value
        ))
    })?;
    let time = match bound {
        Bound::Start => NaiveTime::MIN,
        Bound::End => NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN),
    };
    Ok(DateTime::from_chrono(date.and_time(time).and_utc()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_dates_span_the_whole_day() {
        let start = parse_bound("2026-03-01", Bound::Start).unwrap();
        let end = parse_bound("2026-03-01", Bound::End).unwrap();
        assert_eq!(start.to_chrono().to_rfc3339(), "2026-03-01T00:00:00+00:00");
        assert_eq!(
            end.timestamp_millis() - start.timestamp_millis(),
            24 * 60 * 60 * 1000 - 1
        );
    }

    #[test]
    fn timestamps_keep_their_offset() {
        let ts = parse_bound("2026-03-01T10:00:00+02:00", Bound::End).unwrap();
        assert_eq!(ts.to_chrono().to_rfc3339(), "2026-03-01T08:00:00+00:00");
        assert!(parse_bound("yesterday", Bound::Start).is_err());
    }
}
