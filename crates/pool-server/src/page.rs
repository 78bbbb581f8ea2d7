//! Simulated Payment Page
//!
//! Public, unauthenticated. The payer lands on `/c/{id}` from the session's
//! `wave_launch_url` and picks an outcome; every action redirects back to the
//! merchant with `303 See Other`.

use axum::{
    extract::{Path, State},
    response::{Html, Redirect},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use pool_core::{
    CheckoutSession, CheckoutStatus, Clock, LastPaymentError, PaymentStatus, PoolError,
};

use crate::error::{ApiError, ApiResult};
use crate::extract::ApiForm;
use crate::state::AppState;

/// Fields posted by the payment page
#[derive(Debug, Default, Deserialize)]
pub struct PaymentForm {
    /// `success` or `failure`; only read by `/pay/{id}`
    pub outcome: Option<String>,

    /// Number the payer claims to pay from
    pub payer_mobile: Option<String>,
}

/// `GET /c/{id}` and `GET /pay/{id}`
pub async fn payment_page(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Html<String>> {
    let session = state.checkout.find_public(&id).await?;
    Ok(Html(render(&session, state.clock.now())))
}

/// `POST /c/{id}/succeed`
pub async fn simulate_success(
    State(state): State<AppState>,
    Path(id): Path<String>,
    form: Result<ApiForm<PaymentForm>, ApiError>,
) -> ApiResult<Redirect> {
    // The page's own button posts a form; a bare POST carries no payer
    let form = form.map(|ApiForm(form)| form).unwrap_or_default();
    succeed(&state, &id, form.payer_mobile.as_deref()).await
}

/// `POST /c/{id}/fail`
pub async fn simulate_failure(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Redirect> {
    fail(&state, &id).await
}

/// `POST /pay/{id}` with `outcome=success|failure`
pub async fn pay(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiForm(form): ApiForm<PaymentForm>,
) -> ApiResult<Redirect> {
    match form.outcome.as_deref() {
        Some("success") => succeed(&state, &id, form.payer_mobile.as_deref()).await,
        Some("failure") => fail(&state, &id).await,
        _ => Err(PoolError::Validation("outcome must be 'success' or 'failure'".into()).into()),
    }
}

async fn succeed(state: &AppState, id: &str, payer_mobile: Option<&str>) -> ApiResult<Redirect> {
    let payer_mobile = payer_mobile.map(str::trim).filter(|m| !m.is_empty());
    let session = state.checkout.mark_succeeded(id, payer_mobile).await?;
    // A payer mismatch settles as a failure
    let target = if session.payment_status == PaymentStatus::Succeeded {
        &session.success_url
    } else {
        &session.error_url
    };
    Ok(Redirect::to(target))
}

async fn fail(state: &AppState, id: &str) -> ApiResult<Redirect> {
    let session = state
        .checkout
        .mark_failed(id, LastPaymentError::simulated())
        .await?;
    Ok(Redirect::to(&session.error_url))
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn render(session: &CheckoutSession, now: DateTime<Utc>) -> String {
    let id = escape(session.id.as_str());
    let mut body = format!(
        "<h1>{}</h1><p class=\"amount\">{} {}</p>",
        escape(&session.business_name),
        escape(&session.amount),
        escape(&session.currency),
    );

    if session.ensure_payable(now).is_ok() {
        if let Some(mobile) = &session.restrict_payer_mobile {
            body.push_str(&format!("<p>Payment must come from {}</p>", escape(mobile)));
        }
        body.push_str(&format!(
            "<form method=\"post\" action=\"/c/{id}/succeed\">\
             <input type=\"tel\" name=\"payer_mobile\" placeholder=\"+221…\">\
             <button type=\"submit\">Pay</button></form>\
             <form method=\"post\" action=\"/c/{id}/fail\">\
             <button type=\"submit\">Simulate failure</button></form>"
        ));
    } else if session.checkout_status == CheckoutStatus::Open {
        // Overdue but not swept yet
        body.push_str("<p>This checkout session has expired.</p>");
    } else {
        body.push_str(&format!(
            "<p>This checkout session is {} (payment {}).</p>",
            session.checkout_status.as_str(),
            session.payment_status.as_str(),
        ));
    }

    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\">\
         <title>Wave checkout</title></head><body>{body}</body></html>"
    )
}
