use axum::{extract::Request, http::header, middleware::Next, response::IntoResponse};

/// Paths that render HTML for a browser instead of returning JSON.
const HTML_PAGES: &[&str] = &["/api/subscription/payment-success"];

pub async fn security_headers_middleware(req: Request, next: Next) -> impl IntoResponse {
    let is_html_page = HTML_PAGES.contains(&req.uri().path());

    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        header::HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        header::STRICT_TRANSPORT_SECURITY,
        header::HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert(
        header::X_FRAME_OPTIONS,
        header::HeaderValue::from_static("DENY"),
    );

    if is_html_page {
        // Inline styles and the close-window button script only.
        headers.insert(
            header::CONTENT_SECURITY_POLICY,
            header::HeaderValue::from_static(
                "default-src 'none'; \
                 style-src 'unsafe-inline'; \
                 script-src 'unsafe-inline'; \
                 frame-ancestors 'none'",
            ),
        );
    } else {
        headers.insert(
            header::CONTENT_SECURITY_POLICY,
            header::HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
        );
    }

    response
}
