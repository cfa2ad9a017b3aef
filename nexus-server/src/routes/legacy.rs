//! Legacy unversioned routes (spec §4.1): the same handlers as `/v1/**`,
//! mounted at the root path, carrying `Deprecation`/`Sunset`/`Link`
//! headers so old integrations keep working while pointed at `/v1/docs`.

use axum::http::{HeaderValue, header};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::state::AppState;

/// RFC1123 sunset date a year out from this route surface's introduction.
const SUNSET: &str = "Fri, 01 Jan 2027 00:00:00 GMT";

pub fn router() -> Router<AppState> {
    super::versioned_router()
        .layer(SetResponseHeaderLayer::overriding(header::HeaderName::from_static("deprecation"), HeaderValue::from_static("true")))
        .layer(SetResponseHeaderLayer::overriding(header::HeaderName::from_static("sunset"), HeaderValue::from_static(SUNSET)))
        .layer(SetResponseHeaderLayer::overriding(
            header::LINK,
            HeaderValue::from_static("</v1/docs>; rel=\"successor-version\""),
        ))
}
