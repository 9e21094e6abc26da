mod delivery;
mod error;
mod receiver;

use delivery_tunnel_instruments::{report_operation, MetricsAggregator, OperationRecord};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

pub use delivery::{
    CreateDestination, DeliveryApiClient, Destination, DestinationConfig, EventRecord,
    PublishRequest, PublishResponse,
};
pub use error::{ApiError, ApiResult};
pub use receiver::{ReceivedEvent, ReceiverClient};

/// Send a request and record its duration and whether it failed.
///
/// A request fails when it could not be sent or when `expected` rejects the response status.
pub(crate) async fn send_instrumented(
    metrics: &MetricsAggregator,
    operation_id: &'static str,
    request: RequestBuilder,
    expected: impl Fn(StatusCode) -> bool,
) -> ApiResult<Response> {
    let record = OperationRecord::new(operation_id);
    let response = request.send().await;

    let is_error = match &response {
        Ok(response) => !expected(response.status()),
        Err(_) => true,
    };
    let record = match &response {
        Ok(response) => record.with_attr("status", response.status().as_u16()),
        Err(e) => {
            log::debug!("Request {operation_id} could not be sent: {e}");
            record
        }
    };
    report_operation(metrics, record, is_error);

    Ok(response?)
}

pub(crate) async fn decode<T: DeserializeOwned>(
    operation: &'static str,
    response: Response,
) -> ApiResult<T> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|source| ApiError::Decode { operation, source })
}

/// Append path segments to a base URL, percent-encoding each one.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> ApiResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| ApiError::InvalidBaseUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_encoded_segments() {
        let base = Url::parse("http://localhost:3333/").unwrap();
        let url = endpoint(&base, &["api", "v1", "tenant one", "events"]).unwrap();
        assert_eq!("http://localhost:3333/api/v1/tenant%20one/events", url.as_str());

        let nested = Url::parse("http://localhost:3333/outpost").unwrap();
        let url = endpoint(&nested, &["events", "event-1"]).unwrap();
        assert_eq!("http://localhost:3333/outpost/events/event-1", url.as_str());
    }
}
