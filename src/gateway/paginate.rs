//! Transparent pagination over offset/limit listing endpoints.
//!
//! The backend serves listings in pages of at most 1000 items with an `offset`/`limit` query
//! contract and a `paging.count` total that may be absent, malformed, or inconsistent with
//! the items actually returned. [`Gateway::fetch_all`] drains every page sequentially into
//! one ordered collection, trusting the reported count only while it stays ahead of the data
//! served and bounding the loop with a safety cap so bad metadata can never spin it forever.
//! Duplicate or missing items across page boundaries are a backend property (its offset
//! semantics shifting mid-iteration) and are not corrected here.

// self
use crate::{
	_prelude::*,
	gateway::{Gateway, decode_json},
	http::{ApiTransport, Method},
	obs::{self, CallKind, CallOutcome, CallSpan},
};

/// Default page size requested from listing endpoints.
pub const DEFAULT_PAGE_SIZE: u32 = 1_000;
/// Hard ceiling on page fetches for endpoints that never report a usable total count.
const HARD_PAGE_CEILING: u64 = 10_000;

/// Parameters for draining one paginated listing endpoint.
#[derive(Clone, Debug)]
pub struct ListRequest {
	/// Endpoint path the pages are fetched from.
	pub endpoint: String,
	/// Extra query parameters appended to every page request.
	pub params: Vec<(String, String)>,
	/// Page size; defaults to [`DEFAULT_PAGE_SIZE`].
	pub page_size: u32,
}
impl ListRequest {
	/// Creates a request for the provided endpoint with the default page size.
	pub fn new(endpoint: impl Into<String>) -> Self {
		Self { endpoint: endpoint.into(), params: Vec::new(), page_size: DEFAULT_PAGE_SIZE }
	}

	/// Appends a query parameter sent with every page request.
	pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.params.push((key.into(), value.into()));

		self
	}

	/// Overrides the page size (clamped to at least 1).
	pub fn with_page_size(mut self, page_size: u32) -> Self {
		self.page_size = page_size.max(1);

		self
	}
}

#[derive(Debug, Deserialize)]
struct ListPage {
	#[serde(default)]
	items: Vec<serde_json::Value>,
	#[serde(default)]
	paging: Paging,
}
#[derive(Debug, Default, Deserialize)]
struct Paging {
	count: Option<serde_json::Value>,
}
impl Paging {
	/// A malformed count is treated as absent rather than failing the fetch.
	fn count(&self) -> Option<u64> {
		self.count.as_ref().and_then(serde_json::Value::as_u64)
	}
}

impl<T> Gateway<T>
where
	T: ?Sized + ApiTransport,
{
	/// Drains every page of a listing endpoint into one ordered collection.
	///
	/// Pages are fetched strictly sequentially and concatenated in server order. The loop
	/// stops on the first empty page, or once the server-reported count confirms completion;
	/// if the metadata is inconsistent the safety cap converts the runaway into
	/// [`Error::DataIntegrity`] instead of silently truncating or spinning.
	pub async fn fetch_all(&self, request: ListRequest) -> Result<Vec<serde_json::Value>> {
		const KIND: CallKind = CallKind::Paginate;

		let span = CallSpan::new(KIND, "fetch_all");

		obs::record_call_outcome(KIND, CallOutcome::Attempt);

		let result = span.instrument(self.drain_pages(&request)).await;

		match &result {
			Ok(_) => obs::record_call_outcome(KIND, CallOutcome::Success),
			Err(_) => obs::record_call_outcome(KIND, CallOutcome::Failure),
		}

		result
	}

	async fn drain_pages(&self, request: &ListRequest) -> Result<Vec<serde_json::Value>> {
		let page_size = u64::from(request.page_size);
		let mut items = Vec::new();
		let mut offset = 0_u64;
		let mut pages_fetched = 0_u64;
		let mut page_cap = HARD_PAGE_CEILING;

		loop {
			if pages_fetched >= page_cap {
				return Err(Error::DataIntegrity {
					reason: format!(
						"exceeded the {page_cap}-page safety cap at offset {offset}; \
						 the backend's paging metadata cannot be trusted"
					),
				});
			}

			let mut params = request.params.clone();

			params.push(("limit".into(), request.page_size.to_string()));
			params.push(("offset".into(), offset.to_string()));

			let response = self.call(Method::Get, &request.endpoint, &params).await?;
			let page: ListPage = decode_json(&response)?;

			if page.items.is_empty() {
				break;
			}

			items.extend(page.items);
			pages_fetched += 1;

			let previous_offset = offset;

			offset += page_size;

			if let Some(count) = page.paging.count() {
				page_cap = page_cap.min(count.div_ceil(page_size) + 1);

				// The count is only trusted for termination while it stays ahead of the data
				// actually served; a count at or below the offset of a non-empty page is
				// inconsistent and falls through to the safety cap instead.
				if count > previous_offset && offset >= count {
					break;
				}
			}
		}

		Ok(items)
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::{
		_preludet::{ScriptedTransport, session_payload},
		auth::Credentials,
		config::BackendDescriptor,
		http::RawResponse,
	};

	const FUTURE: &str = "2099-01-01T00:00:00Z";

	fn gateway() -> (Gateway<ScriptedTransport>, Arc<ScriptedTransport>) {
		let transport = Arc::new(ScriptedTransport::default());
		let descriptor = BackendDescriptor::builder(
			Url::parse("https://backend.test").expect("Base URL fixture should parse."),
		)
		.login_endpoint("/auth/login")
		.refresh_endpoint("/auth/refresh")
		.build()
		.expect("Descriptor fixture should build.");
		let credentials =
			Credentials::new("admin", "hunter2").expect("Credential fixture should be valid.");
		let gateway = Gateway::with_transport(descriptor, credentials, transport.clone());

		transport.push_response(session_payload("tok-1", FUTURE));

		(gateway, transport)
	}

	fn page(start: u64, len: u64, count: Option<u64>) -> RawResponse {
		let items: Vec<_> = (start..start + len).map(|id| json!({ "id": id })).collect();
		let body = match count {
			Some(count) => json!({ "items": items, "paging": { "count": count } }),
			None => json!({ "items": items }),
		};

		RawResponse::new(200, body.to_string().into_bytes())
	}

	fn query<'a>(request: &'a crate::http::ApiRequest, key: &str) -> &'a str {
		request
			.query
			.iter()
			.find(|(name, _)| name == key)
			.map(|(_, value)| value.as_str())
			.unwrap_or_default()
	}

	#[tokio::test]
	async fn drains_three_pages_in_order() {
		let (gateway, transport) = gateway();

		transport.push_response(page(0, 1_000, Some(2_500)));
		transport.push_response(page(1_000, 1_000, Some(2_500)));
		transport.push_response(page(2_000, 500, Some(2_500)));

		let items = gateway
			.fetch_all(ListRequest::new("/api/v1/object/networks"))
			.await
			.expect("Three-page listing should drain cleanly.");

		assert_eq!(items.len(), 2_500);
		assert!(
			items
				.iter()
				.enumerate()
				.all(|(expected, item)| item["id"].as_u64() == Some(expected as u64)),
			"Items must preserve page-concatenation order.",
		);

		let recorded = transport.recorded();

		// Login plus exactly three page fetches at offsets 0, 1000, 2000.
		assert_eq!(recorded.len(), 4);

		for (request, offset) in recorded[1..].iter().zip(["0", "1000", "2000"]) {
			assert_eq!(query(request, "offset"), offset);
			assert_eq!(query(request, "limit"), "1000");
		}
	}

	#[tokio::test]
	async fn empty_first_page_yields_no_items() {
		let (gateway, transport) = gateway();

		transport.push_response(page(0, 0, Some(0)));

		let items = gateway
			.fetch_all(ListRequest::new("/api/v1/object/networks"))
			.await
			.expect("An empty listing should succeed.");

		assert!(items.is_empty());
		assert_eq!(transport.recorded().len(), 2);
	}

	#[tokio::test]
	async fn zero_count_with_items_trips_the_safety_cap() {
		let (gateway, transport) = gateway();

		transport.push_response(page(0, 3, Some(0)));

		let err = gateway
			.fetch_all(ListRequest::new("/api/v1/object/networks"))
			.await
			.expect_err("A zero count alongside a non-empty page is inconsistent.");

		assert!(matches!(err, Error::DataIntegrity { .. }));
		assert_eq!(transport.recorded().len(), 2, "The cap must trip before another fetch.");
	}

	#[tokio::test]
	async fn absent_count_loops_until_an_empty_page() {
		let (gateway, transport) = gateway();

		transport.push_response(page(0, 2, None));
		transport.push_response(page(2, 1, None));
		transport.push_response(page(3, 0, None));

		let items = gateway
			.fetch_all(ListRequest::new("/api/v1/deployment/devices").with_page_size(2))
			.await
			.expect("Listings without counts should drain to the empty page.");

		assert_eq!(items.len(), 3);
		assert_eq!(transport.recorded().len(), 4);
	}

	#[tokio::test]
	async fn malformed_count_is_ignored() {
		let (gateway, transport) = gateway();

		transport.push_response(RawResponse::new(
			200,
			json!({ "items": [{ "id": 0 }], "paging": { "count": "many" } })
				.to_string()
				.into_bytes(),
		));
		transport.push_response(page(1, 0, None));

		let items = gateway
			.fetch_all(ListRequest::new("/api/v1/object/hosts"))
			.await
			.expect("A malformed count should degrade to count-less paging.");

		assert_eq!(items.len(), 1);
	}

	#[tokio::test]
	async fn extra_params_ride_on_every_page() {
		let (gateway, transport) = gateway();

		transport.push_response(page(0, 2, None));
		transport.push_response(page(2, 0, None));

		gateway
			.fetch_all(
				ListRequest::new("/api/v1/object/networks")
					.with_param("expanded", "true")
					.with_page_size(2),
			)
			.await
			.expect("Listing with extra params should drain cleanly.");

		for request in &transport.recorded()[1..] {
			assert_eq!(query(request, "expanded"), "true");
			assert_eq!(query(request, "limit"), "2");
		}
	}
}
