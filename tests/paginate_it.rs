#![cfg(feature = "reqwest")]

mod common;

// crates.io
use httpmock::prelude::*;
// self
use common::{LOGIN_PATH, build_gateway, session_body};
use restgate::{error::Error, gateway::ListRequest};

fn page_body(start: u64, len: u64, count: u64) -> String {
	let items: Vec<_> = (start..start + len).map(|id| format!("{{\"id\":{id}}}")).collect();

	format!("{{\"items\":[{}],\"paging\":{{\"count\":{count}}}}}", items.join(","))
}

async fn mock_login(server: &MockServer) {
	server
		.mock_async(|when, then| {
			when.method(POST).path(LOGIN_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body(session_body("login-tok"));
		})
		.await;
}

#[tokio::test]
async fn listing_of_2500_items_drains_three_pages_in_order() {
	let server = MockServer::start_async().await;

	mock_login(&server).await;

	let mut pages = Vec::new();

	for (offset, len) in [(0_u64, 1_000_u64), (1_000, 1_000), (2_000, 500)] {
		pages.push(
			server
				.mock_async(|when, then| {
					when.method(GET)
						.path("/objects/networks")
						.query_param("limit", "1000")
						.query_param("offset", offset.to_string());
					then.status(200)
						.header("content-type", "application/json")
						.body(page_body(offset, len, 2_500));
				})
				.await,
		);
	}

	let gateway = build_gateway(&server);
	let items = gateway
		.fetch_all(ListRequest::new("/objects/networks").with_param("expanded", "true"))
		.await
		.expect("Three-page listing should drain cleanly.");

	assert_eq!(items.len(), 2_500);

	for (expected, item) in items.iter().enumerate() {
		assert_eq!(
			item.get("id").and_then(|id| id.as_u64()),
			Some(expected as u64),
			"Items must preserve page-concatenation order.",
		);
	}

	for page in pages {
		page.assert_async().await;
	}
}

#[tokio::test]
async fn empty_listing_returns_no_items() {
	let server = MockServer::start_async().await;

	mock_login(&server).await;

	let listing = server
		.mock_async(|when, then| {
			when.method(GET).path("/objects/networks");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"items\":[],\"paging\":{\"count\":0}}");
		})
		.await;
	let gateway = build_gateway(&server);
	let items = gateway
		.fetch_all(ListRequest::new("/objects/networks"))
		.await
		.expect("An empty listing should succeed.");

	assert!(items.is_empty());

	listing.assert_async().await;
}

#[tokio::test]
async fn inconsistent_count_trips_the_safety_cap() {
	let server = MockServer::start_async().await;

	mock_login(&server).await;

	// The backend claims zero total items while still serving a non-empty page.
	let listing = server
		.mock_async(|when, then| {
			when.method(GET).path("/objects/networks");
			then.status(200)
				.header("content-type", "application/json")
				.body(page_body(0, 3, 0));
		})
		.await;
	let gateway = build_gateway(&server);
	let err = gateway
		.fetch_all(ListRequest::new("/objects/networks"))
		.await
		.expect_err("Inconsistent paging metadata must abort the fetch.");

	assert!(matches!(err, Error::DataIntegrity { .. }));

	listing.assert_async().await;
}

#[tokio::test]
async fn absent_count_drains_until_an_empty_page() {
	let server = MockServer::start_async().await;

	mock_login(&server).await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/deployment/devices").query_param("offset", "0");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"items\":[{\"id\":0},{\"id\":1}]}");
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/deployment/devices").query_param("offset", "2");
			then.status(200).header("content-type", "application/json").body("{\"items\":[]}");
		})
		.await;

	let gateway = build_gateway(&server);
	let items = gateway
		.fetch_all(ListRequest::new("/deployment/devices").with_page_size(2))
		.await
		.expect("A count-less listing should drain to the empty page.");

	assert_eq!(items.len(), 2);
}
