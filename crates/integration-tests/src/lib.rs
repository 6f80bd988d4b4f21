//! Integration tests for cartsync.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p cartsync-integration-tests
//! ```
//!
//! Tests run the real [`cartsync::HttpCartClient`] and engine against
//! [`FakeCartService`], an in-process `axum` server speaking the cart
//! service's REST shape. No external services are required.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use url::Url;

/// A catalog product known to the fake service.
#[derive(Debug, Clone)]
pub struct CatalogProduct {
    pub name: String,
    pub price: f64,
}

#[derive(Debug, Clone)]
struct Item {
    id: u64,
    product_id: i32,
    qty: i64,
}

#[derive(Default)]
struct ServiceState {
    token: String,
    catalog: HashMap<i32, CatalogProduct>,
    items: Vec<Item>,
    next_item_id: u64,
    fail_next: Vec<StatusCode>,
    requests: Vec<String>,
}

type Shared = Arc<Mutex<ServiceState>>;

/// In-process fake of the remote cart service.
///
/// Owns the catalog and its prices; every mutation answers with the full
/// cart, like the real service.
#[derive(Clone)]
pub struct FakeCartService {
    state: Shared,
    base_url: Url,
}

impl FakeCartService {
    /// Start the service on an ephemeral port, accepting `token`.
    pub async fn start(token: &str) -> Self {
        let state: Shared = Arc::new(Mutex::new(ServiceState {
            token: token.to_string(),
            next_item_id: 100,
            ..ServiceState::default()
        }));

        let app = Router::new()
            .route("/api/cart", get(get_cart))
            .route("/api/cart/add", post(add_to_cart))
            .route(
                "/api/cart/item/{id}",
                put(update_quantity).delete(remove_item),
            )
            .route("/api/cart/clear", delete(clear_cart))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            state,
            base_url: Url::parse(&format!("http://{addr}")).unwrap(),
        }
    }

    /// Base URL to hand to the client.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Add a product to the catalog.
    pub fn stock(&self, product_id: i32, name: &str, price: f64) {
        self.lock().catalog.insert(
            product_id,
            CatalogProduct {
                name: name.to_string(),
                price,
            },
        );
    }

    /// Put a line directly into the server cart.
    pub fn seed_line(&self, product_id: i32, qty: i64) {
        let mut state = self.lock();
        let id = state.next_item_id;
        state.next_item_id += 1;
        state.items.push(Item {
            id,
            product_id,
            qty,
        });
    }

    /// Fail the next request with `status`.
    pub fn fail_next(&self, status: StatusCode) {
        self.lock().fail_next.push(status);
    }

    /// `(product_id, qty)` pairs currently in the server cart.
    #[must_use]
    pub fn lines(&self) -> Vec<(i32, i64)> {
        self.lock()
            .items
            .iter()
            .map(|item| (item.product_id, item.qty))
            .collect()
    }

    /// `"METHOD path"` for every request received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        self.lock().requests.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap()
    }
}

// =============================================================================
// Handlers
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddBody {
    product_id: Option<i32>,
    #[serde(default = "one")]
    quantity: i64,
}

const fn one() -> i64 {
    1
}

#[derive(Deserialize)]
struct QuantityBody {
    quantity: i64,
}

fn message(status: StatusCode, text: &str) -> Response {
    (status, Json(json!({ "message": text }))).into_response()
}

/// Record the request, check the bearer token, and apply any injected failure.
fn admit<'a>(
    state: &'a Shared,
    headers: &HeaderMap,
    request: String,
) -> Result<MutexGuard<'a, ServiceState>, Response> {
    let mut guard = state.lock().unwrap();
    guard.requests.push(request);

    let expected = format!("Bearer {}", guard.token);
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == expected);
    if !authorized {
        return Err(message(StatusCode::UNAUTHORIZED, "Invalid token"));
    }

    if !guard.fail_next.is_empty() {
        let status = guard.fail_next.remove(0);
        return Err(message(status, "Injected failure"));
    }
    Ok(guard)
}

fn cart_body(state: &ServiceState) -> Response {
    let items: Vec<Value> = state
        .items
        .iter()
        .map(|item| {
            let product = state.catalog.get(&item.product_id);
            let price = product.map_or(0.0, |p| p.price);
            #[allow(clippy::cast_precision_loss)]
            let total = price * item.qty as f64;
            json!({
                "cartItemId": item.id,
                "product_id": item.product_id,
                "qty": item.qty,
                "unit_price": price,
                "total_amount": total,
                "id": item.product_id,
                "name": product.map(|p| p.name.clone()),
                "description": null,
                "sell_price": price,
                "stock": 50,
                "category_id": 1,
                "images": format!("[\"https://cdn.test/{}.jpg\"]", item.product_id),
            })
        })
        .collect();

    Json(json!({ "count": items.len(), "items": items })).into_response()
}

async fn get_cart(State(state): State<Shared>, headers: HeaderMap) -> Response {
    match admit(&state, &headers, "GET /api/cart".to_string()) {
        Ok(guard) => cart_body(&guard),
        Err(response) => response,
    }
}

async fn add_to_cart(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<AddBody>,
) -> Response {
    let mut guard = match admit(&state, &headers, "POST /api/cart/add".to_string()) {
        Ok(guard) => guard,
        Err(response) => return response,
    };

    let Some(product_id) = body.product_id else {
        return message(StatusCode::BAD_REQUEST, "Product ID is required");
    };
    if body.quantity < 1 {
        return message(StatusCode::BAD_REQUEST, "Quantity must be at least 1");
    }
    if !guard.catalog.contains_key(&product_id) {
        return message(StatusCode::NOT_FOUND, "Product not found");
    }

    if let Some(item) = guard.items.iter_mut().find(|i| i.product_id == product_id) {
        item.qty += body.quantity;
    } else {
        let id = guard.next_item_id;
        guard.next_item_id += 1;
        guard.items.push(Item {
            id,
            product_id,
            qty: body.quantity,
        });
    }
    cart_body(&guard)
}

async fn update_quantity(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(body): Json<QuantityBody>,
) -> Response {
    let mut guard = match admit(&state, &headers, format!("PUT /api/cart/item/{id}")) {
        Ok(guard) => guard,
        Err(response) => return response,
    };

    if body.quantity < 1 {
        return message(StatusCode::BAD_REQUEST, "Quantity must be at least 1");
    }
    let Some(item) = guard.items.iter_mut().find(|i| i.id == id) else {
        return message(StatusCode::NOT_FOUND, "Cart item not found");
    };
    item.qty = body.quantity;
    cart_body(&guard)
}

async fn remove_item(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Response {
    let mut guard = match admit(&state, &headers, format!("DELETE /api/cart/item/{id}")) {
        Ok(guard) => guard,
        Err(response) => return response,
    };

    let before = guard.items.len();
    guard.items.retain(|i| i.id != id);
    if guard.items.len() == before {
        return message(StatusCode::NOT_FOUND, "Cart item not found");
    }
    cart_body(&guard)
}

async fn clear_cart(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut guard = match admit(&state, &headers, "DELETE /api/cart/clear".to_string()) {
        Ok(guard) => guard,
        Err(response) => return response,
    };

    guard.items.clear();
    cart_body(&guard)
}
