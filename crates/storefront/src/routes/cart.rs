//! Cart route handlers.
//!
//! Signed-in users get their own cart; guests get one keyed by their
//! session. The guest cart is merged into the user's cart at login.

use axum::{
    Json,
    extract::{Path, State},
};
use tower_sessions::Session;
use tracing::instrument;

use marketstall_core::CartItemId;

use crate::error::{ApiResponse, AppError, Result, add_breadcrumb};
use crate::middleware::{OptionalAuth, guest_cart_key};
use crate::models::CurrentUser;
use crate::models::cart::{AddCartItem, Cart, CartOwner, UpdateCartItem};
use crate::services::{CartError, CartService};
use crate::state::AppState;

/// Resolve the cart owner without creating a guest key.
async fn owner(user: Option<&CurrentUser>, session: &Session) -> Result<Option<CartOwner>> {
    if let Some(user) = user {
        return Ok(Some(CartOwner::User(user.id)));
    }
    Ok(guest_cart_key(session, false).await?.map(CartOwner::Guest))
}

/// Resolve the cart owner, giving a guest session a cart key if needed.
async fn owner_for_write(user: Option<&CurrentUser>, session: &Session) -> Result<CartOwner> {
    if let Some(user) = user {
        return Ok(CartOwner::User(user.id));
    }
    guest_cart_key(session, true)
        .await?
        .map(CartOwner::Guest)
        .ok_or_else(|| AppError::Internal("guest cart key was not stored".to_string()))
}

fn service(state: &AppState) -> CartService<'_> {
    CartService::new(state.pool(), &state.config().pricing)
}

/// The current cart with totals.
///
/// GET /api/cart
#[instrument(skip_all)]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Result<ApiResponse<Cart>> {
    let cart = match owner(user.as_ref(), &session).await? {
        Some(owner) => service(&state).view(&owner).await?,
        None => Cart::empty(),
    };
    Ok(ApiResponse::new(cart))
}

/// Add a product to the cart.
///
/// POST /api/cart/items
#[instrument(skip(state, session, user), fields(product_id = %body.product_id))]
pub async fn add_item(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Json(body): Json<AddCartItem>,
) -> Result<ApiResponse<Cart>> {
    let owner = owner_for_write(user.as_ref(), &session).await?;
    let cart = service(&state).add(&owner, &body).await?;

    let product_id = body.product_id.to_string();
    let quantity = body.quantity.to_string();
    add_breadcrumb(
        "cart",
        "Added to cart",
        Some(&[("product_id", &product_id), ("quantity", &quantity)]),
    );

    Ok(ApiResponse::new(cart))
}

/// Change a line's quantity; zero removes it.
///
/// PUT /api/cart/items/{id}
#[instrument(skip(state, session, user))]
pub async fn update_item(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Path(item_id): Path<CartItemId>,
    Json(body): Json<UpdateCartItem>,
) -> Result<ApiResponse<Cart>> {
    let owner = owner(user.as_ref(), &session).await?;
    let cart = match owner {
        Some(owner) => service(&state).update(&owner, item_id, body.quantity).await?,
        None => return Err(CartError::ItemNotFound.into()),
    };
    Ok(ApiResponse::new(cart))
}

/// Remove a line.
///
/// DELETE /api/cart/items/{id}
#[instrument(skip(state, session, user))]
pub async fn remove_item(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Path(item_id): Path<CartItemId>,
) -> Result<ApiResponse<Cart>> {
    let owner = owner(user.as_ref(), &session).await?;
    let cart = match owner {
        Some(owner) => service(&state).remove(&owner, item_id).await?,
        None => return Err(CartError::ItemNotFound.into()),
    };
    Ok(ApiResponse::new(cart))
}

/// Empty the cart.
///
/// DELETE /api/cart
#[instrument(skip_all)]
pub async fn clear(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Result<ApiResponse<Cart>> {
    let cart = match owner(user.as_ref(), &session).await? {
        Some(owner) => service(&state).clear(&owner).await?,
        None => Cart::empty(),
    };
    Ok(ApiResponse::new(cart))
}
