//! Checkout, order status changes and payment events.
//!
//! The database side of each step is one transaction in `OrderRepository`;
//! this service adds what happens around it: Stripe calls after commit,
//! compensation when Stripe fails, and customer emails.

use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use marketstall_core::{
    OrderId, OrderStatus, PaymentMethod, PaymentStatus, PricingRules, UserId, to_minor_units,
};

use crate::db::{
    NewOrder, OrderRepository, OrderUpdateError, PaymentSettlement, RepositoryError,
    UserRepository,
};
use crate::models::order::{CheckoutRequest, CheckoutResult, Order, OrderDetail};
use crate::services::email::EmailService;
use crate::services::payments::{PaymentError, StripeClient, WebhookEvent};
use crate::state::AppState;

/// Errors from checkout and order updates.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Missing shipping address fields: {}", .0.join(", "))]
    IncompleteAddress(Vec<&'static str>),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Order(#[from] OrderUpdateError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Checkout service.
pub struct CheckoutService<'a> {
    pool: &'a PgPool,
    orders: OrderRepository<'a>,
    stripe: Option<&'a StripeClient>,
    email: Option<&'a EmailService>,
    rules: &'a PricingRules,
    currency: &'a str,
}

impl<'a> CheckoutService<'a> {
    /// Build the service from shared state.
    #[must_use]
    pub fn from_state(state: &'a AppState) -> Self {
        Self {
            pool: state.pool(),
            orders: OrderRepository::new(state.pool()),
            stripe: state.stripe(),
            email: state.email(),
            rules: &state.config().pricing,
            currency: &state.config().currency,
        }
    }

    /// Place an order from the user's cart.
    ///
    /// Card orders get a Stripe PaymentIntent whose client secret is returned.
    /// If Stripe fails, the order is cancelled again and its stock restored.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::EmptyCart` if there is nothing to order,
    /// `CheckoutError::IncompleteAddress` for missing address fields,
    /// `RepositoryError::InsufficientStock` if stock ran out, and
    /// `CheckoutError::Payment` if the PaymentIntent cannot be created.
    #[instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn place_order(
        &self,
        user_id: UserId,
        request: &CheckoutRequest,
    ) -> Result<CheckoutResult, CheckoutError> {
        let missing = request.shipping_address.missing_fields();
        if !missing.is_empty() {
            return Err(CheckoutError::IncompleteAddress(missing));
        }

        let stripe = match request.payment_method {
            PaymentMethod::Card => Some(self.stripe.ok_or(PaymentError::NotConfigured)?),
            PaymentMethod::CashOnDelivery => None,
        };

        let notes = request
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());

        let new_order = NewOrder {
            user_id,
            address: &request.shipping_address,
            payment_method: request.payment_method,
            notes,
        };

        let mut detail = self
            .orders
            .create_from_cart(&new_order, self.rules)
            .await?
            .ok_or(CheckoutError::EmptyCart)?;

        let Some(stripe) = stripe else {
            self.send_confirmation(&detail).await;
            return Ok(CheckoutResult {
                order: detail,
                client_secret: None,
            });
        };

        match self.create_intent(stripe, &detail.order).await {
            Ok(intent) => {
                self.orders
                    .set_payment_intent(detail.order.id, &intent.id)
                    .await?;
                detail.order.payment_intent_id = Some(intent.id);
                Ok(CheckoutResult {
                    order: detail,
                    client_secret: intent.client_secret,
                })
            }
            Err(err) => {
                tracing::error!(
                    order_id = %detail.order.id,
                    error = %err,
                    "PaymentIntent creation failed, cancelling order"
                );
                if let Err(cancel_err) = self
                    .orders
                    .transition(detail.order.id, OrderStatus::Cancelled, None, None, None)
                    .await
                {
                    tracing::error!(
                        order_id = %detail.order.id,
                        error = %cancel_err,
                        "Failed to cancel order after payment error"
                    );
                }
                Err(err.into())
            }
        }
    }

    async fn create_intent(
        &self,
        stripe: &StripeClient,
        order: &Order,
    ) -> Result<crate::services::payments::PaymentIntent, PaymentError> {
        let amount = to_minor_units(order.total)
            .ok_or_else(|| PaymentError::InvalidAmount(order.total.to_string()))?;
        stripe
            .create_payment_intent(order.id, &order.order_number, amount, self.currency)
            .await
    }

    /// Cancel an order and settle its payment.
    ///
    /// `owner` restricts the order to one customer's; admins pass `None`.
    ///
    /// # Errors
    ///
    /// Returns `OrderUpdateError::InvalidTransition` if the order can no longer
    /// be cancelled and `RepositoryError::NotFound` if it doesn't exist.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        order_id: OrderId,
        owner: Option<UserId>,
        actor: UserId,
    ) -> Result<Order, CheckoutError> {
        self.update_status(order_id, OrderStatus::Cancelled, None, owner, actor)
            .await
    }

    /// Move an order to a new status.
    ///
    /// Cancellation refunds or voids the Stripe payment after commit; a
    /// failure there is logged and left for manual follow-up. Shipping sends
    /// the customer a notice.
    ///
    /// # Errors
    ///
    /// Returns `OrderUpdateError::InvalidTransition` if the rules forbid the
    /// change and `RepositoryError::NotFound` if the order doesn't exist.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: OrderId,
        next: OrderStatus,
        tracking_number: Option<&str>,
        owner: Option<UserId>,
        actor: UserId,
    ) -> Result<Order, CheckoutError> {
        let tracking_number = tracking_number.map(str::trim).filter(|t| !t.is_empty());

        let change = self
            .orders
            .transition(order_id, next, tracking_number, owner, Some(actor))
            .await?;
        let order = change.order;

        match order.status {
            OrderStatus::Cancelled => {
                self.settle_cancelled_payment(&order, change.previous_payment)
                    .await;
            }
            OrderStatus::Shipped => self.send_shipped(&order).await,
            _ => {}
        }

        Ok(order)
    }

    async fn settle_cancelled_payment(&self, order: &Order, previous_payment: PaymentStatus) {
        let (Some(stripe), Some(intent)) = (self.stripe, order.payment_intent_id.as_deref()) else {
            return;
        };

        let result = match previous_payment {
            PaymentStatus::Paid => stripe.refund(intent).await.map(|refund_id| {
                tracing::info!(order_id = %order.id, refund_id = %refund_id, "Payment refunded");
            }),
            PaymentStatus::Pending | PaymentStatus::Failed => {
                stripe.cancel_payment_intent(intent).await
            }
            PaymentStatus::Refunded => Ok(()),
        };

        if let Err(err) = result {
            tracing::error!(
                order_id = %order.id,
                payment_intent = %intent,
                error = %err,
                "Failed to settle payment of cancelled order"
            );
        }
    }

    /// Apply a verified Stripe webhook event.
    ///
    /// Unknown event types and unknown PaymentIntents are ignored.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn apply_payment_event(&self, event: &WebhookEvent) -> Result<(), CheckoutError> {
        let Some(intent) = event.payment_intent_id() else {
            tracing::debug!("Webhook event without PaymentIntent ignored");
            return Ok(());
        };

        match event.event_type.as_str() {
            "payment_intent.succeeded" => match self.orders.mark_paid(intent).await? {
                Some(PaymentSettlement::Paid(order)) => {
                    tracing::info!(order_id = %order.id, "Order paid");
                    if let Some(detail) = self.orders.get_detail(order.id).await? {
                        self.send_confirmation(&detail).await;
                    }
                }
                Some(PaymentSettlement::RefundDue(order)) => {
                    tracing::warn!(order_id = %order.id, "Payment succeeded for cancelled order, refunding");
                    self.refund_late_payment(&order, intent).await;
                }
                Some(PaymentSettlement::Unchanged(order)) => {
                    tracing::debug!(order_id = %order.id, "Duplicate payment event");
                }
                None => tracing::warn!(payment_intent = %intent, "No order for PaymentIntent"),
            },
            "payment_intent.payment_failed" => {
                if let Some(order) = self.orders.mark_payment_failed(intent).await? {
                    tracing::warn!(order_id = %order.id, "Payment failed");
                }
            }
            other => tracing::debug!(event_type = %other, "Unhandled webhook event"),
        }

        Ok(())
    }

    async fn refund_late_payment(&self, order: &Order, intent: &str) {
        let Some(stripe) = self.stripe else {
            tracing::error!(order_id = %order.id, "Stripe not configured, refund manually");
            return;
        };
        match stripe.refund(intent).await {
            Ok(refund_id) => {
                tracing::info!(order_id = %order.id, refund_id = %refund_id, "Payment refunded");
            }
            Err(err) => tracing::error!(
                order_id = %order.id,
                payment_intent = %intent,
                error = %err,
                "Failed to refund payment of cancelled order"
            ),
        }
    }

    async fn recipient(&self, user_id: UserId) -> Option<String> {
        match UserRepository::new(self.pool).get_by_id(user_id).await {
            Ok(user) => user.map(|u| u.email.into_inner()),
            Err(err) => {
                tracing::warn!(user_id = %user_id, error = %err, "Failed to look up email recipient");
                None
            }
        }
    }

    async fn send_confirmation(&self, detail: &OrderDetail) {
        let Some(email) = self.email else {
            tracing::debug!(order_id = %detail.order.id, "Email not configured, skipping confirmation");
            return;
        };
        let Some(to) = self.recipient(detail.order.user_id).await else {
            return;
        };

        let email = email.clone();
        let detail = detail.clone();
        tokio::spawn(async move {
            if let Err(err) = email.send_order_confirmation(&to, &detail).await {
                tracing::warn!(order_id = %detail.order.id, error = %err, "Confirmation email failed");
            }
        });
    }

    async fn send_shipped(&self, order: &Order) {
        let Some(email) = self.email else {
            tracing::debug!(order_id = %order.id, "Email not configured, skipping shipping notice");
            return;
        };
        let Some(to) = self.recipient(order.user_id).await else {
            return;
        };

        let email = email.clone();
        let order_id = order.id;
        let order_number = order.order_number.clone();
        let tracking = order.tracking_number.clone();
        tokio::spawn(async move {
            if let Err(err) = email
                .send_order_shipped(&to, &order_number, tracking.as_deref())
                .await
            {
                tracing::warn!(order_id = %order_id, error = %err, "Shipping email failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incomplete_address_message() {
        let err = CheckoutError::IncompleteAddress(vec!["city", "country"]);
        assert_eq!(err.to_string(), "Missing shipping address fields: city, country");
    }
}
