//! Order Manager - orchestrates checkout, listings and status changes
//!
//! Every mutation follows the same order: validate, persist through the
//! repository, then notify. Notification is best effort and never turns a
//! successful write into an error.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use common::Identity;
use observability::OrderMetrics;

use crate::address::normalize_address;
use crate::error::{OrderError, Result};
use crate::realtime::{Channel, Notifier, OrderEvent};
use crate::repository::{OrderRepository, StatusUpdate};
use crate::types::{sum_items, Actor, Amount, NewOrder, Order, OrderItem, OrderStatus};
use crate::users::{UserDirectory, UserProfile};

/// Checkout payload as sent by the storefront
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkout {
    #[serde(default)]
    pub items: Vec<OrderItem>,
    /// Any historical address shape; normalized before it is stored
    #[serde(default)]
    pub shipping_address: Option<Value>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub shipping_cost: Option<Amount>,
    #[serde(default)]
    pub discount: Option<Amount>,
    #[serde(default)]
    pub total_amount: Option<Amount>,
}

/// How client-supplied totals are treated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TotalsPolicy {
    /// Reject totals that differ from the computed one by more than `tolerance`
    pub verify: bool,
    pub tolerance: Amount,
}

impl Default for TotalsPolicy {
    fn default() -> Self {
        Self {
            verify: true,
            tolerance: Amount::from(bigdecimal::BigDecimal::new(1.into(), 2)),
        }
    }
}

/// Order Manager - the service behind the HTTP endpoints
pub struct OrderManager {
    repository: OrderRepository,
    notifier: Arc<dyn Notifier>,
    users: Arc<dyn UserDirectory>,
    totals: TotalsPolicy,
    metrics: OrderMetrics,
}

impl OrderManager {
    /// Create a new OrderManager
    pub fn new(
        repository: OrderRepository,
        notifier: Arc<dyn Notifier>,
        users: Arc<dyn UserDirectory>,
        totals: TotalsPolicy,
        metrics: OrderMetrics,
    ) -> Self {
        Self {
            repository,
            notifier,
            users,
            totals,
            metrics,
        }
    }

    pub fn repository(&self) -> &OrderRepository {
        &self.repository
    }

    /// Place an order for the authenticated customer
    ///
    /// Flow:
    /// 1. Validate items, address and amounts
    /// 2. Recompute the total and compare it with the client's
    /// 3. Persist with status pending
    /// 4. Emit `order-created` to the customer and `new-order` to admins
    pub async fn place_order(&self, identity: &Identity, checkout: Checkout) -> Result<Order> {
        tracing::info!(user_id = %identity.user_id, items = checkout.items.len(), "Placing order");

        validate_items(&checkout.items)?;

        let shipping_address = match &checkout.shipping_address {
            None | Some(Value::Null) => {
                return Err(OrderError::validation("Shipping address is required"));
            }
            Some(raw) => normalize_address(raw),
        };
        let missing = shipping_address.missing_fields();
        if !missing.is_empty() {
            return Err(OrderError::validation(format!(
                "Shipping address is incomplete, missing: {}",
                missing.join(", ")
            )));
        }

        let shipping_cost = checkout.shipping_cost.unwrap_or_default();
        let discount = checkout.discount.unwrap_or_default();
        if shipping_cost.is_negative() || discount.is_negative() {
            return Err(OrderError::validation(
                "Shipping cost and discount cannot be negative",
            ));
        }

        let total_amount = self.resolve_total(&checkout.items, &shipping_cost, &discount, checkout.total_amount)?;

        let new_order = NewOrder {
            user_id: identity.user_id.clone(),
            user_email: identity.email.clone(),
            user_name: identity.name.clone(),
            items: checkout.items,
            shipping_address,
            payment_method: checkout.payment_method.unwrap_or_default(),
            shipping_cost,
            discount,
            total_amount,
            status: None,
            is_test: false,
        };

        let actor = Actor::Customer(identity.user_id.clone());
        let order = self.repository.create(new_order, &actor).await?;

        self.notify(
            Channel::User(order.user_id.clone()),
            OrderEvent::OrderCreated(order.clone()),
        );
        self.notify(Channel::Admin, OrderEvent::NewOrder(order.clone()));

        Ok(order)
    }

    /// The caller's own orders, newest first
    pub async fn list_for_customer(&self, identity: &Identity) -> Result<Vec<Order>> {
        self.repository.get_by_user(&identity.user_id).await
    }

    /// Cancel one of the caller's orders
    pub async fn cancel_for_customer(&self, identity: &Identity, order_id: &str) -> Result<Order> {
        tracing::info!(order_id, user_id = %identity.user_id, "Cancelling order");

        let order = self.get_order(order_id).await?;
        if !order.is_owned_by(&identity.user_id) {
            return Err(OrderError::Forbidden(
                "You can only cancel your own orders".to_string(),
            ));
        }
        if !order.status.is_cancellable() {
            return Err(OrderError::NotCancellable(order.status));
        }

        let actor = Actor::Customer(identity.user_id.clone());
        let update = self
            .repository
            .update_status(order_id, OrderStatus::Cancelled, &actor)
            .await?;
        self.notify_status_change(&update);
        Ok(update.order)
    }

    /// Every non-test order with owner name and email filled in, newest first
    pub async fn list_all_orders(&self) -> Result<Vec<Order>> {
        let mut orders = self.repository.list_all().await?;
        self.denormalize_owners(&mut orders).await;
        Ok(orders)
    }

    /// One order by id
    pub async fn get_order(&self, order_id: &str) -> Result<Order> {
        self.repository
            .get_by_id(order_id)
            .await?
            .ok_or_else(|| OrderError::NotFound(order_id.to_string()))
    }

    /// Administrative status change
    ///
    /// `status` is the raw requested value; anything outside the five
    /// statuses is a validation error. A request for the current status
    /// succeeds without writing or notifying.
    pub async fn update_status(&self, order_id: &str, status: &str, admin_id: Option<String>) -> Result<StatusUpdate> {
        let to: OrderStatus = status.parse()?;
        let update = self
            .repository
            .update_status(order_id, to, &Actor::Admin(admin_id))
            .await?;

        if update.changed {
            self.notify_status_change(&update);
        }
        Ok(update)
    }

    /// Hard delete, reflected to admin observers
    pub async fn delete_order(&self, order_id: &str) -> Result<()> {
        let order = self.get_order(order_id).await?;
        if !self.repository.delete(order_id).await? {
            return Err(OrderError::NotFound(order_id.to_string()));
        }

        self.notify(
            Channel::Admin,
            OrderEvent::OrderDeleted {
                id: order.id,
                user_id: order.user_id,
            },
        );
        Ok(())
    }

    fn resolve_total(
        &self,
        items: &[OrderItem],
        shipping_cost: &Amount,
        discount: &Amount,
        supplied: Option<Amount>,
    ) -> Result<Amount> {
        let computed = &(&sum_items(items) + shipping_cost) - discount;
        if computed.is_negative() {
            return Err(OrderError::validation("Discount exceeds the order value"));
        }

        match supplied {
            None => Ok(computed),
            Some(supplied) if !self.totals.verify => Ok(supplied),
            Some(supplied) => {
                if supplied.abs_diff(&computed) > self.totals.tolerance {
                    Err(OrderError::validation(format!(
                        "Order total {} does not match the computed total {}",
                        supplied, computed
                    )))
                } else {
                    Ok(computed)
                }
            }
        }
    }

    fn notify_status_change(&self, update: &StatusUpdate) {
        let order = &update.order;
        self.notify(
            Channel::User(order.user_id.clone()),
            OrderEvent::OrderUpdated(order.clone()),
        );
        self.notify(
            Channel::Admin,
            OrderEvent::OrderStatusChanged {
                order: order.clone(),
                previous_status: update.previous,
            },
        );
    }

    fn notify(&self, channel: Channel, event: OrderEvent) {
        let name = event.name();
        match self.notifier.publish(&channel, event) {
            Ok(delivered) => {
                tracing::debug!(channel = %channel.key(), event = name, delivered, "Order event emitted");
            }
            Err(e) => {
                self.metrics.notification_failed(channel.kind());
                tracing::warn!(channel = %channel.key(), event = name, error = %e, "Order event not delivered");
            }
        }
    }

    /// One directory lookup per distinct owner; failures keep the values
    /// cached on the order
    async fn denormalize_owners(&self, orders: &mut [Order]) {
        let mut profiles: HashMap<String, Option<UserProfile>> = HashMap::new();

        for order in orders.iter_mut() {
            if !profiles.contains_key(&order.user_id) {
                let profile = match self.users.lookup(&order.user_id).await {
                    Ok(profile) => profile,
                    Err(e) => {
                        tracing::warn!(user_id = %order.user_id, error = %e, "User lookup failed");
                        None
                    }
                };
                profiles.insert(order.user_id.clone(), profile);
            }

            if let Some(Some(profile)) = profiles.get(&order.user_id) {
                if profile.name.is_some() {
                    order.user_name = profile.name.clone();
                }
                if profile.email.is_some() {
                    order.user_email = profile.email.clone();
                }
            }
        }
    }
}

fn validate_items(items: &[OrderItem]) -> Result<()> {
    if items.is_empty() {
        return Err(OrderError::validation("Order must contain at least one item"));
    }

    for (index, item) in items.iter().enumerate() {
        if item.product_id.trim().is_empty() {
            return Err(OrderError::validation(format!("Item {} has no productId", index + 1)));
        }
        if item.quantity == 0 {
            return Err(OrderError::validation(format!(
                "Item {} must have a quantity of at least 1",
                index + 1
            )));
        }
        if item.price.is_negative() {
            return Err(OrderError::validation(format!(
                "Item {} has a negative price",
                index + 1
            )));
        }
    }
    Ok(())
}
