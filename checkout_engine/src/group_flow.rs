//! The payment group tracker.
//!
//! One checkout submission yields one order per shop, all stamped with one payment id; this module keeps that set of
//! orders coherent as a [`PaymentGroup`]. Payment confirmations arrive over a push channel with no ordering or
//! delivery-count guarantee and can race buyer-initiated reads and cancellations, so every state change funnels
//! through the transition table in [`crate::lifecycle`] and success events are applied idempotently: replaying an
//! event, or interleaving it with a stale fetch, always converges on the same group state.
use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{Arc, Mutex, PoisonError},
};

use log::{debug, error, info, trace, warn};
use msc_common::{Secret, Vnd};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::{
    events::{EventProducers, GroupCancelledEvent, OrderPaidEvent},
    lifecycle,
    lifecycle::TransitionError,
    order_types::{Order, OrderId, OrderStatus, PaymentGroup, PaymentId, ShopId},
    traits::{ChannelError, GatewayError, PaymentChannel, PaymentEvent, StorefrontGateway},
};

#[derive(Debug, Clone, Error)]
pub enum GroupFlowError {
    #[error("No payment group is tracked for payment {0}")]
    UnknownGroup(PaymentId),
    #[error("Orders from payments {0} and {1} cannot share a payment group")]
    MixedPaymentIds(PaymentId, PaymentId),
    #[error("A payment group needs at least one member order")]
    EmptyGroup,
    #[error("{0}")]
    Transition(#[from] TransitionError),
    #[error("Storefront error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("Payment channel error: {0}")]
    Channel(#[from] ChannelError),
}

//--------------------------------------   Cancel outcome    ---------------------------------------------------------

/// Why one member order could not be cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelFailure {
    /// The state-machine guard rejected the cancel locally; no request was sent for this order.
    NotCancellable(OrderStatus),
    /// The storefront rejected or failed the cancel call.
    Gateway(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedCancel {
    pub order_id: OrderId,
    pub reason: CancelFailure,
}

/// The result of [`GroupFlowApi::cancel_group`]. Cancellation is "cancel what you can": the orders that could not be
/// cancelled are reported here, and the successfully cancelled subset is never rolled back. Whether to retry the
/// remainder is the caller's decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelGroupOutcome {
    pub payment_id: PaymentId,
    pub cancelled: Vec<OrderId>,
    pub failed: Vec<FailedCancel>,
}

impl CancelGroupOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && !self.cancelled.is_empty()
    }

    pub fn is_partial(&self) -> bool {
        !self.cancelled.is_empty() && !self.failed.is_empty()
    }
}

//--------------------------------------    GroupFlowApi     ---------------------------------------------------------

#[derive(Default)]
struct GroupState {
    groups: HashMap<PaymentId, PaymentGroup>,
}

impl GroupState {
    fn lock_of(state: &Mutex<GroupState>) -> std::sync::MutexGuard<'_, GroupState> {
        state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Build a [`PaymentGroup`] from a flat order list. The orders of one checkout submission always share one payment
/// id; a mix means the storefront reused a payment id across submissions, which would corrupt group tracking, so it
/// is rejected loudly instead of guessed around.
pub fn build_group(orders: Vec<Order>) -> Result<PaymentGroup, GroupFlowError> {
    let first = orders.first().ok_or(GroupFlowError::EmptyGroup)?;
    let payment_id = first.payment_id;
    if let Some(stray) = orders.iter().find(|o| o.payment_id != payment_id) {
        error!("💳️ Orders for payments {payment_id} and {} arrived as one group", stray.payment_id);
        return Err(GroupFlowError::MixedPaymentIds(payment_id, stray.payment_id));
    }
    Ok(PaymentGroup::new(payment_id, orders))
}

/// Tracks payment groups, applies payment-success events to their members, and drives group-wide cancellation.
///
/// A group is owned exclusively by the tracker that created it. The state sits behind a mutex because success events
/// are consumed on a dedicated task per watched payment id; the lock is never held across an await point.
pub struct GroupFlowApi<B> {
    gateway: B,
    state: Arc<Mutex<GroupState>>,
    producers: EventProducers,
    watchers: HashMap<PaymentId, JoinHandle<()>>,
}

impl<B> Debug for GroupFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GroupFlowApi")
    }
}

impl<B> GroupFlowApi<B>
where B: StorefrontGateway
{
    pub fn new(gateway: B, producers: EventProducers) -> Self {
        Self { gateway, state: Arc::new(Mutex::new(GroupState::default())), producers, watchers: HashMap::new() }
    }

    /// Start tracking the orders of one checkout submission as a group. Tracking the same payment id again replaces
    /// the previous membership; a group's member set never grows in place.
    pub fn track(&self, orders: Vec<Order>) -> Result<PaymentGroup, GroupFlowError> {
        let group = build_group(orders)?;
        let mut state = GroupState::lock_of(&self.state);
        if state.groups.insert(group.payment_id, group.clone()).is_some() {
            debug!("💳️ Replacing tracked group for payment {}", group.payment_id);
        }
        debug!("💳️ Tracking {} orders under payment {}", group.orders.len(), group.payment_id);
        Ok(group)
    }

    /// Re-derive a group for an order viewed in isolation: fetch the buyer's orders and keep those with a matching
    /// payment id. Equivalent to tracking the checkout response directly, because one submission produces one
    /// payment id.
    pub async fn load_group(&self, payment_id: PaymentId) -> Result<PaymentGroup, GroupFlowError> {
        const PAGE_SIZE: u32 = 50;
        let mut members = Vec::new();
        let mut page = 1u32;
        loop {
            let batch = self.gateway.fetch_orders(page, PAGE_SIZE).await?;
            let fetched = batch.orders.len();
            members.extend(batch.orders.into_iter().filter(|o| o.payment_id == payment_id));
            if fetched < PAGE_SIZE as usize || u64::from(page) * u64::from(PAGE_SIZE) >= batch.total {
                break;
            }
            page += 1;
        }
        if members.is_empty() {
            return Err(GroupFlowError::UnknownGroup(payment_id));
        }
        self.track(members)
    }

    /// A snapshot of the tracked group, if any.
    pub fn group(&self, payment_id: PaymentId) -> Option<PaymentGroup> {
        GroupState::lock_of(&self.state).groups.get(&payment_id).cloned()
    }

    /// The combined amount due across every member order, for rendering one payable total per group.
    pub fn total_for_group(&self, payment_id: PaymentId) -> Result<Vnd, GroupFlowError> {
        let state = GroupState::lock_of(&self.state);
        let group = state.groups.get(&payment_id).ok_or(GroupFlowError::UnknownGroup(payment_id))?;
        Ok(group.orders.iter().map(Order::total).sum())
    }

    /// Apply a payment confirmation to the whole group: every member still in `PendingPayment` advances to
    /// `PendingPickup` as one batch, or none do. Members already past `PendingPayment` are untouched, which makes
    /// replays and racing duplicates harmless no-ops.
    pub async fn on_payment_success(&self, payment_id: PaymentId) -> Result<Vec<Order>, GroupFlowError> {
        apply_payment_success(&self.state, &self.producers, payment_id).await
    }

    /// Cancel every member order that can still be cancelled. The state-machine guard runs locally first, so orders
    /// already past `PendingPayment` never produce a network call. Returns the cancelled and failed subsets; a
    /// partial result is surfaced as-is and the cancelled subset is not compensated.
    pub async fn cancel_group(&self, payment_id: PaymentId) -> Result<CancelGroupOutcome, GroupFlowError> {
        let members = {
            let state = GroupState::lock_of(&self.state);
            state.groups.get(&payment_id).ok_or(GroupFlowError::UnknownGroup(payment_id))?.orders.clone()
        };
        let mut cancelled = Vec::new();
        let mut failed = Vec::new();
        for order in members {
            if let Err(e) = lifecycle::check_cancellable(&order) {
                trace!("💳️❌️ Skipping order {}: {e}", order.id);
                failed.push(FailedCancel { order_id: order.id, reason: CancelFailure::NotCancellable(order.status) });
                continue;
            }
            match self.gateway.cancel_order(order.id).await {
                Ok(server_order) => {
                    let mut state = GroupState::lock_of(&self.state);
                    if let Some(local) = state.groups.get_mut(&payment_id).and_then(|g| g.order_mut(order.id)) {
                        local.status = lifecycle::merge_status(local.status, server_order.status);
                        local.updated_at = server_order.updated_at;
                    }
                    cancelled.push(order.id);
                },
                Err(e) => {
                    warn!("💳️❌️ Could not cancel order {}: {e}", order.id);
                    failed.push(FailedCancel { order_id: order.id, reason: CancelFailure::Gateway(e.to_string()) });
                },
            }
        }
        let outcome = CancelGroupOutcome { payment_id, cancelled, failed };
        if outcome.is_partial() {
            warn!(
                "💳️❌️ Cancelled {} of {} orders in payment group {payment_id}; the rest is handed back to the caller",
                outcome.cancelled.len(),
                outcome.cancelled.len() + outcome.failed.len()
            );
        }
        if outcome.is_complete() {
            info!("💳️❌️ Payment group {payment_id} fully cancelled");
            for producer in &self.producers.group_cancelled_producer {
                producer.publish_event(GroupCancelledEvent::new(payment_id, outcome.cancelled.clone())).await;
            }
        }
        Ok(outcome)
    }

    /// Re-fetch every member and merge the statuses under the rule in [`lifecycle::merge_status`]: a fetch that lost
    /// the race against a success event cannot roll a member back.
    pub async fn refresh_group(&self, payment_id: PaymentId) -> Result<PaymentGroup, GroupFlowError> {
        let ids = {
            let state = GroupState::lock_of(&self.state);
            state.groups.get(&payment_id).ok_or(GroupFlowError::UnknownGroup(payment_id))?.order_ids()
        };
        let mut fetched = Vec::with_capacity(ids.len());
        for id in ids {
            fetched.push(self.gateway.fetch_order(id).await?);
        }
        let mut state = GroupState::lock_of(&self.state);
        let group = state.groups.get_mut(&payment_id).ok_or(GroupFlowError::UnknownGroup(payment_id))?;
        for server_order in fetched {
            if let Some(local) = group.order_mut(server_order.id) {
                if lifecycle::merge_status(local.status, server_order.status) == server_order.status {
                    *local = server_order;
                } else {
                    trace!("💳️ Stale fetch for order {}; keeping {}", server_order.id, local.status);
                }
            }
        }
        Ok(group.clone())
    }

    /// Admin status edit for a single order, behind the same transition guard as everything else. The guard runs
    /// against the freshly fetched order before the storefront call, so invalid edits never leave the client.
    pub async fn modify_order_status(
        &self,
        shop_id: ShopId,
        order_id: OrderId,
        new_status: OrderStatus,
    ) -> Result<Order, GroupFlowError> {
        let current = self.gateway.fetch_order(order_id).await?;
        if !lifecycle::can_transition(current.status, new_status) {
            return Err(TransitionError::InvalidTransition { from: current.status, to: new_status }.into());
        }
        let updated = self.gateway.set_order_status(shop_id, order_id, new_status).await?;
        let mut state = GroupState::lock_of(&self.state);
        if let Some(local) = state.groups.get_mut(&updated.payment_id).and_then(|g| g.order_mut(order_id)) {
            local.status = lifecycle::merge_status(local.status, updated.status);
            local.updated_at = updated.updated_at;
        }
        info!("💳️ Order {order_id} moved to {new_status}");
        Ok(updated)
    }

    /// Open the payment channel for this group and consume its events on a dedicated task. Watching a payment id
    /// that is already watched closes the previous subscription first, so at most one live handle exists per id.
    pub async fn watch<C>(
        &mut self,
        channel: &C,
        payment_id: PaymentId,
        auth_token: &Secret<String>,
    ) -> Result<(), GroupFlowError>
    where
        C: PaymentChannel,
    {
        self.unwatch(payment_id);
        let mut handle = channel.open(payment_id, auth_token).await?;
        let state = Arc::clone(&self.state);
        let producers = self.producers.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = handle.next_event().await {
                let PaymentEvent::Succeeded { payment_id: confirmed } = event;
                if confirmed != payment_id {
                    warn!("📡️ Ignoring success event for payment {confirmed} on the channel for {payment_id}");
                    continue;
                }
                match apply_payment_success(&state, &producers, confirmed).await {
                    Ok(advanced) if advanced.is_empty() => trace!("💳️✅️ Duplicate success event for {confirmed}"),
                    Ok(_) => {},
                    Err(e) => error!("💳️ Could not apply payment success for {confirmed}: {e}"),
                }
            }
            debug!("📡️ Payment channel for {payment_id} closed");
        });
        self.watchers.insert(payment_id, task);
        Ok(())
    }

    /// Close the channel subscription for this payment id, if any. Safe to call repeatedly; used on view teardown so
    /// no forwarding task outlives its owner.
    pub fn unwatch(&mut self, payment_id: PaymentId) {
        if let Some(task) = self.watchers.remove(&payment_id) {
            task.abort();
            debug!("📡️ Stopped watching payment {payment_id}");
        }
    }

    pub fn is_watching(&self, payment_id: PaymentId) -> bool {
        self.watchers.contains_key(&payment_id)
    }

    pub fn gateway(&self) -> &B {
        &self.gateway
    }
}

impl<B> Drop for GroupFlowApi<B> {
    fn drop(&mut self) {
        for task in self.watchers.values() {
            task.abort();
        }
    }
}

/// Shared by [`GroupFlowApi::on_payment_success`] and the watcher tasks. The eligible members are validated against
/// the transition table before any of them is committed, all under one lock acquisition, so a failure part-way can
/// never leave the group straddling two states. Hooks fire after the lock is released.
async fn apply_payment_success(
    state: &Mutex<GroupState>,
    producers: &EventProducers,
    payment_id: PaymentId,
) -> Result<Vec<Order>, GroupFlowError> {
    let advanced = {
        let mut state = GroupState::lock_of(state);
        let group = state.groups.get_mut(&payment_id).ok_or(GroupFlowError::UnknownGroup(payment_id))?;
        let eligible: Vec<usize> = (0..group.orders.len())
            .filter(|&i| group.orders[i].status == OrderStatus::PendingPayment)
            .collect();
        if eligible.is_empty() {
            Vec::new()
        } else {
            let members: Vec<&Order> = eligible.iter().map(|&i| &group.orders[i]).collect();
            let updated = lifecycle::apply_all(&members, OrderStatus::PendingPickup)?;
            drop(members);
            for (&i, order) in eligible.iter().zip(updated.iter()) {
                group.orders[i] = order.clone();
            }
            updated
        }
    };
    if !advanced.is_empty() {
        info!("💳️✅️ Payment {payment_id} confirmed; {} orders advanced to PENDING_PICKUP", advanced.len());
        for producer in &producers.order_paid_producer {
            for order in &advanced {
                producer.publish_event(OrderPaidEvent::new(order.clone())).await;
            }
        }
    }
    Ok(advanced)
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::{
        cart::CartSession,
        checkout::CheckoutApi,
        order_types::Receiver,
        test_utils::{MemoryStorefront, ScriptedChannel},
    };

    fn receiver() -> Receiver {
        Receiver::new("Lan", "0900000000", "12 Hàng Bài, Hà Nội")
    }

    fn seeded_store() -> MemoryStorefront {
        let store = MemoryStorefront::new();
        store.seed_line(1, 1, 10, 100, 2, 100_000, 120_000, 5);
        store.seed_line(1, 2, 11, 101, 1, 50_000, 50_000, 3);
        store.seed_line(2, 3, 12, 102, 1, 300_000, 350_000, 2);
        store
    }

    /// Checkout the whole seeded cart: two orders (shops 1 and 2) under one payment id.
    async fn checkout_all(store: &MemoryStorefront) -> (Vec<Order>, PaymentId) {
        let api = CheckoutApi::new(store.clone());
        let mut session = CartSession::new(store.shop_carts());
        session.toggle_all_selection();
        let receipt = api.submit(&mut session, receiver()).await.unwrap();
        (receipt.orders, receipt.payment_id)
    }

    async fn wait_until_settled(api: &GroupFlowApi<MemoryStorefront>, payment_id: PaymentId) {
        for _ in 0..200 {
            if api.group(payment_id).is_some_and(|g| g.is_settled()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("group {payment_id} did not settle in time");
    }

    #[tokio::test]
    async fn checkout_orders_form_one_group() {
        let _ = env_logger::try_init();
        let store = seeded_store();
        let (orders, payment_id) = checkout_all(&store).await;
        let api = GroupFlowApi::new(store, EventProducers::default());

        let group = api.track(orders.clone()).unwrap();
        assert_eq!(group.payment_id, payment_id);
        assert_eq!(group.orders.len(), 2);
        assert_eq!(group.order_ids(), orders.iter().map(|o| o.id).collect::<Vec<_>>());
        assert_eq!(group.aggregate_total, Vnd::from(550_000));
        assert_eq!(api.total_for_group(payment_id).unwrap(), Vnd::from(550_000));
    }

    #[tokio::test]
    async fn mixed_payment_ids_are_rejected() {
        let store = seeded_store();
        let (mut orders, payment_id) = checkout_all(&store).await;
        orders[1].payment_id = PaymentId::from(payment_id.value() + 1);
        let err = build_group(orders).unwrap_err();
        assert!(matches!(err, GroupFlowError::MixedPaymentIds(_, _)));
        assert!(matches!(build_group(Vec::new()).unwrap_err(), GroupFlowError::EmptyGroup));
    }

    #[tokio::test]
    async fn payment_success_advances_every_member_once() {
        let store = seeded_store();
        let (orders, payment_id) = checkout_all(&store).await;
        let api = GroupFlowApi::new(store, EventProducers::default());
        api.track(orders).unwrap();

        let advanced = api.on_payment_success(payment_id).await.unwrap();
        assert_eq!(advanced.len(), 2);
        let group = api.group(payment_id).unwrap();
        assert!(group.orders.iter().all(|o| o.status == OrderStatus::PendingPickup));

        // replaying the event is a no-op and the state is unchanged
        let advanced = api.on_payment_success(payment_id).await.unwrap();
        assert!(advanced.is_empty());
        assert_eq!(api.group(payment_id).unwrap(), group);
    }

    #[tokio::test]
    async fn success_for_an_untracked_payment_is_an_error() {
        let store = seeded_store();
        let api = GroupFlowApi::new(store, EventProducers::default());
        let err = api.on_payment_success(PaymentId::from(4242)).await.unwrap_err();
        assert!(matches!(err, GroupFlowError::UnknownGroup(_)));
    }

    #[tokio::test]
    async fn watcher_applies_duplicate_events_idempotently() {
        let store = seeded_store();
        let (orders, payment_id) = checkout_all(&store).await;
        let mut api = GroupFlowApi::new(store, EventProducers::default());
        api.track(orders).unwrap();

        // the channel replays the success event three times; the group advances exactly once
        let channel = ScriptedChannel::new(vec![
            PaymentEvent::Succeeded { payment_id },
            PaymentEvent::Succeeded { payment_id },
            PaymentEvent::Succeeded { payment_id },
        ]);
        api.watch(&channel, payment_id, &Secret::new("token".to_string())).await.unwrap();
        assert!(api.is_watching(payment_id));
        wait_until_settled(&api, payment_id).await;

        let group = api.group(payment_id).unwrap();
        assert!(group.orders.iter().all(|o| o.status == OrderStatus::PendingPickup));
        api.unwatch(payment_id);
        assert!(!api.is_watching(payment_id));
    }

    #[tokio::test]
    async fn rewatching_closes_the_previous_subscription() {
        let store = seeded_store();
        let (orders, payment_id) = checkout_all(&store).await;
        let mut api = GroupFlowApi::new(store, EventProducers::default());
        api.track(orders).unwrap();

        let channel = ScriptedChannel::new(vec![PaymentEvent::Succeeded { payment_id }]);
        api.watch(&channel, payment_id, &Secret::new("token".to_string())).await.unwrap();
        api.watch(&channel, payment_id, &Secret::new("token".to_string())).await.unwrap();
        assert_eq!(channel.opened(), 2);
        assert!(api.is_watching(payment_id));
        wait_until_settled(&api, payment_id).await;
    }

    #[tokio::test]
    async fn cancel_group_cancels_every_pending_member() {
        let store = seeded_store();
        let (orders, payment_id) = checkout_all(&store).await;
        let api = GroupFlowApi::new(store.clone(), EventProducers::default());
        api.track(orders.clone()).unwrap();

        let outcome = api.cancel_group(payment_id).await.unwrap();
        assert!(outcome.is_complete());
        assert_eq!(outcome.cancelled.len(), 2);
        let group = api.group(payment_id).unwrap();
        assert!(group.orders.iter().all(|o| o.status == OrderStatus::Cancelled));
        for order in &orders {
            assert_eq!(store.order(order.id).unwrap().status, OrderStatus::Cancelled);
        }
    }

    #[tokio::test]
    async fn cancel_after_payment_fails_without_touching_the_network() {
        let store = seeded_store();
        let (orders, payment_id) = checkout_all(&store).await;
        let api = GroupFlowApi::new(store.clone(), EventProducers::default());
        api.track(orders).unwrap();
        api.on_payment_success(payment_id).await.unwrap();
        store.clear_calls();

        let outcome = api.cancel_group(payment_id).await.unwrap();
        assert!(outcome.cancelled.is_empty());
        assert_eq!(outcome.failed.len(), 2);
        assert!(outcome
            .failed
            .iter()
            .all(|f| f.reason == CancelFailure::NotCancellable(OrderStatus::PendingPickup)));
        assert!(store.calls().is_empty(), "guard failures must not produce cancel calls");
    }

    #[tokio::test]
    async fn partial_cancel_is_surfaced_not_rolled_back() {
        let store = seeded_store();
        let (orders, payment_id) = checkout_all(&store).await;
        let api = GroupFlowApi::new(store.clone(), EventProducers::default());
        api.track(orders.clone()).unwrap();

        // the first cancel call fails, the second goes through
        store.fail_next("cancel_order");
        let outcome = api.cancel_group(payment_id).await.unwrap();
        assert!(outcome.is_partial());
        assert_eq!(outcome.cancelled, vec![orders[1].id]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].order_id, orders[0].id);
        assert!(matches!(outcome.failed[0].reason, CancelFailure::Gateway(_)));

        // the cancelled member stays cancelled; the failed one is still pending payment
        assert_eq!(store.order(orders[1].id).unwrap().status, OrderStatus::Cancelled);
        assert_eq!(store.order(orders[0].id).unwrap().status, OrderStatus::PendingPayment);
    }

    #[tokio::test]
    async fn stale_fetch_cannot_roll_back_a_confirmed_payment() {
        let store = seeded_store();
        let (orders, payment_id) = checkout_all(&store).await;
        let api = GroupFlowApi::new(store.clone(), EventProducers::default());
        api.track(orders.clone()).unwrap();

        // the push event lands first; the storefront copy is then made stale to mimic a late fetch response
        api.on_payment_success(payment_id).await.unwrap();
        for order in &orders {
            store.set_status_raw(order.id, OrderStatus::PendingPayment);
        }
        let group = api.refresh_group(payment_id).await.unwrap();
        assert!(group.orders.iter().all(|o| o.status == OrderStatus::PendingPickup));

        // once the storefront catches up the fetch is accepted verbatim
        for order in &orders {
            store.set_status_raw(order.id, OrderStatus::PendingDelivery);
        }
        let group = api.refresh_group(payment_id).await.unwrap();
        assert!(group.orders.iter().all(|o| o.status == OrderStatus::PendingDelivery));
    }

    #[tokio::test]
    async fn load_group_filters_by_payment_id() {
        let store = seeded_store();
        let checkout = CheckoutApi::new(store.clone());
        let mut session = CartSession::new(store.shop_carts());
        session.toggle_line(crate::order_types::CartLineId::from(1));
        let first = checkout.submit(&mut session, receiver()).await.unwrap();
        session.toggle_all_selection();
        let second = checkout.submit(&mut session, receiver()).await.unwrap();

        let api = GroupFlowApi::new(store, EventProducers::default());
        let group = api.load_group(second.payment_id).await.unwrap();
        assert_eq!(group.orders.len(), 2);
        assert!(group.orders.iter().all(|o| o.payment_id == second.payment_id));

        let group = api.load_group(first.payment_id).await.unwrap();
        assert_eq!(group.orders.len(), 1);

        let err = api.load_group(PaymentId::from(777_777)).await.unwrap_err();
        assert!(matches!(err, GroupFlowError::UnknownGroup(_)));
    }

    #[tokio::test]
    async fn admin_edits_share_the_transition_guard() {
        let store = seeded_store();
        let (orders, payment_id) = checkout_all(&store).await;
        let api = GroupFlowApi::new(store.clone(), EventProducers::default());
        api.track(orders.clone()).unwrap();
        api.on_payment_success(payment_id).await.unwrap();
        let order = &orders[0];
        store.clear_calls();

        let err = api.modify_order_status(order.shop_id, order.id, OrderStatus::Delivered).await.unwrap_err();
        assert!(matches!(err, GroupFlowError::Transition(TransitionError::InvalidTransition { .. })));
        assert_eq!(store.calls(), vec![format!("GET /orders/{}", order.id.value())], "the status call must not happen");

        let updated = api.modify_order_status(order.shop_id, order.id, OrderStatus::PendingDelivery).await.unwrap();
        assert_eq!(updated.status, OrderStatus::PendingDelivery);
        let tracked = api.group(payment_id).unwrap();
        assert_eq!(tracked.order(order.id).unwrap().status, OrderStatus::PendingDelivery);
    }

    #[tokio::test]
    async fn paid_hook_fires_once_per_member() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let store = seeded_store();
        let (orders, payment_id) = checkout_all(&store).await;

        let count = Arc::new(AtomicUsize::new(0));
        let c2 = count.clone();
        let mut hooks = crate::events::EventHooks::default();
        hooks.on_order_paid(move |_event| {
            let count = count.clone();
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
            })
        });
        let handlers = crate::events::EventHandlers::new(8, hooks);
        let producers = handlers.producers();
        handlers.start_handlers();

        let api = GroupFlowApi::new(store, producers);
        api.track(orders).unwrap();
        api.on_payment_success(payment_id).await.unwrap();
        api.on_payment_success(payment_id).await.unwrap();

        for _ in 0..200 {
            if c2.load(Ordering::SeqCst) == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(c2.load(Ordering::SeqCst), 2);
    }
}
