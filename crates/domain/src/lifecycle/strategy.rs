//! Status-to-state mapping for one order type.

use std::collections::HashMap;
use std::sync::Arc;

use super::{OrderState, StateDeps, custom, inventory, sale};
use crate::order::{Order, OrderStatus, OrderType};

/// The state objects of one order type, built once and shared by every
/// order of that type.
pub struct OrderStrategy {
    order_type: OrderType,
    states: HashMap<OrderStatus, Arc<dyn OrderState>>,
}

impl OrderStrategy {
    /// Creates a strategy with no states registered.
    pub fn new(order_type: OrderType) -> Self {
        Self {
            order_type,
            states: HashMap::new(),
        }
    }

    /// Registers `state` under its own status, replacing any previous one.
    pub fn register(&mut self, state: Arc<dyn OrderState>) {
        debug_assert!(self.order_type.allows(state.status()));
        self.states.insert(state.status(), state);
    }

    pub fn custom(deps: &StateDeps) -> Self {
        Self::with_states(OrderType::Custom, custom::states(deps))
    }

    pub fn inventory(deps: &StateDeps) -> Self {
        Self::with_states(OrderType::Inventory, inventory::states(deps))
    }

    pub fn sale(deps: &StateDeps) -> Self {
        Self::with_states(OrderType::Sale, sale::states(deps))
    }

    /// Builds the full strategy for `order_type`.
    pub fn for_type(order_type: OrderType, deps: &StateDeps) -> Self {
        match order_type {
            OrderType::Custom => Self::custom(deps),
            OrderType::Inventory => Self::inventory(deps),
            OrderType::Sale => Self::sale(deps),
        }
    }

    fn with_states(order_type: OrderType, states: Vec<Arc<dyn OrderState>>) -> Self {
        let mut strategy = Self::new(order_type);
        for state in states {
            strategy.register(state);
        }
        strategy
    }

    pub fn order_type(&self) -> OrderType {
        self.order_type
    }

    pub fn initial_status(&self) -> OrderStatus {
        self.order_type.initial_status()
    }

    /// Returns the state registered for `status`, if any.
    pub fn state(&self, status: OrderStatus) -> Option<&Arc<dyn OrderState>> {
        self.states.get(&status)
    }

    /// Asks the state at `from` whether `order` may move to `to`. Statuses
    /// without a registered state allow nothing.
    pub fn can_transition(&self, order: &Order, from: OrderStatus, to: OrderStatus) -> bool {
        self.state(from)
            .is_some_and(|state| state.can_transition_to(order, to))
            && self.states.contains_key(&to)
    }
}

impl std::fmt::Debug for OrderStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut statuses: Vec<_> = self.states.keys().collect();
        statuses.sort();
        f.debug_struct("OrderStrategy")
            .field("order_type", &self.order_type)
            .field("statuses", &statuses)
            .finish()
    }
}
