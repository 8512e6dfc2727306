//! State-machine framework for event enrichment.
//!
//! A [`StateMachine`] observes tracked events and may maintain state, attach
//! context entities, add payload values, and vote on whether an event is
//! accepted. The [`StateManager`] owns all registered machines and, for
//! every event, produces an immutable [`TrackerStateSnapshot`] so that
//! entity generation, payload augmentation, and filtering for that event all
//! see one consistent view of state.
//!
//! State is computed lazily: a [`StateFuture`] runs the machine's transition
//! on first read and caches the result, so machines whose state nobody reads
//! cost nothing per event.
//!
//! Built-in machines:
//!
//! | Machine | Subscribes to | Produces |
//! |---------|---------------|----------|
//! | [`LifecycleStateMachine`] | foreground/background events | lifecycle entity on every event |
//! | [`DeepLinkStateMachine`] | deep-link-received, screen view | deep-link entity on the next screen view |

mod deep_link;
mod event;
mod future;
mod lifecycle;
mod machine;
mod manager;

pub use deep_link::{DeepLinkState, DeepLinkStateMachine};
pub use event::InspectableEvent;
pub use future::{StateFuture, TrackerStateSnapshot};
pub use lifecycle::{LifecycleState, LifecycleStateMachine};
pub use machine::{Selector, State, StateMachine, Subscriptions};
pub use manager::StateManager;

#[cfg(test)]
mod tests;
