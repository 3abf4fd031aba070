//! Session state shared by independent observers.
//!
//! A `SessionStore` persists the token/user pair and announces every change
//! through a `Broadcaster`; each `SessionObserver` bootstraps its own view
//! from the store and then follows the announcements.

pub mod broadcaster;
pub mod observer;
pub mod store;

pub use broadcaster::{Broadcaster, Subscription};
pub use observer::{ObserverState, SessionObserver};
pub use store::SessionStore;
