//! The authentication boundary.
//!
//! Sign-in, sign-up, and token handling all live in an external auth
//! provider. The pipeline consumes only two things: the current user id, and
//! a notification whenever the signed-in identity changes. The provider is
//! passed explicitly to whatever needs it; there is no process-wide
//! singleton.

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::{async_utils::Subscription, prelude::*};

/// Callback invoked with the new identity on every sign-in or sign-out.
pub type IdentityChangeFn = Box<dyn Fn(Option<String>) + Send + Sync>;

/// Read-only view of the signed-in identity.
pub trait IdentityProvider: Send + Sync + 'static {
    /// The current user id, if anyone is signed in.
    fn current_user(&self) -> Option<String>;

    /// Be notified whenever the signed-in identity changes. Delivery stops
    /// when the returned handle is unsubscribed or dropped.
    fn subscribe_changes(&self, on_change: IdentityChangeFn) -> Subscription;
}

/// An identity provider backed by in-process session state.
///
/// The CLI uses this with a fixed user; tests drive [`SessionIdentity::set_user`]
/// to simulate auth events.
pub struct SessionIdentity {
    inner: Arc<Mutex<SessionState>>,
    next_sub_id: AtomicU64,
}

struct SessionState {
    user: Option<String>,
    subscribers: HashMap<u64, Arc<IdentityChangeFn>>,
}

impl SessionIdentity {
    pub fn new(user: Option<String>) -> SessionIdentity {
        SessionIdentity {
            inner: Arc::new(Mutex::new(SessionState {
                user,
                subscribers: HashMap::new(),
            })),
            next_sub_id: AtomicU64::new(0),
        }
    }

    /// Change the signed-in user, notifying all subscribers.
    pub fn set_user(&self, user: Option<String>) {
        let subscribers = {
            let mut state = self.inner.lock().expect("lock poisoned");
            state.user = user.clone();
            state.subscribers.values().cloned().collect::<Vec<_>>()
        };
        for subscriber in subscribers {
            subscriber(user.clone());
        }
    }
}

impl IdentityProvider for SessionIdentity {
    fn current_user(&self) -> Option<String> {
        self.inner.lock().expect("lock poisoned").user.clone()
    }

    fn subscribe_changes(&self, on_change: IdentityChangeFn) -> Subscription {
        let id = self.next_sub_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .lock()
            .expect("lock poisoned")
            .subscribers
            .insert(id, Arc::new(on_change));
        let inner = self.inner.clone();
        Subscription::new(move || {
            inner.lock().expect("lock poisoned").subscribers.remove(&id);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn reports_current_user() {
        let identity = SessionIdentity::new(Some("u42".to_owned()));
        assert_eq!(identity.current_user().as_deref(), Some("u42"));
        identity.set_user(None);
        assert_eq!(identity.current_user(), None);
    }

    #[test]
    fn notifies_on_every_change_until_unsubscribed() {
        let identity = SessionIdentity::new(None);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let sub = identity.subscribe_changes(Box::new(move |user| {
            seen_clone.lock().unwrap().push(user);
        }));

        identity.set_user(Some("u42".to_owned()));
        identity.set_user(None);
        sub.unsubscribe();
        identity.set_user(Some("u43".to_owned()));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Some("u42".to_owned()), None],
        );
    }
}
