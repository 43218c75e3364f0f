//! Domain events and their synchronous, in-process dispatch.
//!
//! Flows emit events after their state change is durable; subscribers run
//! inline, in registration order. Nothing here crosses a process boundary,
//! so a subscriber that needs durability must arrange it itself (the email
//! flows use the outbox table for that instead of an event subscriber).

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Events emitted by the self-service flows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    /// A guarded request arrived without an active elevation.
    SudoModeChallenged { user_id: Uuid, path: String },
    /// A pending email change was activated; carries the replaced address.
    NewUserEmailVerified {
        user_id: Uuid,
        original_email: String,
    },
    /// A passkey finished registration and was stored.
    PasskeyRegistered {
        user_id: Uuid,
        credential_id: Vec<u8>,
    },
    /// Defined for subscribers; the password flow emitting it lives outside
    /// this service.
    UserPasswordWasUpdated { user_id: Uuid },
}

/// Event consumer invoked synchronously on emit.
pub trait EventSubscriber: Send + Sync {
    fn handle(&self, event: &DomainEvent);
}

/// Ordered list of subscribers; emit walks them in registration order.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Arc<dyn EventSubscriber>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers.push(subscriber);
    }

    pub fn emit(&self, event: &DomainEvent) {
        for subscriber in &self.subscribers {
            subscriber.handle(event);
        }
    }
}

/// Default subscriber that logs every event.
#[derive(Clone, Debug)]
pub struct LogSubscriber;

impl EventSubscriber for LogSubscriber {
    fn handle(&self, event: &DomainEvent) {
        match event {
            DomainEvent::SudoModeChallenged { user_id, path } => {
                info!(user_id = %user_id, path = %path, "sudo mode challenged");
            }
            DomainEvent::NewUserEmailVerified { user_id, .. } => {
                // The replaced address is deliberately not logged.
                info!(user_id = %user_id, "new user email verified");
            }
            DomainEvent::PasskeyRegistered { user_id, .. } => {
                info!(user_id = %user_id, "passkey registered");
            }
            DomainEvent::UserPasswordWasUpdated { user_id } => {
                info!(user_id = %user_id, "user password was updated");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    impl EventSubscriber for Counting {
        fn handle(&self, _event: &DomainEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Recording {
        label: &'static str,
        seen: Arc<Mutex<Vec<&'static str>>>,
    }

    impl EventSubscriber for Recording {
        fn handle(&self, _event: &DomainEvent) {
            self.seen.lock().expect("lock").push(self.label);
        }
    }

    #[test]
    fn emit_reaches_every_subscriber() {
        let counter = Arc::new(Counting(AtomicUsize::new(0)));
        let mut bus = EventBus::new();
        bus.subscribe(counter.clone());
        bus.subscribe(Arc::new(LogSubscriber));

        bus.emit(&DomainEvent::UserPasswordWasUpdated {
            user_id: Uuid::nil(),
        });
        bus.emit(&DomainEvent::SudoModeChallenged {
            user_id: Uuid::nil(),
            path: "/v1/me/email".to_string(),
        });

        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn subscribers_run_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.subscribe(Arc::new(Recording {
            label: "first",
            seen: seen.clone(),
        }));
        bus.subscribe(Arc::new(Recording {
            label: "second",
            seen: seen.clone(),
        }));

        bus.emit(&DomainEvent::UserPasswordWasUpdated {
            user_id: Uuid::nil(),
        });

        assert_eq!(*seen.lock().expect("lock"), vec!["first", "second"]);
    }

    #[test]
    fn empty_bus_emits_without_panic() {
        EventBus::new().emit(&DomainEvent::NewUserEmailVerified {
            user_id: Uuid::nil(),
            original_email: "old@example.com".to_string(),
        });
    }
}
