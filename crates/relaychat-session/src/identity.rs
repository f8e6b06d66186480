use relaychat_types::UserSession;
use tokio::sync::watch;

/// Source of the signed-in user. The controller follows `subscribe` and
/// tears the session down when it reports `None`.
pub trait IdentityProvider: Send + Sync {
    fn current_session(&self) -> Option<UserSession>;

    fn subscribe(&self) -> watch::Receiver<Option<UserSession>>;

    fn sign_out(&self);
}

/// Identity held in memory, used by the terminal client and tests.
#[derive(Debug)]
pub struct StaticIdentity {
    session: watch::Sender<Option<UserSession>>,
}

impl StaticIdentity {
    pub fn new(session: Option<UserSession>) -> Self {
        let (session, _) = watch::channel(session);
        Self { session }
    }

    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self::new(Some(UserSession::new(user_id)))
    }

    pub fn sign_in(&self, session: UserSession) {
        self.session.send_replace(Some(session));
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_session(&self) -> Option<UserSession> {
        self.session.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<UserSession>> {
        self.session.subscribe()
    }

    fn sign_out(&self) {
        self.session.send_if_modified(|current| current.take().is_some());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sign_out_notifies_subscribers_once() {
        let identity = StaticIdentity::signed_in("u1");
        let mut rx = identity.subscribe();
        assert_eq!(identity.current_session().unwrap().user_id, "u1");

        identity.sign_out();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_none());

        identity.sign_out();
        assert!(!rx.has_changed().unwrap());
    }
}
