use std::sync::Arc;

use crate::backend::{AuthProvider, SignInRequest, Subscription};
use crate::error::BackendResult;
use crate::model::{UserId, UserIdentity};

/// Current-user state mirrored from the auth provider's session stream.
pub struct SessionHolder {
    auth: Arc<dyn AuthProvider>,
    watch: Subscription<Option<UserIdentity>>,
    current: Option<UserIdentity>,
}

impl SessionHolder {
    pub fn new(auth: Arc<dyn AuthProvider>) -> Self {
        let watch = auth.watch();
        let current = watch.drain_latest().unwrap_or_else(|| auth.current_user());
        Self {
            auth,
            watch,
            current,
        }
    }

    pub fn current_user(&self) -> Option<&UserIdentity> {
        self.current.as_ref()
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.current.as_ref().map(|user| &user.uid)
    }

    pub fn is_signed_in(&self) -> bool {
        self.current.is_some()
    }

    /// Drains pending session changes. Returns whether the signed-in user
    /// is now a different one.
    pub fn poll(&mut self) -> bool {
        let Some(latest) = self.watch.drain_latest() else {
            return false;
        };
        let changed = self.user_id() != latest.as_ref().map(|user| &user.uid);
        if changed {
            match &latest {
                Some(user) => tracing::info!(uid = %user.uid, "session started"),
                None => tracing::info!("session ended"),
            }
        }
        self.current = latest;
        changed
    }

    /// Runs the provider's sign-in flow. A failure is logged and leaves the
    /// session as it was.
    pub fn sign_in(&mut self, request: &SignInRequest) -> BackendResult<UserIdentity> {
        match self.auth.sign_in(request) {
            Ok(user) => {
                self.poll();
                Ok(user)
            }
            Err(err) => {
                tracing::error!(?err, "sign-in failed");
                Err(err)
            }
        }
    }

    pub fn sign_out(&mut self) -> BackendResult<()> {
        match self.auth.sign_out() {
            Ok(()) => {
                self.poll();
                Ok(())
            }
            Err(err) => {
                tracing::error!(?err, "sign-out failed");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryAuthProvider;
    use assert_matches::assert_matches;

    fn request(email: &str) -> SignInRequest {
        SignInRequest {
            email: email.to_string(),
            display_name: None,
        }
    }

    #[test]
    fn picks_up_existing_session_on_load() -> anyhow::Result<()> {
        let auth = Arc::new(MemoryAuthProvider::signed_in("cook@example.com")?);
        let session = SessionHolder::new(auth);
        assert_eq!(
            session.user_id().map(UserId::as_str),
            Some("uid-cook@example.com")
        );
        Ok(())
    }

    #[test]
    fn poll_reports_changes_made_elsewhere() -> anyhow::Result<()> {
        let auth = Arc::new(MemoryAuthProvider::new());
        let mut session = SessionHolder::new(auth.clone());
        assert!(!session.poll());

        auth.sign_in(&request("cook@example.com"))?;
        assert!(session.poll());
        assert!(session.is_signed_in());
        assert!(!session.poll());

        auth.sign_out()?;
        assert!(session.poll());
        assert!(session.current_user().is_none());
        Ok(())
    }

    #[test]
    fn failed_sign_in_and_out_leave_session_alone() -> anyhow::Result<()> {
        let auth = Arc::new(MemoryAuthProvider::new());
        let mut session = SessionHolder::new(auth.clone());

        auth.reject_next_sign_in();
        assert!(session.sign_in(&request("cook@example.com")).is_err());
        assert!(!session.is_signed_in());

        session.sign_in(&request("cook@example.com"))?;
        auth.fail_next_sign_out();
        assert_matches!(session.sign_out(), Err(_));
        assert!(session.is_signed_in());
        Ok(())
    }
}
