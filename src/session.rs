use crate::backend::{Backend, Identity, Subscription};
use crate::error::{Notice, Operation, ResultExt};

/// Who the backend says is signed in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Anonymous,
    Authenticated(Identity),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    #[default]
    SignIn,
    SignUp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    pub mode: AuthMode,
}

impl Credentials {
    fn clear(&mut self) {
        self.email.clear();
        self.password.clear();
    }
}

/// Tracks the current identity from backend auth-state notifications.
///
/// The state only ever changes through [`Session::observe`], fed by the
/// auth subscription; sign-in and sign-out never assign it directly.
pub struct Session {
    state: SessionState,
    credentials: Credentials,
    auth: Subscription<Option<Identity>>,
}

impl Session {
    pub fn open<B: Backend>(backend: &B) -> Self {
        Session {
            state: SessionState::Anonymous,
            credentials: Credentials::default(),
            auth: backend.on_auth_state_change(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn identity(&self) -> Option<&Identity> {
        match &self.state {
            SessionState::Authenticated(identity) => Some(identity),
            SessionState::Anonymous => None,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn credentials_mut(&mut self) -> &mut Credentials {
        &mut self.credentials
    }

    pub fn toggle_mode(&mut self) {
        self.credentials.mode = match self.credentials.mode {
            AuthMode::SignIn => AuthMode::SignUp,
            AuthMode::SignUp => AuthMode::SignIn,
        };
    }

    /// Signs up or in depending on the form's mode.
    pub async fn submit<B: Backend>(&mut self, backend: &B) -> Result<(), Notice> {
        match self.credentials.mode {
            AuthMode::SignIn => self.sign_in(backend).await,
            AuthMode::SignUp => self.sign_up(backend).await,
        }
    }

    pub async fn sign_up<B: Backend>(&mut self, backend: &B) -> Result<(), Notice> {
        backend
            .sign_up(&self.credentials.email, &self.credentials.password)
            .await
            .during(Operation::SignUp)?;
        self.credentials.clear();
        Ok(())
    }

    pub async fn sign_in<B: Backend>(&mut self, backend: &B) -> Result<(), Notice> {
        backend
            .sign_in(&self.credentials.email, &self.credentials.password)
            .await
            .during(Operation::SignIn)?;
        self.credentials.clear();
        Ok(())
    }

    pub async fn sign_out<B: Backend>(&self, backend: &B) -> Result<(), Notice> {
        backend.sign_out().await.during(Operation::SignOut)
    }

    /// Next auth-state notification. `None` once the backend has gone away.
    pub async fn next_change(&mut self) -> Option<Option<Identity>> {
        self.auth.next().await
    }

    pub fn try_next_change(&mut self) -> Option<Option<Identity>> {
        self.auth.try_next()
    }

    /// Records a notification. Returns whether the identity changed.
    pub fn observe(&mut self, identity: Option<Identity>) -> bool {
        let next = match identity {
            Some(identity) => SessionState::Authenticated(identity),
            None => SessionState::Anonymous,
        };
        if next == self.state {
            return false;
        }
        self.state = next;
        tracing::info!(user = ?self.identity().map(|i| i.id.as_str()), "session changed");
        true
    }
}
