//! Credential lifecycle manager.
//!
//! The [`Signer`] is driven by explicit ticks ([`Signer::handle_token`]) from the application
//! loop. Each tick inspects the clock and the current state and performs at most one
//! blocking exchange with the identity endpoint. Dependent clients share a `&Signer` and only
//! read from it.
pub mod state;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::time::Duration;

use http::Request;
use tracing::{debug, info, warn};

use crate::AuthError;
use crate::account::AccountManager;
use crate::clock::{self, Clock, SystemClock};
use crate::config::precision::Precision;
use crate::config::{AuthConfig, SignerSettings};
use crate::http_client::HttpClient;
use crate::store::CredentialStore;
use crate::strategy::user::UserStrategy;
use crate::strategy::{Acquisition, StrategyImpl, TokenStrategy, required_api_key};
use crate::token::{Credential, TokenInfo, TokenStatus, TokenType};
use state::{SignerState, SignerStep};

#[derive(Debug, Default)]
struct SignerInner<'a> {
    config: Option<&'a AuthConfig>,
    state: SignerState,
    store: CredentialStore,
    /// Set after a revocation so the next attempt does not wait for the backoff.
    skip_backoff: bool,
    /// Time observed on the previous access, used to detect the clock being synchronised.
    last_seen: Option<i64>,
}

impl SignerInner<'_> {
    fn observe_clock(&mut self, now: i64) {
        if let Some(previous) = self.last_seen.replace(now) {
            if !clock::is_plausible(previous) && clock::is_plausible(now) {
                let delta = now.saturating_sub(previous);
                debug!(delta, "clock synchronised, rebasing credential");
                if !clock::is_plausible(self.store.credential().issued_at()) {
                    self.store.rebase(delta);
                }
                if !clock::is_plausible(self.state.last_attempt_at) {
                    self.state.last_attempt_at = self.state.last_attempt_at.saturating_add(delta);
                }
            }
        }
    }
}

/// Outcome of the synchronous part of a tick.
enum Tick<'s> {
    Done(bool),
    Exchange {
        strategy: StrategyImpl<'s>,
        request: Request<Vec<u8>>,
    },
}

/// Acquires, caches and renews the credential described by an [`AuthConfig`].
pub struct Signer<'a, C, K = SystemClock> {
    http_client: C,
    clock: K,
    settings: SignerSettings,
    precision: Cell<Precision>,
    inner: RefCell<SignerInner<'a>>,
}

impl<C, K> fmt::Debug for Signer<'_, C, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("settings", &self.settings)
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl<'a, C, K> Signer<'a, C, K>
where
    C: HttpClient,
    K: Clock,
{
    pub fn new(http_client: C, clock: K, settings: SignerSettings) -> Self {
        Self {
            http_client,
            clock,
            precision: Cell::new(settings.precision),
            settings,
            inner: RefCell::new(SignerInner::default()),
        }
    }

    /// Starts (or restarts) the acquisition of the credential described by `config`.
    ///
    /// Calling it again with an identical configuration keeps a valid credential without a new
    /// exchange. A different configuration drops the credential, unless it was set externally
    /// and is still valid.
    pub fn begin(&self, config: &'a AuthConfig) {
        let now = self.clock.now();
        let Ok(mut guard) = self.inner.try_borrow_mut() else {
            warn!("begin ignored, the signer is busy");
            return;
        };
        let inner = &mut *guard;
        if inner.state.step == SignerStep::ExchangeInFlight {
            warn!("begin ignored, a token exchange is in flight");
            return;
        }
        inner.observe_clock(now);

        let unchanged = inner.config == Some(config);
        inner.config = Some(config);
        inner.state.attempts = 0;
        inner.skip_backoff = false;

        if inner.store.credential().is_valid(now) && (unchanged || inner.store.is_external()) {
            debug!("keeping the current credential");
            inner.state.transition(SignerStep::Ready);
            return;
        }
        if !unchanged {
            inner.store.invalidate();
        }
        info!(mode = ?config.mode, "starting credential acquisition");
        inner.state.transition(SignerStep::Begin);
    }

    /// Drives the state machine one step. Returns whether the credential is ready afterwards.
    ///
    /// At most one exchange is sent per call. Calls made while an exchange is in flight (from
    /// inside the transport, for instance) do nothing.
    pub fn handle_token(&self) -> bool {
        let now = self.clock.now();
        match self.prepare(now) {
            Tick::Done(ready) => ready,
            Tick::Exchange { strategy, request } => self.exchange(&strategy, request, now),
        }
    }

    fn prepare(&self, now: i64) -> Tick<'_> {
        let Ok(mut guard) = self.inner.try_borrow_mut() else {
            debug!("re-entrant token handling ignored");
            return Tick::Done(false);
        };
        let inner = &mut *guard;
        inner.observe_clock(now);

        match inner.state.step {
            SignerStep::Idle => return Tick::Done(false),
            SignerStep::ExchangeInFlight => {
                debug!("token exchange already in flight");
                return Tick::Done(false);
            }
            SignerStep::Ready if !inner.store.is_expired(now) => return Tick::Done(true),
            SignerStep::Ready => {
                info!(
                    expires_at = inner.store.credential().expires_at(),
                    "credential expired"
                );
                inner.state.transition(SignerStep::Expired);
                inner.state.transition(SignerStep::Begin);
            }
            SignerStep::Expired | SignerStep::ExchangeSucceeded | SignerStep::ExchangeFailed => {
                inner.state.transition(SignerStep::Begin)
            }
            SignerStep::Begin => {}
        }

        // An expired external token with nothing to fall back to.
        let Some(config) = inner.config else {
            return Tick::Done(false);
        };
        if !self.attempt_allowed(inner, now) {
            return Tick::Done(false);
        }

        let strategy =
            match StrategyImpl::for_config(config, &self.settings, inner.store.credential()) {
                Ok(strategy) => strategy,
                Err(err) => {
                    self.fail(inner, err, now);
                    return Tick::Done(false);
                }
            };
        if strategy.requires_synced_clock() && !clock::is_plausible(now) {
            debug!(now, "waiting for the clock to be synchronised");
            return Tick::Done(false);
        }

        match strategy.acquire(now, inner.store.credential()) {
            Ok(Acquisition::Direct(credential)) => {
                self.succeed(inner, credential);
                Tick::Done(true)
            }
            Ok(Acquisition::Exchange(request)) => {
                inner.state.last_attempt_at = now;
                inner.state.transition(SignerStep::ExchangeInFlight);
                Tick::Exchange { strategy, request }
            }
            Err(err) => {
                self.fail(inner, err, now);
                Tick::Done(false)
            }
        }
    }

    /// Sends the request with the state released, so re-entrant readers see the exchange in
    /// flight.
    fn exchange(
        &self,
        strategy: &StrategyImpl<'_>,
        request: Request<Vec<u8>>,
        issued_at: i64,
    ) -> bool {
        debug!(path = request.uri().path(), "dispatching token exchange");
        let result = self
            .http_client
            .send(request)
            .map_err(AuthError::from)
            .and_then(|response| strategy.parse_response(response, issued_at));

        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        match result {
            Ok(credential) => {
                inner.state.transition(SignerStep::ExchangeSucceeded);
                self.succeed(inner, credential);
                true
            }
            Err(err) => {
                inner.state.transition(SignerStep::ExchangeFailed);
                self.fail(inner, err, issued_at);
                false
            }
        }
    }

    fn attempt_allowed(&self, inner: &mut SignerInner<'_>, now: i64) -> bool {
        let state = &mut inner.state;
        if state.attempts >= self.max_attempts() {
            return false;
        }
        if state.attempts == 0 {
            return true;
        }
        if std::mem::take(&mut inner.skip_backoff) {
            debug!("retrying without backoff");
            return true;
        }
        if now < state.last_attempt_at {
            debug!("clock moved backwards, restarting the retry interval");
            state.last_attempt_at = now;
        }
        let elapsed = Duration::from_secs(now.saturating_sub(state.last_attempt_at).unsigned_abs());
        elapsed >= self.settings.backoff.delay(state.attempts)
    }

    fn succeed(&self, inner: &mut SignerInner<'_>, credential: Credential) {
        // Refresh responses may omit the refresh token, the previous one stays usable.
        let current = inner.store.credential();
        let credential = match current.refresh_token() {
            Some(previous)
                if credential.refresh_token().is_none()
                    && credential.token_type() == current.token_type() =>
            {
                credential.with_refresh_token(Some(previous.to_owned()))
            }
            _ => credential,
        };

        info!(
            token_type = %credential.token_type(),
            expires_at = credential.expires_at(),
            "credential acquired"
        );
        inner.store.set_credential(credential);
        inner.state.record_success();
        inner.skip_backoff = false;
        inner.state.transition(SignerStep::Ready);
    }

    fn fail(&self, inner: &mut SignerInner<'_>, err: AuthError, now: i64) {
        if let AuthError::Revoked(_) = err {
            warn!(%err, "credential revoked");
            inner.store.invalidate();
            // A credential revoked again keeps waiting for the backoff.
            inner.skip_backoff =
                !matches!(inner.state.last_error(), Some(AuthError::Revoked(_)));
        } else {
            warn!(%err, attempt = inner.state.attempts + 1, "token acquisition failed");
        }
        inner.state.record_failure(err, now);
        if inner.state.attempts >= self.max_attempts() {
            warn!(
                attempts = inner.state.attempts,
                "maximum token acquisition retries reached"
            );
        }
        inner.state.transition(SignerStep::Begin);
    }

    fn max_attempts(&self) -> u32 {
        self.settings.max_retries.max(1)
    }

    /// Current time, reconciling the credential with a clock that got synchronised since the
    /// last access.
    fn observed_now(&self) -> i64 {
        let now = self.clock.now();
        if let Ok(mut inner) = self.inner.try_borrow_mut() {
            inner.observe_clock(now);
        }
        now
    }

    /// Whether the credential can be presented to dependent clients right now.
    pub fn token_ready(&self) -> bool {
        let now = self.observed_now();
        let inner = self.inner.borrow();
        inner.state.step == SignerStep::Ready && inner.store.credential().is_valid(now)
    }

    pub fn is_expired(&self) -> bool {
        let now = self.observed_now();
        self.inner.borrow().store.is_expired(now)
    }

    /// The raw token string. Empty when no credential is held (and for anonymous access).
    pub fn get_token(&self) -> String {
        let inner = self.inner.borrow();
        let (token, _) = inner.store.current_token();
        token.to_owned()
    }

    pub fn credential(&self) -> Credential {
        self.inner.borrow().store.credential().clone()
    }

    pub fn state(&self) -> SignerState {
        self.inner.borrow().state.clone()
    }

    pub fn last_error(&self) -> Option<AuthError> {
        self.inner.borrow().state.last_error.clone()
    }

    /// Whether automatic retries stopped. Only `begin`, `refresh_token` or `set_id_token`
    /// start them again.
    pub fn retries_exhausted(&self) -> bool {
        self.inner.borrow().state.attempts >= self.max_attempts()
    }

    pub fn token_info(&self) -> TokenInfo {
        let now = self.observed_now();
        let inner = self.inner.borrow();
        let credential = inner.store.credential();
        let exhausted = inner.state.attempts >= self.max_attempts();

        let status = match inner.state.step {
            SignerStep::Idle => TokenStatus::Uninitialized,
            SignerStep::Ready if credential.is_valid(now) => TokenStatus::Ready,
            _ if exhausted && inner.state.last_error.is_some() => TokenStatus::Error,
            _ if credential.refresh_token().is_some() => TokenStatus::OnRefresh,
            _ => TokenStatus::OnRequest,
        };

        TokenInfo {
            token_type: credential.token_type(),
            status,
            error: inner.state.last_error.clone(),
        }
    }

    /// Uses an ID token obtained by the application, valid for at most one hour.
    ///
    /// Returns whether the token was accepted: empty tokens, the token already held and
    /// calls made while an exchange is in flight are ignored.
    pub fn set_id_token(&self, token: &str, ttl_secs: u64) -> bool {
        let now = self.clock.now();
        let Ok(mut guard) = self.inner.try_borrow_mut() else {
            return false;
        };
        let inner = &mut *guard;
        if inner.state.step == SignerStep::ExchangeInFlight {
            debug!("external ID token ignored, a token exchange is in flight");
            return false;
        }
        inner.observe_clock(now);
        if !inner.store.set_id_token(token, ttl_secs, now) {
            debug!("external ID token ignored");
            return false;
        }

        info!(
            expires_at = inner.store.credential().expires_at(),
            "external ID token set"
        );
        inner.state.attempts = 0;
        inner.skip_backoff = false;
        inner.state.transition(SignerStep::Ready);
        true
    }

    /// Forces a new exchange on the next tick, even if the credential is still valid.
    pub fn refresh_token(&self) -> bool {
        let Ok(mut inner) = self.inner.try_borrow_mut() else {
            return false;
        };
        if inner.config.is_none() || inner.state.step == SignerStep::ExchangeInFlight {
            return false;
        }
        info!("token refresh requested");
        inner.state.attempts = 0;
        inner.skip_backoff = false;
        inner.state.transition(SignerStep::Begin);
        true
    }

    /// A dependent service rejected the credential: it is dropped and a new one acquired on
    /// the next tick.
    pub fn report_rejected(&self) {
        let Ok(mut inner) = self.inner.try_borrow_mut() else {
            return;
        };
        if matches!(
            inner.state.step,
            SignerStep::Idle | SignerStep::ExchangeInFlight
        ) {
            return;
        }
        warn!("credential rejected by a dependent service");
        inner.store.invalidate();
        inner.state.transition(SignerStep::Begin);
    }

    /// Deletes the account owning the held ID token and drops the credential, so dependent
    /// clients stop presenting it. A new credential is acquired on the next tick.
    pub fn delete_user(&self) -> Result<(), AuthError> {
        let (config, id_token) = {
            let Ok(inner) = self.inner.try_borrow() else {
                return Err(AuthError::Config("delete user while the signer is busy".into()));
            };
            if inner.state.step == SignerStep::ExchangeInFlight {
                return Err(AuthError::Config(
                    "delete user while a token exchange is in flight".into(),
                ));
            }
            let config = inner
                .config
                .ok_or_else(|| AuthError::Config("delete user before begin".into()))?;
            let credential = inner.store.credential();
            if credential.token_type() != TokenType::IdToken {
                return Err(AuthError::Config("no user ID token held".into()));
            }
            (config, credential.token().to_owned())
        };

        let accounts = AccountManager::new(
            |req: Request<Vec<u8>>| self.http_client.send(req),
            required_api_key(config)?,
            &self.settings.endpoints,
        );
        accounts.delete_user(&id_token)?;

        let mut inner = self.inner.borrow_mut();
        inner.store.invalidate();
        inner.state.transition(SignerStep::Begin);
        Ok(())
    }

    /// Creates an account and holds its ID token. Empty email and password create an
    /// anonymous account.
    ///
    /// Requires a configuration with an API key. A failure keeps the previous credential.
    pub fn sign_up(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let now = self.clock.now();
        let (strategy, request, previous) = {
            let Ok(mut guard) = self.inner.try_borrow_mut() else {
                return Err(AuthError::Config("sign up while the signer is busy".into()));
            };
            let inner = &mut *guard;
            if inner.state.step == SignerStep::ExchangeInFlight {
                return Err(AuthError::Config(
                    "sign up while a token exchange is in flight".into(),
                ));
            }
            let config = inner
                .config
                .ok_or_else(|| AuthError::Config("sign up before begin".into()))?;
            inner.observe_clock(now);

            let strategy = UserStrategy::new(
                required_api_key(config)?,
                email,
                password,
                &self.settings.endpoints,
            );
            let request = strategy.sign_up_request()?;
            let previous = inner.state.step;
            inner.state.transition(SignerStep::ExchangeInFlight);
            (strategy, request, previous)
        };

        info!("creating account");
        let result = self
            .http_client
            .send(request)
            .map_err(AuthError::from)
            .and_then(|response| strategy.parse_response(response, now));

        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        match result {
            Ok(credential) => {
                inner.state.transition(SignerStep::ExchangeSucceeded);
                self.succeed(inner, credential);
                Ok(())
            }
            Err(err) => {
                warn!(%err, "account creation failed");
                inner.state.last_error = Some(err.clone());
                inner.state.transition(previous);
                Err(err)
            }
        }
    }

    pub fn settings(&self) -> &SignerSettings {
        &self.settings
    }

    pub fn precision(&self) -> Precision {
        self.precision.get()
    }

    /// Values above [`crate::config::precision::MAX_FLOAT_DIGITS`] are ignored.
    pub fn set_float_digits(&self, digits: u8) {
        let mut precision = self.precision.get();
        precision.set_float_digits(digits);
        self.precision.set(precision);
    }

    /// Values above [`crate::config::precision::MAX_DOUBLE_DIGITS`] are ignored.
    pub fn set_double_digits(&self, digits: u8) {
        let mut precision = self.precision.get();
        precision.set_double_digits(digits);
        self.precision.set(precision);
    }
}
