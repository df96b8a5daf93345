//! Account login: phone number, verification code and the optional
//! two-factor password.
//!
//! ```text
//! Unauthenticated --submit_phone--> CodeRequested --(code sent)--> AwaitingCode
//! AwaitingCode --submit_code--> Authenticated | AwaitingPassword
//! AwaitingPassword --submit_password--> Authenticated
//! ```

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::{
    errors::Error,
    operator::Operator,
    recovery::Recovery,
    rpc::{
        tl::{self, method, Authorization},
        RpcClient,
    },
    Result,
};

pub mod srp;

/// Platform reasons after which the current step can simply be retried.
const RETRY_SAME_STATE: &[&str] = &[
    "PHONE_CODE_INVALID",
    "PHONE_CODE_EMPTY",
    "PASSWORD_HASH_INVALID",
    "SRP_ID_INVALID",
    "SRP_PASSWORD_CHANGED",
];

#[derive(Clone, Debug)]
pub struct Credentials {
    pub api_id: i32,
    pub api_hash: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    CodeRequested { phone: String },
    AwaitingCode { phone: String, phone_code_hash: String },
    AwaitingPassword { phone: String },
    Authenticated,
}

impl AuthState {
    fn name(&self) -> &'static str {
        match self {
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::CodeRequested { .. } => "code-requested",
            AuthState::AwaitingCode { .. } => "awaiting-code",
            AuthState::AwaitingPassword { .. } => "awaiting-password",
            AuthState::Authenticated => "authenticated",
        }
    }
}

/// Outcome of a successful transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthStep {
    CodeSent,
    PasswordRequired,
    Authorized,
}

pub struct AuthSession {
    rpc: Arc<dyn RpcClient>,
    credentials: Credentials,
    state: AuthState,
}

impl AuthSession {
    pub fn new(rpc: Arc<dyn RpcClient>, credentials: Credentials) -> Self {
        Self {
            rpc,
            credentials,
            state: AuthState::Unauthenticated,
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == AuthState::Authenticated
    }

    /// Drop any partial progress and start over from the phone number.
    pub fn reset(&mut self) {
        self.state = AuthState::Unauthenticated;
    }

    /// Probe whether the transport session already carries an authorization.
    pub async fn is_authorized(&mut self) -> Result<bool> {
        match self.rpc.call(method::GET_STATE, json!({})).await {
            Ok(_) => {
                self.state = AuthState::Authenticated;
                Ok(true)
            }
            Err(e) if e.is_unauthorized() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Request a login code. A datacenter redirect is followed exactly once.
    pub async fn submit_phone(&mut self, phone: &str) -> Result<AuthStep> {
        match &self.state {
            AuthState::Unauthenticated | AuthState::CodeRequested { .. } => {}
            other => return Err(unexpected("submit_phone", other)),
        }
        let phone = phone.trim().to_string();
        self.state = AuthState::CodeRequested {
            phone: phone.clone(),
        };

        let params = tl::send_code(&phone, &self.credentials);
        let sent = match self.rpc.call(method::SEND_CODE, params.clone()).await {
            Ok(v) => v,
            Err(e) => match e.migrate_dc() {
                Some(dc) => {
                    info!(dc, "migrating to datacenter");
                    self.rpc.set_default_dc(dc);
                    self.rpc.call(method::SEND_CODE, params).await?
                }
                None => return Err(e.into()),
            },
        };

        let phone_code_hash = tl::parse_sent_code(&sent)?;
        self.state = AuthState::AwaitingCode {
            phone,
            phone_code_hash,
        };
        Ok(AuthStep::CodeSent)
    }

    pub async fn submit_code(&mut self, code: &str) -> Result<AuthStep> {
        let AuthState::AwaitingCode {
            phone,
            phone_code_hash,
        } = &self.state
        else {
            return Err(unexpected("submit_code", &self.state));
        };
        let phone = phone.clone();
        let params = tl::sign_in(&phone, phone_code_hash, code.trim());

        match self.rpc.call(method::SIGN_IN, params).await {
            Ok(v) => {
                ensure_signed_in(&v)?;
                self.state = AuthState::Authenticated;
                Ok(AuthStep::Authorized)
            }
            Err(e) if e.is_password_needed() => {
                self.state = AuthState::AwaitingPassword { phone };
                Ok(AuthStep::PasswordRequired)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn submit_password(&mut self, password: &str) -> Result<AuthStep> {
        if !matches!(self.state, AuthState::AwaitingPassword { .. }) {
            return Err(unexpected("submit_password", &self.state));
        }

        let v = self.rpc.call(method::GET_PASSWORD, json!({})).await?;
        let params = tl::parse_password(&v)?;
        debug!(srp_id = params.srp_id, kdf = ?params.algo.kdf, "computing srp proof");
        let proof = srp::compute_proof(password, &params)?;

        let v = self
            .rpc
            .call(method::CHECK_PASSWORD, tl::check_password(&proof))
            .await?;
        ensure_signed_in(&v)?;
        self.state = AuthState::Authenticated;
        Ok(AuthStep::Authorized)
    }

    /// Drive the state machine to `Authenticated`, prompting the operator.
    ///
    /// Recoverable failures retry the current state after the recovery pause;
    /// anything else restarts from the phone number.
    pub async fn login(&mut self, operator: &dyn Operator, recovery: &mut Recovery) -> Result<()> {
        match self.is_authorized().await {
            Ok(true) => {
                info!("session already authorized");
                operator.tell("Already logged in.").await?;
                return Ok(());
            }
            Ok(false) => {}
            Err(e) => warn!(error = %e, "authorization probe failed"),
        }

        operator.tell("Starting authentication...").await?;
        while !self.is_authenticated() {
            match self.step(operator).await {
                Ok(()) => recovery.reset(),
                Err(e) if e.is_terminal() => return Err(e),
                Err(e) => {
                    if !retries_same_state(&e) {
                        warn!(state = self.state.name(), error = %e, "restarting login");
                        self.reset();
                    }
                    operator.tell(&format!("Authentication error: {e}")).await?;
                    recovery.recover("login", &e).await?;
                }
            }
        }
        Ok(())
    }

    async fn step(&mut self, operator: &dyn Operator) -> Result<()> {
        match self.state.clone() {
            AuthState::Unauthenticated => {
                let phone = operator
                    .ask("Enter your phone number (e.g. 5511999999999): ")
                    .await?;
                operator.tell("Sending verification code...").await?;
                self.submit_phone(&phone).await?;
                operator.tell("Code sent!").await?;
            }
            AuthState::CodeRequested { phone } => {
                operator.tell("Sending verification code...").await?;
                self.submit_phone(&phone).await?;
                operator.tell("Code sent!").await?;
            }
            AuthState::AwaitingCode { .. } => {
                let code = operator.ask("Enter the code you received: ").await?;
                match self.submit_code(&code).await? {
                    AuthStep::PasswordRequired => {
                        operator.tell("Two-factor authentication required.").await?
                    }
                    _ => operator.tell("Logged in successfully!").await?,
                }
            }
            AuthState::AwaitingPassword { .. } => {
                let password = operator.ask("Enter your 2FA password: ").await?;
                self.submit_password(&password).await?;
                operator.tell("Logged in with 2FA successfully!").await?;
            }
            AuthState::Authenticated => {}
        }
        Ok(())
    }
}

fn ensure_signed_in(v: &serde_json::Value) -> Result<()> {
    match tl::parse_authorization(v) {
        Authorization::SignedIn => Ok(()),
        Authorization::SignUpRequired => Err(Error::External(
            "phone number is not registered; sign up with an official client first".to_string(),
        )),
    }
}

fn retries_same_state(err: &Error) -> bool {
    match err {
        Error::Rpc(e) => {
            e.is_transient()
                || e.is_rate_limited()
                || RETRY_SAME_STATE.contains(&e.message.as_str())
        }
        _ => false,
    }
}

fn unexpected(op: &str, state: &AuthState) -> Error {
    Error::External(format!("{op} is not valid in state {}", state.name()))
}
