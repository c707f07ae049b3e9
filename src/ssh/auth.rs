// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! SSH authentication.
//!
//! Credentials accumulate in an [`AuthStack`]; at connect time the stack
//! offers them to the server in priority order (agent, key file, key
//! bytes, then keyboard-interactive and plain password) and the first
//! accepted method wins.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use russh::client::{Handle, Handler, KeyboardInteractiveAuthResponse};
use russh::keys::{PrivateKey, PrivateKeyWithHashAlg};
use zeroize::Zeroizing;

use crate::error::Error;

/// Credentials and flags for the authentication attempt.
#[derive(Debug, Default)]
pub(crate) struct AuthStack {
    use_agent: bool,
    key_path: Option<(PathBuf, Option<Zeroizing<String>>)>,
    key_bytes: Option<(Zeroizing<String>, Option<Zeroizing<String>>)>,
    password: Option<Zeroizing<String>>,
}

impl AuthStack {
    pub(crate) fn with_agent(mut self) -> Self {
        self.use_agent = true;
        self
    }

    pub(crate) fn with_key_path(mut self, path: PathBuf, passphrase: Option<&str>) -> Self {
        self.key_path = Some((path, passphrase.map(|p| Zeroizing::new(p.to_string()))));
        self
    }

    pub(crate) fn with_key_bytes(mut self, key_data: String, passphrase: Option<&str>) -> Self {
        self.key_bytes = Some((
            Zeroizing::new(key_data),
            passphrase.map(|p| Zeroizing::new(p.to_string())),
        ));
        self
    }

    pub(crate) fn with_password(mut self, password: String) -> Self {
        self.password = Some(Zeroizing::new(password));
        self
    }

    pub(crate) fn is_empty(&self) -> bool {
        !self.use_agent
            && self.key_path.is_none()
            && self.key_bytes.is_none()
            && self.password.is_none()
    }

    /// Offer every configured method until the server accepts one.
    /// Collected per-method failures form the final error when none is
    /// accepted.
    pub(crate) async fn authenticate<H: Handler>(
        &self,
        handle: &mut Handle<H>,
        user: &str,
    ) -> Result<(), Error> {
        let mut failures: Vec<String> = Vec::new();

        if self.use_agent {
            match authenticate_agent(handle, user).await {
                Ok(true) => return Ok(()),
                Ok(false) => failures.push("agent: no identity accepted".to_string()),
                Err(e) => failures.push(format!("agent: {e}")),
            }
        }

        if let Some((path, passphrase)) = &self.key_path {
            match load_key_file(path, passphrase.as_ref().map(|p| p.as_str())) {
                Ok(key) => match authenticate_key(handle, user, key).await {
                    Ok(true) => return Ok(()),
                    Ok(false) => failures.push("key file: rejected by server".to_string()),
                    Err(e) => failures.push(format!("key file: {e}")),
                },
                Err(e) => failures.push(format!("read key file: {e}")),
            }
        }

        if let Some((key_data, passphrase)) = &self.key_bytes {
            match parse_key(key_data, passphrase.as_ref().map(|p| p.as_str())) {
                Ok(key) => match authenticate_key(handle, user, key).await {
                    Ok(true) => return Ok(()),
                    Ok(false) => failures.push("key bytes: rejected by server".to_string()),
                    Err(e) => failures.push(format!("key bytes: {e}")),
                },
                Err(e) => failures.push(format!("read key bytes: {e}")),
            }
        }

        if let Some(password) = &self.password {
            match authenticate_keyboard_interactive(handle, user, password).await {
                Ok(true) => return Ok(()),
                Ok(false) => failures.push("keyboard-interactive: rejected".to_string()),
                Err(e) => failures.push(format!("keyboard-interactive: {e}")),
            }
            match handle.authenticate_password(user, password.as_str()).await {
                Ok(result) if result.success() => return Ok(()),
                Ok(_) => failures.push("password: rejected by server".to_string()),
                Err(e) => failures.push(format!("password: {e}")),
            }
        }

        if failures.is_empty() {
            return Err(Error::Auth("no valid auth methods available".into()));
        }
        tracing::error!(user, failures = ?failures, "all authentication methods failed");
        Err(Error::Auth(failures.join("; ")))
    }
}

/// Parse a PEM-encoded private key, decrypting when a passphrase is
/// given. A passphrase supplied for an unencrypted key falls back to
/// plain parsing.
fn parse_key(key_data: &str, passphrase: Option<&str>) -> Result<PrivateKey, Error> {
    match russh::keys::decode_secret_key(key_data, passphrase) {
        Ok(key) => Ok(key),
        Err(first) if passphrase.is_some() => {
            russh::keys::decode_secret_key(key_data, None).map_err(|_| Error::Key(first))
        }
        Err(e) => Err(Error::Key(e)),
    }
}

/// Load a private key from disk with the same passphrase fallback as
/// [`parse_key`].
fn load_key_file(path: &Path, passphrase: Option<&str>) -> Result<PrivateKey, Error> {
    match russh::keys::load_secret_key(path, passphrase) {
        Ok(key) => Ok(key),
        Err(first) if passphrase.is_some() => {
            russh::keys::load_secret_key(path, None).map_err(|_| Error::Key(first))
        }
        Err(e) => Err(Error::Key(e)),
    }
}

async fn authenticate_key<H: Handler>(
    handle: &mut Handle<H>,
    user: &str,
    key: PrivateKey,
) -> Result<bool, Error> {
    let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
    let result = handle
        .authenticate_publickey(user, PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg))
        .await?;
    Ok(result.success())
}

async fn authenticate_agent<H: Handler>(
    handle: &mut Handle<H>,
    user: &str,
) -> Result<bool, Error> {
    let mut agent = russh::keys::agent::client::AgentClient::connect_env()
        .await
        .map_err(|e| Error::Auth(format!("dial agent: {e}")))?;

    let identities = agent
        .request_identities()
        .await
        .map_err(|e| Error::Auth(format!("request agent identities: {e}")))?;
    if identities.is_empty() {
        return Err(Error::Auth("no identities available in agent".into()));
    }

    for identity in identities {
        let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
        match handle
            .authenticate_publickey_with(user, identity, hash_alg, &mut agent)
            .await
        {
            Ok(result) if result.success() => return Ok(true),
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "agent identity attempt failed");
            }
        }
    }
    Ok(false)
}

/// Keyboard-interactive authentication answering every server prompt
/// with the configured password.
async fn authenticate_keyboard_interactive<H: Handler>(
    handle: &mut Handle<H>,
    user: &str,
    password: &str,
) -> Result<bool, Error> {
    let mut response = handle
        .authenticate_keyboard_interactive_start(user, Option::<String>::None)
        .await?;
    loop {
        match response {
            KeyboardInteractiveAuthResponse::Success => return Ok(true),
            KeyboardInteractiveAuthResponse::Failure { .. } => return Ok(false),
            KeyboardInteractiveAuthResponse::InfoRequest { prompts, .. } => {
                let answers = prompts.iter().map(|_| password.to_string()).collect();
                response = handle
                    .authenticate_keyboard_interactive_respond(answers)
                    .await?;
            }
            _ => return Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stack_is_detected() {
        assert!(AuthStack::default().is_empty());
        assert!(!AuthStack::default().with_agent().is_empty());
        assert!(!AuthStack::default()
            .with_password("secret".into())
            .is_empty());
    }

    #[test]
    fn invalid_key_data_is_rejected() {
        let err = parse_key("not a key", None).unwrap_err();
        assert!(matches!(err, Error::Key(_)));
    }

    #[test]
    fn missing_key_file_is_rejected() {
        let err = load_key_file(Path::new("/no/such/id_ed25519"), None).unwrap_err();
        assert!(matches!(err, Error::Key(_)));
    }
}
