//! Credentials for remote source repositories.
use std::path::PathBuf;

use git2::{Cred, CredentialType};
use serde::Deserialize;

/// Environment variables consulted, in order, when no token is configured.
pub const TOKEN_VARS: [&str; 2] = ["GITHUB_TOKEN", "GIT_TOKEN"];
/// Environment variable holding the git username.
pub const USERNAME_VAR: &str = "GIT_USERNAME";
/// Environment variable holding the SSH private key path.
pub const SSH_KEY_VAR: &str = "GIT_SSH_KEY";
/// Environment variable holding the SSH key passphrase.
pub const SSH_PASSPHRASE_VAR: &str = "GIT_SSH_PASSPHRASE";

/// Username sent with a bare token when none is configured.
const TOKEN_USERNAME: &str = "x-access-token";

/// `[source.auth]`.
///
/// Every field is optional; unset fields are filled from the environment
/// by [`with_env_fallback`](Self::with_env_fallback).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// HTTPS token.
    pub token: Option<String>,
    /// Username for token or SSH auth.
    pub username: Option<String>,
    /// SSH private key.
    pub ssh_key_path: Option<PathBuf>,
    /// Passphrase for `ssh_key_path`.
    pub ssh_passphrase: Option<String>,
}

impl AuthConfig {
    /// Fill unset fields from the process environment.
    #[must_use]
    pub fn with_env_fallback(self) -> Self {
        self.fill_from(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
    }

    /// Fill unset fields from `lookup`.
    #[must_use]
    pub fn fill_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if self.token.is_none() {
            self.token = TOKEN_VARS.iter().find_map(|name| lookup(name));
        }
        if self.username.is_none() {
            self.username = lookup(USERNAME_VAR);
        }
        if self.ssh_key_path.is_none() {
            self.ssh_key_path = lookup(SSH_KEY_VAR).map(PathBuf::from);
        }
        if self.ssh_passphrase.is_none() {
            self.ssh_passphrase = lookup(SSH_PASSPHRASE_VAR);
        }
        self
    }

    /// Which kind of credential [`credential`](Self::credential) will hand
    /// libgit2 for the `allowed` types.
    #[must_use]
    pub fn kind(&self, allowed: CredentialType) -> Option<CredentialKind> {
        if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) && self.token.is_some() {
            Some(CredentialKind::Token)
        } else if allowed.contains(CredentialType::SSH_KEY) {
            if self.ssh_key_path.is_some() {
                Some(CredentialKind::SshKey)
            } else {
                Some(CredentialKind::SshAgent)
            }
        } else if allowed.contains(CredentialType::DEFAULT) {
            Some(CredentialKind::Default)
        } else {
            None
        }
    }

    /// Build a credential for libgit2's `credentials` callback.
    ///
    /// # Errors
    ///
    /// Returns a [`git2::Error`] when none of the `allowed` types can be
    /// satisfied.
    pub fn credential(
        &self,
        username_from_url: Option<&str>,
        allowed: CredentialType,
    ) -> Result<Cred, git2::Error> {
        let user = self
            .username
            .as_deref()
            .or(username_from_url)
            .unwrap_or("git");
        match self.kind(allowed) {
            Some(CredentialKind::Token) => {
                let token = self.token.as_deref().unwrap_or_default();
                let user = self.username.as_deref().unwrap_or(TOKEN_USERNAME);
                Cred::userpass_plaintext(user, token)
            }
            Some(CredentialKind::SshKey | CredentialKind::SshAgent) => {
                match self.ssh_key_path.as_deref() {
                    Some(key) => Cred::ssh_key(user, None, key, self.ssh_passphrase.as_deref()),
                    None => Cred::ssh_key_from_agent(user),
                }
            }
            Some(CredentialKind::Default) => Cred::default(),
            None => Err(git2::Error::from_str(
                "no configured credential matches what the remote accepts",
            )),
        }
    }
}

/// Credential flavours handed to libgit2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    /// Username plus token over HTTPS.
    Token,
    /// SSH private key file.
    SshKey,
    /// Keys from the running SSH agent.
    SshAgent,
    /// libgit2 default credentials.
    Default,
}
