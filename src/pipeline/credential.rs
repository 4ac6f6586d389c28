//! Credential relay — hands the privilege-escalation secret to the first
//! stage through its own stdin pipe, never through argv.

use secrecy::{ExposeSecret, SecretString};
use tokio::io::AsyncWriteExt;
use tokio::process::Child;
use tracing::debug;

/// Secret supplied per invocation for the escalation tool (`sudo -S`).
#[derive(Debug)]
pub struct Credential(SecretString);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(SecretString::from(secret.into()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }
}

/// Write the secret and a newline to the child's stdin, then close it.
///
/// The escalation tool may exit or skip reading (cached credentials), so a
/// broken pipe is not an error here.
pub(crate) async fn relay(child: &mut Child, credential: &Credential, program: &str) {
    let Some(mut stdin) = child.stdin.take() else {
        return;
    };

    let written = async {
        stdin
            .write_all(credential.0.expose_secret().as_bytes())
            .await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await
    }
    .await;

    if let Err(e) = written {
        debug!(program = %program, error = %e, "credential not consumed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let credential = Credential::new("hunter2");
        let rendered = format!("{:?}", credential);
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_empty_credential() {
        assert!(Credential::new("").is_empty());
        assert!(!Credential::new("x").is_empty());
    }
}
