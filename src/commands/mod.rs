//! CLI command handlers.
//!
//! Each handler builds its own current-thread runtime, runs one host
//! operation and prints the result: JSON for structured values, bare scalars
//! otherwise, `false` for a failed operation.

pub mod container;
pub mod dash;
pub mod disk;
pub mod info;
pub mod power;
pub mod updates;

use std::future::Future;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::pipeline::Credential;

pub(crate) fn block_on<F>(fut: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(fut)
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

pub(crate) fn print_json_or_false<T: Serialize>(value: Option<&T>) -> Result<()> {
    match value {
        Some(v) => print_json(v),
        None => {
            println!("false");
            Ok(())
        }
    }
}

pub(crate) fn print_text_or_false(value: Option<&str>) {
    println!("{}", value.unwrap_or("false"));
}

/// `None` for an empty password; the caller prints `false` without running
/// anything.
pub(crate) fn credential(password: String) -> Option<Credential> {
    let credential = Credential::new(password);
    if credential.is_empty() {
        tracing::warn!("empty password, nothing to run");
        None
    } else {
        Some(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_password_is_rejected() {
        assert!(credential(String::new()).is_none());
        assert!(credential("hunter2".into()).is_some());
    }

    #[test]
    fn test_block_on_propagates_errors() {
        assert!(block_on(async { Ok(()) }).is_ok());
        assert!(block_on(async { Err(anyhow::anyhow!("boom")) }).is_err());
    }
}
