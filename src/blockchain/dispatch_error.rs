// src/blockchain/dispatch_error.rs
//! Decoding of failed dispatches and classification of submission errors.

use std::fmt;
use subxt::error::DispatchError;

use crate::error::{ChainError, TransactionError};

/// Reason an included extrinsic failed to dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchFailure {
    /// A pallet error, resolved against runtime metadata
    Module {
        section: String,
        name: String,
        docs: Vec<String>,
    },
    /// Any other dispatch error in its string form
    Other(String),
}

impl DispatchFailure {
    pub fn module(section: &str, name: &str, docs: &str) -> Self {
        DispatchFailure::Module {
            section: section.to_string(),
            name: name.to_string(),
            docs: if docs.is_empty() { Vec::new() } else { vec![docs.to_string()] },
        }
    }

    /// Decodes a runtime dispatch error using the metadata it carries.
    pub fn from_dispatch_error(error: &DispatchError) -> Self {
        match error {
            DispatchError::Module(module_error) => match module_error.details() {
                Ok(details) => DispatchFailure::Module {
                    section: details.pallet.name().to_string(),
                    name: details.variant.name.clone(),
                    docs: details.variant.docs.clone(),
                },
                Err(_) => DispatchFailure::Other(error.to_string()),
            },
            other => DispatchFailure::Other(other.to_string()),
        }
    }
}

impl fmt::Display for DispatchFailure {
    /// Renders `section.name: docs`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchFailure::Module { section, name, docs } => {
                let docs = docs.join(" ");
                if docs.trim().is_empty() {
                    write!(f, "{}.{}", section, name)
                } else {
                    write!(f, "{}.{}: {}", section, name, docs.trim())
                }
            }
            DispatchFailure::Other(message) => f.write_str(message),
        }
    }
}

/// Classifies an untyped error message by the substrings nodes and signers
/// are known to produce.
///
/// Only used where the transport hands back plain text; typed failures never
/// pass through here.
pub fn classify_message(message: &str) -> TransactionError {
    let lower = message.to_ascii_lowercase();
    if message.contains("1010")
        || lower.contains("inability to pay")
        || lower.contains("insufficient balance")
    {
        TransactionError::InsufficientBalance(message.to_string())
    } else if lower.contains("rejected") || lower.contains("cancelled") {
        TransactionError::Rejected(message.to_string())
    } else {
        TransactionError::Transport(message.to_string())
    }
}

/// Maps a seam error raised during submission to a transaction error.
pub fn classify_chain_error(error: ChainError) -> TransactionError {
    match error {
        ChainError::Transport(message) => classify_message(&message),
        ChainError::InvalidAddress(_) | ChainError::InvalidArgument(_) => {
            TransactionError::InvalidInput(error.to_string())
        }
        other => TransactionError::Transport(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransactionErrorKind;

    #[test]
    fn test_module_failure_display() {
        let failure = DispatchFailure::module("credential", "CredentialNotFound", "Credential not found");
        assert_eq!(failure.to_string(), "credential.CredentialNotFound: Credential not found");

        let bare = DispatchFailure::module("did", "DidAlreadyExists", "");
        assert_eq!(bare.to_string(), "did.DidAlreadyExists");
        assert_eq!(DispatchFailure::Other("BadOrigin".into()).to_string(), "BadOrigin");
    }

    #[test]
    fn test_classify_message() {
        let pay = classify_message("Invalid Transaction (1010): Inability to pay some fees");
        assert_eq!(pay.kind(), TransactionErrorKind::InsufficientBalance);

        let rejected = classify_message("Cancelled by user");
        assert_eq!(rejected.kind(), TransactionErrorKind::Rejected);

        let other = classify_message("connection reset");
        assert_eq!(other.kind(), TransactionErrorKind::Transport);
    }

    #[test]
    fn test_classify_chain_error_keeps_non_transport_errors() {
        let error = classify_chain_error(ChainError::InvalidAddress("nope".into()));
        assert_eq!(error.kind(), TransactionErrorKind::InvalidInput);
        assert!(error.to_string().contains("nope"));

        let error = classify_chain_error(ChainError::Connection("refused".into()));
        assert_eq!(error.kind(), TransactionErrorKind::Transport);
    }
}
