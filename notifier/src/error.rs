//! Error types for the `notifier` crate.
//!
//! A root `Error` struct holds an error kind enum plus an optional source for
//! error chaining. Kinds exist so callers (the web layer in particular) can
//! translate failures into appropriate HTTP status codes without matching on
//! strings.
//!
//! Delivery problems caused by slow or vanished clients are deliberately NOT
//! represented here: those are absorbed by the dispatcher and surface only as
//! drop counts. An `Error` always means the caller misused the API.

use std::error::Error as StdError;
use std::fmt;

/// Top-level error type for the notifier crate.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Major categories of errors in the notifier.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    Group(GroupErrorKind),
    Subscription(SubscriptionErrorKind),
    Delivery(DeliveryErrorKind),
}

/// Errors from group key construction.
#[derive(Debug, PartialEq)]
pub enum GroupErrorKind {
    EmptyKey,
}

/// Errors from subscription bookkeeping.
#[derive(Debug, PartialEq)]
pub enum SubscriptionErrorKind {
    ConnectionNotActive,
}

/// Errors from event delivery.
#[derive(Debug, PartialEq)]
pub enum DeliveryErrorKind {
    ConnectionNotReady,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::Group(kind) => write!(f, "Group error: {:?}", kind),
            ErrorKind::Subscription(kind) => write!(f, "Subscription error: {:?}", kind),
            ErrorKind::Delivery(kind) => write!(f, "Delivery error: {:?}", kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

/// Helper function to create group errors.
pub fn group_error(kind: GroupErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Group(kind),
    }
}

/// Helper function to create subscription errors.
pub fn subscription_error(kind: SubscriptionErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Subscription(kind),
    }
}

/// Helper function to create delivery errors.
pub fn delivery_error(kind: DeliveryErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Delivery(kind),
    }
}
