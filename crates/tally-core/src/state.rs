//! Shared state and partial updates
//!
//! [`SharedState`] is the singleton record every client reads and writes.
//! Writes arrive as a [`StatePatch`]: each field is either absent (keep the
//! old value) or present (replace it), so "not sent" and "sent as the
//! default value" never collapse into one case.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The singleton counter/message record
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SharedState {
    /// Signed counter, starts at 0
    pub counter: i64,
    /// Free-form message, starts empty
    pub message: String,
}

impl SharedState {
    /// Create a state with explicit values
    pub fn new(counter: i64, message: impl Into<String>) -> Self {
        Self {
            counter,
            message: message.into(),
        }
    }
}

/// A mutable field of [`SharedState`]
///
/// The declaration order is the order fields appear in an `update_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UpdateField {
    Counter,
    Message,
}

impl UpdateField {
    /// Wire name of the field
    pub fn as_str(self) -> &'static str {
        match self {
            UpdateField::Counter => "counter",
            UpdateField::Message => "message",
        }
    }
}

impl fmt::Display for UpdateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Partial update of [`SharedState`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatePatch {
    /// New counter value, if the caller sent one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counter: Option<i64>,
    /// New message, if the caller sent one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatePatch {
    /// Create an empty patch
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the counter
    pub fn with_counter(mut self, counter: i64) -> Self {
        self.counter = Some(counter);
        self
    }

    /// Set the message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// True when no field is present
    pub fn is_empty(&self) -> bool {
        self.counter.is_none() && self.message.is_none()
    }

    /// Fields present in this patch, in `update_type` order
    pub fn fields(&self) -> Vec<UpdateField> {
        let mut fields = Vec::with_capacity(2);
        if self.counter.is_some() {
            fields.push(UpdateField::Counter);
        }
        if self.message.is_some() {
            fields.push(UpdateField::Message);
        }
        fields
    }

    /// Summary of the present fields, e.g. `"counter, message"`
    ///
    /// A field counts when it is present, even if its value equals the
    /// current one. An empty patch yields `""`.
    pub fn update_type(&self) -> String {
        self.fields()
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Overlay this patch on `base`
    pub fn apply_to(&self, base: &SharedState) -> SharedState {
        SharedState {
            counter: self.counter.unwrap_or(base.counter),
            message: self
                .message
                .clone()
                .unwrap_or_else(|| base.message.clone()),
        }
    }
}
