//! Stream and subscriber types
//!
//! A `Stream` is a named routing endpoint; a `Subscriber` is one
//! producer's inbound channel endpoint attached to it. Both are
//! immutable once the bus is frozen.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};

use weir_config::ConfigError;
use weir_message::{Message, StreamId};

use crate::{Filter, Formatter};

/// How long a blocking send may wait for channel capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelTimeout {
    /// Zero timeout: one `try_send`, no waiting
    TryOnce,
    /// Negative timeout: wait until capacity frees up
    Forever,
    /// Positive timeout: wait up to the deadline
    Deadline(Duration),
}

impl ChannelTimeout {
    /// Map a `ChannelTimeoutMs` config value onto a timeout
    ///
    /// Negative means wait forever, zero means try once, positive is a
    /// deadline in milliseconds.
    pub fn from_millis(ms: i64) -> Self {
        match ms {
            ms if ms < 0 => ChannelTimeout::Forever,
            0 => ChannelTimeout::TryOnce,
            ms => ChannelTimeout::Deadline(Duration::from_millis(ms as u64)),
        }
    }
}

/// What to do when a subscriber cannot accept a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Wait up to the stream timeout, then fall back to the reroute path
    #[default]
    Block,
    /// Discard immediately and count
    Drop,
    /// Readdress to the stream's fallback and resubmit
    Reroute,
}

impl OverflowPolicy {
    /// Parse a policy name from configuration
    pub fn parse(value: &str, plugin: &str) -> Result<Self, ConfigError> {
        match value.to_ascii_lowercase().as_str() {
            "block" => Ok(OverflowPolicy::Block),
            "drop" => Ok(OverflowPolicy::Drop),
            "reroute" => Ok(OverflowPolicy::Reroute),
            other => Err(ConfigError::invalid_value(
                plugin,
                "OverflowPolicy",
                format!("unknown policy '{}', expected block, drop or reroute", other),
            )),
        }
    }
}

/// Result of offering a message to one subscriber
#[derive(Debug)]
pub enum SendOutcome {
    /// The subscriber took the message
    Delivered,
    /// Channel full, closed, or subscriber inactive; message returned
    /// for fallback handling
    Rejected(Message),
}

/// A producer's inbound endpoint, attached to one or more streams
///
/// Cloning a subscriber clones the channel sender and shares the
/// activity flag, so the same producer can subscribe to several streams.
#[derive(Clone)]
pub struct Subscriber {
    name: Arc<str>,
    sender: mpsc::Sender<Message>,
    capacity: usize,
    active: Arc<AtomicBool>,
    timeout: Option<ChannelTimeout>,
}

impl Subscriber {
    /// Create a subscriber delivering into `sender`
    pub fn new(name: impl Into<Arc<str>>, sender: mpsc::Sender<Message>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            sender,
            capacity,
            active: Arc::new(AtomicBool::new(true)),
            timeout: None,
        }
    }

    /// Override the stream timeout for sends to this subscriber
    ///
    /// Producers declare this via `ChannelTimeoutMs`; unset means the
    /// stream's own timeout applies.
    #[must_use]
    pub fn with_timeout(mut self, timeout: ChannelTimeout) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Producer instance name, for logging
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inbound channel capacity
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The shared activity flag
    ///
    /// Fuse burn callbacks clear this so the bus applies the overflow
    /// fallback instead of queueing into a dead backend.
    #[inline]
    pub fn activity_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.active)
    }

    /// Whether the subscriber currently accepts traffic
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Whether the producer side has gone away
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Per-subscriber timeout override, if declared
    #[inline]
    pub(crate) fn timeout_override(&self) -> Option<ChannelTimeout> {
        self.timeout
    }

    /// One non-blocking delivery attempt
    pub fn try_send(&self, msg: Message) -> SendOutcome {
        match self.sender.try_send(msg) {
            Ok(()) => SendOutcome::Delivered,
            Err(TrySendError::Full(msg)) | Err(TrySendError::Closed(msg)) => {
                SendOutcome::Rejected(msg)
            }
        }
    }

    /// Delivery bounded by `timeout`
    pub async fn send(&self, msg: Message, timeout: ChannelTimeout) -> SendOutcome {
        match timeout {
            ChannelTimeout::TryOnce => self.try_send(msg),
            ChannelTimeout::Forever => match self.sender.send(msg).await {
                Ok(()) => SendOutcome::Delivered,
                Err(err) => SendOutcome::Rejected(err.0),
            },
            ChannelTimeout::Deadline(deadline) => {
                match self.sender.send_timeout(msg, deadline).await {
                    Ok(()) => SendOutcome::Delivered,
                    Err(SendTimeoutError::Timeout(msg)) | Err(SendTimeoutError::Closed(msg)) => {
                        SendOutcome::Rejected(msg)
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("active", &self.is_active())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A named routing endpoint, immutable after freeze
pub struct Stream {
    pub(crate) name: Arc<str>,
    pub(crate) id: StreamId,
    pub(crate) subscribers: Vec<Subscriber>,
    pub(crate) filters: Vec<Box<dyn Filter>>,
    pub(crate) formatters: Vec<Box<dyn Formatter>>,
    pub(crate) timeout: ChannelTimeout,
    pub(crate) policy: OverflowPolicy,
    pub(crate) drop_to: StreamId,
}

impl Stream {
    /// The stream name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The interned id
    #[inline]
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Subscribed producers, in subscription order
    #[inline]
    pub fn subscribers(&self) -> &[Subscriber] {
        &self.subscribers
    }

    /// The overflow policy applied on full channels
    #[inline]
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Timeout for blocking sends
    #[inline]
    pub fn timeout(&self) -> ChannelTimeout {
        self.timeout
    }

    /// Fallback stream for rerouted messages
    #[inline]
    pub fn drop_to(&self) -> StreamId {
        self.drop_to
    }

    /// Names of the attached filters, for diagnostics
    pub fn filter_names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Names of the attached formatters, for diagnostics
    pub fn formatter_names(&self) -> Vec<&'static str> {
        self.formatters.iter().map(|f| f.name()).collect()
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("subscribers", &self.subscribers.len())
            .field("filters", &self.filter_names())
            .field("formatters", &self.formatter_names())
            .field("policy", &self.policy)
            .finish()
    }
}
