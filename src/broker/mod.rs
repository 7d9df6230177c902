//! Generic in-process publish/subscribe broker
//!
//! The broker fans each published item out to every active subscriber
//! without ever blocking the publisher on a slow consumer.
//!
//! # Architecture
//!
//! ```text
//!                    Arc<Broker<T>>
//!            ┌──────────────────────────────┐
//!            │ ctl_tx: mpsc::Sender<Command>│
//!            │ running: AtomicBool          │
//!            └──────────────┬───────────────┘
//!                           │ Subscribe / Unsubscribe / Publish / Stop
//!                           ▼
//!                  [control loop task]
//!            owns HashMap<u64, mpsc::Sender<T>>
//!                           │ try_send (drop on full)
//!          ┌────────────────┼────────────────┐
//!          ▼                ▼                ▼
//!     [Subscriber]     [Subscriber]     [Subscriber]
//!     inbox.recv()     inbox.recv()     inbox.recv()
//! ```
//!
//! # Serialized mutation
//!
//! The subscriber set is owned exclusively by the control loop task and
//! mutated only while processing one command at a time, so every
//! membership change is atomic with respect to every other change and
//! no locking is needed. Publishing uses a non-blocking `try_send` into
//! each bounded inbox; a full inbox drops the item for that subscriber
//! only, so one stalled reader never delays delivery to the others.

pub mod config;
pub mod hub;

pub use config::BrokerConfig;
pub use hub::{Broker, BrokerStats, Subscription};
