//! Connection Handling Module
//!
//! One task per accepted connection, each running a single
//! read-dispatch-write cycle against the shared query engine:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                     (server module)                         │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ accept() + admission gate
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌────────────┐   ┌────────────┐   ┌────────────────────┐  │
//! │  │ Read line  │──▶│ Rate limit │──▶│ Cache / DataSource │  │
//! │  └────────────┘   └────────────┘   └─────────┬──────────┘  │
//! │                                              ▼             │
//! │                                      ┌──────────────┐      │
//! │                                      │ Write + close│      │
//! │                                      └──────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod handler;

// Re-export commonly used types
pub use handler::{handle_connection, ConnectionContext, ConnectionError, ConnectionHandler};
