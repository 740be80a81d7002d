//! Client-side support for Palaver.
//!
//! [`feed`] keeps locally rendered message and group lists coherent while
//! writes are in flight: a send is shown immediately under a provisional
//! identifier, then reconciled against whichever authoritative copy arrives
//! first (the mutation response or a pushed notification). [`api`] is a thin
//! asynchronous wrapper over the server's REST endpoints.

pub mod api;
pub mod feed;

pub use api::{ClientError, PalaverClient};
pub use feed::{GroupFeed, MessageFeed, PendingGroup, PendingMessage};
