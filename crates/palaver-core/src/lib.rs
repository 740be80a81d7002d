//! Shared primitives for the Palaver group-chat services. These types cross
//! the wire between the server, the notification bus, and client caches, so
//! they live in one crate instead of being copied per binary.

mod cursor;
mod error;
mod event;
mod model;
mod page;

pub use cursor::{Cursor, CursorError};
pub use error::{EntityKind, Error};
pub use event::{Event, Topic};
pub use model::{Group, GroupId, Message, MessageId, User, UserId};
pub use page::{Connection, Edge, PageArgs, PageInfo};
