//! Server
//!
//! The hub as a user object, plus the RPC surface remote clients use to
//! inspect the object table and take part in the message bus.

mod methods;
mod object;
mod protocol;
mod session;

pub use methods::{MethodTable, RpcContext};
pub use object::{SERVER_CLASS, SERVER_UUID, ServerObject, ServerSettings};
pub use protocol::{Arguments, RpcError, RpcResult, ServerFrame};
pub use session::{RemoteSubscriber, Session};
