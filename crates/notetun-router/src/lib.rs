//! Request router and tunnel engine (§4.7-§4.8): the facade front-ends
//! build against, and the CONNECT-style tunnel loop built on top of it.

pub mod contract;
pub mod router;
pub mod tunnel;

pub use contract::{NoteTransport, RouterError};
pub use router::Router;
pub use tunnel::{
    client_connect, client_setup, run_client_tunnel, worker_handle_request, TunnelConfig,
    TunnelError,
};
