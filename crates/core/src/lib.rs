pub mod cancel;
pub mod error;
pub mod gateway;
pub mod media;
pub mod nat;
pub mod protocol;
pub mod proxy;
pub mod server;
pub mod session;
pub mod transport;

pub use cancel::StopSignal;
pub use error::{Result, RtspError};
pub use server::{Role, Server, ServerConfig};
