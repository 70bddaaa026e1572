pub mod binder;
pub mod dev_server;
pub mod request;
pub mod response;
pub mod service;

pub use binder::{BindState, Listening, PortBinder};
pub use dev_server::{DevServer, ServerOptions, ServerSession};
pub use request::{parse_request, IncomingRequest};
pub use response::{FinalResponse, ResponseAccumulator};
pub use service::DevService;
