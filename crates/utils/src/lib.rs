pub mod config;
pub mod delivery;
pub mod error;
pub mod exec;
pub mod host;
pub mod message;
pub mod mime;
pub mod pipeline;
pub mod resolver;
pub mod rewriter;

pub use config::*;
pub use delivery::*;
pub use error::*;
pub use exec::*;
pub use host::*;
pub use message::*;
pub use mime::*;
pub use pipeline::*;
pub use resolver::*;
pub use rewriter::*;
