mod amount;
pub mod conformance;
mod expiration;
mod message;
mod notification;
mod snapshot;
mod token;
mod tx;

pub use amount::*;
pub use expiration::*;
pub use message::*;
pub use notification::*;
pub use snapshot::*;
pub use token::*;
pub use tx::*;
