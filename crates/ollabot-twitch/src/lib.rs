pub mod adapter;
pub mod error;
pub mod handler;
pub mod send;

pub use adapter::TwitchAdapter;
pub use error::TwitchError;
