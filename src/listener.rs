//! Embedded HTTP policy server and its served policy view.

pub mod server;
pub mod view;

pub use server::{spawn, ListenerHandle};
pub use view::PolicyView;
