pub mod complaint;
pub mod event;
pub mod response;
pub mod user;

pub use complaint::*;
pub use event::*;
pub use response::*;
pub use user::*;
