pub mod request;
pub mod response;
pub mod search;

pub use request::*;
pub use response::*;
pub use search::*;
