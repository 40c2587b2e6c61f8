pub mod api;
pub mod serial;

pub use api::HttpApi;
pub use serial::SerialTrigger;
