pub mod credential;
pub mod did;
pub mod reputation;
pub mod request;
pub mod transaction;
