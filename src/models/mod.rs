pub mod plan;
pub mod provider;
pub mod request;
