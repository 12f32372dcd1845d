pub mod epss_api_client;
pub mod epss_api_structs;
pub mod error;
pub mod interface;
