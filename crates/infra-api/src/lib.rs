mod adapter;

pub use adapter::{ApiClient, ApiConfig};
