pub mod svc_http;

pub use svc_http::{SvcClient, SvcResponse};
