//! 请求校验
//!
//! webhook 签名与运维接口 API Key

pub mod auth;
pub mod signature;

pub use auth::RequireApiKey;
pub use signature::verify_signature;
