//! GitHub webhook 签名校验
//!
//! `X-Hub-Signature: sha1=<hex>`，HMAC-SHA1(secret, raw body)

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;

use crate::error::ApiError;

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_HEADER: &str = "x-hub-signature";
const SIGNATURE_PREFIX: &str = "sha1=";

/// 计算 body 的签名头取值（`sha1=<hex>`）
pub fn sign(secret: &[u8], body: &[u8]) -> Result<String, ApiError> {
    let mut mac = HmacSha1::new_from_slice(secret)
        .map_err(|e| ApiError::internal(format!("invalid webhook secret: {}", e)))?;
    mac.update(body);
    Ok(format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes())))
}

/// 校验 webhook 请求
///
/// 缺少签名头、body 为空或签名不匹配均返回 400，此时不做任何部署工作
pub fn verify_signature(headers: &HeaderMap, body: &[u8], secret: &str) -> Result<(), ApiError> {
    let Some(provided) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
        tracing::warn!("Missing X-Hub-Signature header");
        return Err(ApiError::bad_request("Missing X-Hub-Signature header"));
    };

    if body.is_empty() {
        tracing::warn!("Webhook request without body");
        return Err(ApiError::bad_request("Missing request body"));
    }

    let expected = sign(secret.as_bytes(), body)?;
    let provided = provided.trim();
    // 长度不同时 ct_eq 直接返回 false
    if !bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        tracing::warn!("Webhook signature mismatch");
        return Err(ApiError::bad_request("Request body digest did not match X-Hub-Signature"));
    }

    Ok(())
}
