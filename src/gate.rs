// ===============================
// src/gate.rs (Session Gate)
// ===============================
//
// Gate boolean saja: token = hex(HMAC-SHA256(secret, operator)).
// Tanpa SESSION_SECRET semua request dianggap terautentikasi.
//
use hmac::{Hmac, Mac};
use sha2::Sha256;

pub const OPERATOR_HEADER: &str = "x-shop-operator";
pub const TOKEN_HEADER: &str = "x-shop-token";

type HmacSha256 = Hmac<Sha256>;

fn mac_for(secret: &str, operator: &str) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key");
    mac.update(operator.as_bytes());
    mac
}

pub fn issue_token(secret: &str, operator: &str) -> String {
    hex::encode(mac_for(secret, operator).finalize().into_bytes())
}

pub fn verify_token(secret: &str, operator: &str, token: &str) -> bool {
    match hex::decode(token.trim()) {
        Ok(raw) => mac_for(secret, operator).verify_slice(&raw).is_ok(),
        Err(_) => false,
    }
}

/// Headers a client attaches to every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorCredentials {
    pub operator: String,
    pub token: String,
}

#[derive(Debug, Clone, Default)]
pub struct SessionGate {
    secret: Option<String>,
}

impl SessionGate {
    pub fn open() -> Self {
        Self { secret: None }
    }

    pub fn with_secret(secret: impl Into<String>) -> Self {
        let secret = secret.into();
        Self { secret: Some(secret).filter(|s| !s.is_empty()) }
    }

    pub fn is_enforced(&self) -> bool {
        self.secret.is_some()
    }

    pub fn is_authenticated(&self, operator: Option<&str>, token: Option<&str>) -> bool {
        let Some(secret) = &self.secret else { return true };
        match (operator, token) {
            (Some(op), Some(tok)) if !op.trim().is_empty() => verify_token(secret, op.trim(), tok),
            _ => false,
        }
    }
}
