use chrono::Utc;
use hmac::{ Hmac, Mac };
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Accepted clock skew between client and server, in seconds.
pub const MAX_CLOCK_SKEW_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    Missing,
    StaleTimestamp,
    BadSignature,
}

impl SignatureError {
    pub fn reason(&self) -> &'static str {
        match self {
            SignatureError::Missing => "missing ts/sig",
            SignatureError::StaleTimestamp => "timestamp out of range",
            SignatureError::BadSignature => "bad signature",
        }
    }
}

/// Hex HMAC-SHA256 of the timestamp string under `secret`.
pub fn sign(secret: &str, ts: &str) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        // HMAC accepts keys of any length.
        Err(_) => {
            return String::new();
        }
    };
    mac.update(ts.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn verify(secret: &str, ts: Option<&str>, sig: Option<&str>) -> Result<(), SignatureError> {
    verify_at(secret, ts, sig, Utc::now().timestamp())
}

pub fn verify_at(
    secret: &str,
    ts: Option<&str>,
    sig: Option<&str>,
    now: i64
) -> Result<(), SignatureError> {
    let (ts, sig) = match (ts, sig) {
        (Some(ts), Some(sig)) => (ts, sig),
        _ => {
            return Err(SignatureError::Missing);
        }
    };

    let ts_i: i64 = ts.parse().unwrap_or(0);
    if now.abs_diff(ts_i) > MAX_CLOCK_SKEW_SECS.unsigned_abs() {
        return Err(SignatureError::StaleTimestamp);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(
        |_| SignatureError::BadSignature
    )?;
    mac.update(ts.as_bytes());
    let provided = hex::decode(sig).map_err(|_| SignatureError::BadSignature)?;
    mac.verify_slice(&provided).map_err(|_| SignatureError::BadSignature)
}
